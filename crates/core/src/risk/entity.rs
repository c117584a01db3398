use crate::trade::entity::TradeSide;
use serde::{Deserialize, Serialize};

/// # Summary
/// 策略产生的交易信号。生命周期极短：由策略产出，经风控审核一次，
/// 通过后转化为委托请求，不做持久化。
///
/// # Invariants
/// - `quantity` 恒为正。
/// - `remark` 标识信号来源策略，风控用它做当日重复委托判定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// 交易标的代码
    pub code: String,
    /// 交易方向
    pub side: TradeSide,
    /// 建议交易数量
    pub quantity: i64,
    /// 来源策略标签
    pub remark: String,
}

impl Signal {
    pub fn new(code: impl Into<String>, side: TradeSide, quantity: i64, remark: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            side,
            quantity,
            remark: remark.into(),
        }
    }
}
