use super::entity::Signal;
use crate::market::port::QuoteBatch;
use crate::trade::entity::{AccountSnapshot, Order};
use async_trait::async_trait;

/// # Summary
/// 风控闸口接口：策略输出与撮合引擎之间的最后一道检查。
/// 只读账户快照与当日订单，绝不直接改动账户或下单。
///
/// # Invariants
/// - 信号按输入顺序逐个评审，资金预算随批次内已接受的买入顺序递减，
///   因此同一批内信号顺序影响结果。
/// - 返回列表是输入列表的子序列（不重排、不改写数量）。
#[async_trait]
pub trait RiskGate: Send + Sync {
    /// # Summary
    /// 审核一批交易信号，返回被接受的子集。
    ///
    /// # Arguments
    /// * `signals` - 策略产出的原始信号，按产生顺序排列。
    /// * `account` - 当前账户快照。
    /// * `quotes` - 最新行情批次，用于估算买入所需资金。
    /// * `todays_orders` - 当日全部订单，用于重复委托判定。
    async fn review(
        &self,
        signals: Vec<Signal>,
        account: &AccountSnapshot,
        quotes: &QuoteBatch,
        todays_orders: &[Order],
    ) -> Vec<Signal>;
}
