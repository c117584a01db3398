use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 单个标的的实时盘口快照（Tick），记录最新价、涨跌基准和五档买卖盘。
///
/// # Invariants
/// - `ask_price`/`bid_price` 与对应的量档位按距离盘口从近到远排列，
///   无效档位以 0 填充。
/// - 价格统一使用 `Decimal`，保证账务换算无精度损失。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickQuote {
    // 行情时间戳 (毫秒)
    pub time: i64,
    // 最新价
    pub last_price: Decimal,
    // 开盘价
    pub open: Decimal,
    // 最高价
    pub high: Decimal,
    // 最低价
    pub low: Decimal,
    // 昨收价
    pub prev_close: Decimal,
    // 当日累计成交额
    pub amount: Decimal,
    // 当日累计成交量
    pub volume: i64,
    // 卖价五档
    pub ask_price: Vec<Decimal>,
    // 买价五档
    pub bid_price: Vec<Decimal>,
    // 卖量五档
    pub ask_vol: Vec<i64>,
    // 买量五档
    pub bid_vol: Vec<i64>,
}

impl TickQuote {
    /// # Summary
    /// 卖一价。档位缺失或为 0 视为无可成交盘口。
    pub fn best_ask(&self) -> Option<Decimal> {
        self.ask_price
            .first()
            .copied()
            .filter(|p| *p > Decimal::ZERO)
    }

    /// # Summary
    /// 买一价。档位缺失或为 0 视为无可成交盘口。
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bid_price
            .first()
            .copied()
            .filter(|p| *p > Decimal::ZERO)
    }

    /// # Summary
    /// 当日涨跌幅（相对昨收，百分比）。昨收无效时返回 None。
    pub fn pct_change(&self) -> Option<Decimal> {
        if self.prev_close <= Decimal::ZERO {
            return None;
        }
        Some((self.last_price / self.prev_close - Decimal::ONE) * Decimal::from(100))
    }

    /// # Summary
    /// 当日自开盘以来的涨幅（百分比）。开盘价无效时返回 None。
    pub fn rise_since_open(&self) -> Option<Decimal> {
        if self.open <= Decimal::ZERO {
            return None;
        }
        Some((self.last_price / self.open - Decimal::ONE) * Decimal::from(100))
    }
}
