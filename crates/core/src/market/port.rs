use super::entity::TickQuote;
use super::error::MarketError;
use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::pin::Pin;

/// 一批行情推送：标的代码 -> 最新 Tick 快照。
pub type QuoteBatch = HashMap<String, TickQuote>;

/// 行情批次的异步流。
pub type QuoteBatchStream = Pin<Box<dyn Stream<Item = QuoteBatch> + Send>>;

/// # Summary
/// 实时行情订阅接口。核心只消费 `QuoteBatch`，不关心推送背后是
/// 轮询、长连接还是回放文件。
///
/// # Invariants
/// - 实现类必须保证线程安全 (`Send` + `Sync`)。
/// - 同一批次内每个标的至多出现一次。
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// # Summary
    /// 订阅一组标的的行情批次流。
    ///
    /// # Arguments
    /// * `codes` - 关注的标的代码列表。
    ///
    /// # Returns
    /// * `Ok(QuoteBatchStream)` - 行情批次流，流结束即数据源退出。
    /// * `Err(MarketError)` - 订阅建立失败。
    async fn subscribe(&self, codes: &[String]) -> Result<QuoteBatchStream, MarketError>;
}

/// # Summary
/// 历史数据提供接口，回测与策略数据准备共用。
/// 日期统一使用 "YYYYMMDD" 字符串，与交易日历对齐。
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// # Summary
    /// 获取一组标的在日期区间内的日收盘价序列。
    ///
    /// # Arguments
    /// * `codes` - 标的代码列表。
    /// * `start` / `end` - 闭区间日期，格式 "YYYYMMDD"。
    ///
    /// # Returns
    /// 标的代码 -> 按交易日顺序排列的收盘价；无数据的标的不出现在结果中。
    async fn daily_closes(
        &self,
        codes: &[String],
        start: &str,
        end: &str,
    ) -> Result<HashMap<String, Vec<Decimal>>, MarketError>;

    /// # Summary
    /// 获取日期区间内的交易日列表（升序）。
    async fn trading_days(&self, start: &str, end: &str) -> Result<Vec<String>, MarketError>;

    /// # Summary
    /// 获取区间内的日均价（过滤无效价格后求平均）。
    ///
    /// # Logic
    /// 1. 拉取区间收盘价。
    /// 2. 剔除非正价格后取算术平均；没有有效价格的标的均价为 0。
    async fn daily_avg(
        &self,
        codes: &[String],
        start: &str,
        end: &str,
    ) -> Result<HashMap<String, Decimal>, MarketError> {
        let closes = self.daily_closes(codes, start, end).await?;
        let mut code2avg = HashMap::new();
        for code in codes {
            let avg = closes
                .get(code)
                .map(|prices| {
                    let valid: Vec<Decimal> = prices
                        .iter()
                        .copied()
                        .filter(|p| *p > Decimal::ZERO)
                        .collect();
                    if valid.is_empty() {
                        Decimal::ZERO
                    } else {
                        valid.iter().sum::<Decimal>() / Decimal::from(valid.len())
                    }
                })
                .unwrap_or(Decimal::ZERO);
            if avg <= Decimal::ZERO {
                tracing::warn!("{code} 在指定时间段内没有有效的价格数据");
            }
            code2avg.insert(code.clone(), avg);
        }
        Ok(code2avg)
    }
}
