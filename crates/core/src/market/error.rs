use thiserror::Error;

/// # Summary
/// 行情层错误枚举，覆盖数据源订阅与历史数据读取失败。
#[derive(Error, Debug)]
pub enum MarketError {
    /// 数据源不可用或订阅失败
    #[error("Feed error: {0}")]
    Feed(String),
    /// 历史数据缺失
    #[error("No history for {0}")]
    NoHistory(String),
    /// 数据解析失败
    #[error("Malformed market data: {0}")]
    Malformed(String),
}
