pub mod backtest;
pub mod evaluator;
pub mod runtime;
pub mod swing;

use thiserror::Error;
use zhanggui_core::market::error::MarketError;

/// # Summary
/// 引擎层（策略运行时与回测）的统一错误类型。
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Market error: {0}")]
    Market(#[from] MarketError),
    #[error("策略数据未就绪: {0}")]
    DataNotReady(String),
    #[error("内部错误: {0}")]
    Internal(String),
}
