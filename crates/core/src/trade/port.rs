use super::entity::{AccountSnapshot, Order, OrderId, TradeRecord, TradeSide};
use crate::market::port::QuoteBatch;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// # Summary
/// 交易执行环节中可能发生的错误。
/// 资金不足与持仓不足是可恢复的业务失败，调用方检查后跳过即可，
/// 不允许让它们终止交易主循环。
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("委托参数无效: {0}")]
    InvalidOrder(String),
    #[error("可用资金不足. 需要: {required}, 实际: {actual}")]
    InsufficientFunds { required: Decimal, actual: Decimal },
    #[error("可用持仓不足. 需要: {required}, 实际: {actual}")]
    InsufficientPosition { required: i64, actual: i64 },
    #[error("标的 {0} 暂无有效报价")]
    NoQuote(String),
    #[error("订单未找到或已不处于可操作状态: {0}")]
    OrderNotFound(String),
    #[error("内部系统错误: {0}")]
    Internal(String),
}

/// # Summary
/// 委托请求。`price` 为空时由交易服务按方向从行情缓存解析
/// （买入取卖一价，卖出取买一价，盘口缺失回退最新价）。
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub code: String,
    pub side: TradeSide,
    pub quantity: i64,
    pub price: Option<Decimal>,
    pub remark: String,
}

/// # Summary
/// 核心交易服务抽象接口。
/// 策略运行时与回测驱动通过此端口下发委托意图并查询账户与订单状态，
/// 它是业务逻辑通往模拟交易所（或未来实盘通道）的唯一门户。
///
/// # Invariants
/// - 此接口必须是异步且线程安全的 (`Send + Sync`)。
/// - 所有查询返回的序列保持插入顺序，可安全重放。
#[async_trait]
pub trait TradePort: Send + Sync {
    /// 提交一笔新的委托
    ///
    /// # Returns
    /// * `Ok(OrderId)` - 订单进入 Pending（或已即时撮合）的追踪 ID
    /// * `Err(TradeError)` - 数量非法、无法解析价格等拒绝原因
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderId, TradeError>;

    /// 撤销一笔仍处于 Pending 的委托；订单不存在或已终态返回错误
    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), TradeError>;

    /// 查询账户资金与持仓快照
    async fn account_snapshot(&self) -> AccountSnapshot;

    /// 查询待成交订单（按创建顺序）
    async fn pending_orders(&self) -> Vec<Order>;

    /// 查询当日全部订单（待成交 + 已终态，按创建顺序）
    async fn order_history(&self) -> Vec<Order>;

    /// 查询成交流水（按成交顺序）
    async fn trade_records(&self) -> Vec<TradeRecord>;
}

/// # Summary
/// 行情灌入端口。一个行情批次被完整处理（价格刷新 → 挂单复核 →
/// 成交落账 → 持久化）之后才会接受下一批，保证成交序列可线性化。
#[async_trait]
pub trait TickSink: Send + Sync {
    /// 处理一批实时行情
    async fn on_ticks(&self, ticks: &QuoteBatch) -> Result<(), TradeError>;
}
