use crate::account::Ledger;
use crate::matcher::MatchEngine;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use zhanggui_core::common::time::TimeProvider;
use zhanggui_core::market::port::QuoteBatch;
use zhanggui_core::trade::entity::{AccountSnapshot, Order, OrderId, TradeRecord};
use zhanggui_core::trade::port::{OrderRequest, TickSink, TradeError, TradePort};

/// # Summary
/// 模拟盘交易服务：账本 + 撮合引擎的组合门面，实现 `TradePort`
/// 与 `TickSink`。撮合引擎整体由一把互斥锁保护，一个行情批次
/// （价格刷新 → 挂单复核 → 成交落账 → 持久化）完整处理完才会
/// 释放锁，由此保证成交序列可线性化。
pub struct PaperTradeService {
    ledger: Arc<Ledger>,
    engine: Mutex<MatchEngine>,
}

impl PaperTradeService {
    pub fn new(ledger: Arc<Ledger>, commission_rate: Decimal, clock: Arc<dyn TimeProvider>) -> Self {
        info!("初始化模拟交易服务，账户ID: {}", ledger.account_id().0);
        Self {
            engine: Mutex::new(MatchEngine::new(commission_rate, clock)),
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// # Summary
    /// 打印账户摘要（资金概况与持仓明细），巡检用。
    pub async fn log_summary(&self) {
        let snapshot = self.ledger.snapshot().await;
        info!("{}", "=".repeat(50));
        info!("账户ID: {}", snapshot.account_id.0);
        info!("可用资金: {:.2}", snapshot.cash);
        info!("持仓市值: {:.2}", snapshot.market_value);
        info!("总资产: {:.2}", snapshot.total_asset);
        info!("持仓数量: {}", snapshot.positions.len());

        if !snapshot.positions.is_empty() {
            info!("{}", "-".repeat(50));
            info!("持仓明细:");
            for position in &snapshot.positions {
                info!(
                    "股票: {}, 数量: {}, 可用: {}, 成本: {:.2}, 市值: {:.2}",
                    position.code,
                    position.volume,
                    position.usable_volume,
                    position.avg_price,
                    position.market_value
                );
            }
        }
        info!("{}", "=".repeat(50));
    }
}

#[async_trait]
impl TradePort for PaperTradeService {
    /// # Logic
    /// 1. 交由撮合引擎校验参数并解析委托价。
    /// 2. 订单入队后立即对最近行情尝试一次撮合。
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderId, TradeError> {
        let mut engine = self.engine.lock().await;
        engine.submit(request, &self.ledger).await
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), TradeError> {
        let mut engine = self.engine.lock().await;
        engine.cancel(order_id)
    }

    async fn account_snapshot(&self) -> AccountSnapshot {
        self.ledger.snapshot().await
    }

    async fn pending_orders(&self) -> Vec<Order> {
        self.engine.lock().await.pending_orders()
    }

    async fn order_history(&self) -> Vec<Order> {
        self.engine.lock().await.order_history()
    }

    async fn trade_records(&self) -> Vec<TradeRecord> {
        self.ledger.trade_records().await
    }
}

#[async_trait]
impl TickSink for PaperTradeService {
    /// # Logic
    /// 整个批次持有撮合引擎锁：先刷新估值，再按创建顺序复核挂单。
    async fn on_ticks(&self, ticks: &QuoteBatch) -> Result<(), TradeError> {
        let mut engine = self.engine.lock().await;
        engine.on_tick_batch(ticks, &self.ledger).await;
        Ok(())
    }
}
