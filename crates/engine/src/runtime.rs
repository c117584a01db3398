use crate::EngineError;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};
use zhanggui_core::market::port::{QuoteBatch, QuoteFeed};
use zhanggui_core::risk::port::RiskGate;
use zhanggui_core::strategy::port::Strategy;
use zhanggui_core::trade::port::{OrderRequest, TickSink, TradePort};

/// # Summary
/// 交易会话：行情 → 策略 → 风控 → 委托的单线程主循环。
/// 一个行情批次被完整处理（撮合复核、策略求值、风控评审、下单）
/// 之后才取下一批，会话内不存在任何并行求值。
///
/// # Invariants
/// - 信号按策略注册顺序收集、按产生顺序送审，风控返回的
///   接受列表按原顺序提交。
/// - 单笔委托失败只告警并继续，不中断会话。
pub struct TradingSession {
    strategies: Vec<Box<dyn Strategy>>,
    gate: Arc<dyn RiskGate>,
    trade: Arc<dyn TradePort>,
    sink: Arc<dyn TickSink>,
}

impl TradingSession {
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        gate: Arc<dyn RiskGate>,
        trade: Arc<dyn TradePort>,
        sink: Arc<dyn TickSink>,
    ) -> Self {
        Self {
            strategies,
            gate,
            trade,
            sink,
        }
    }

    /// # Summary
    /// 订阅行情并持续处理，直到数据源流结束。
    pub async fn run(&mut self, feed: &dyn QuoteFeed, codes: &[String]) -> Result<(), EngineError> {
        let mut stream = feed.subscribe(codes).await?;
        info!("交易会话启动: 订阅 {} 个标的", codes.len());
        while let Some(batch) = stream.next().await {
            self.step(&batch).await;
        }
        info!("行情流结束，交易会话退出");
        Ok(())
    }

    /// # Summary
    /// 处理一个行情批次。
    ///
    /// # Logic
    /// 1. 行情先灌给模拟交易所：刷新估值并复核上一轮挂单。
    /// 2. 以刷新后的账户快照驱动各策略求值，收集全部信号。
    /// 3. 信号整批送风控评审（顺序预算、冷却、重复委托）。
    /// 4. 被接受的信号逐一转为市价委托提交，失败只告警。
    pub async fn step(&mut self, ticks: &QuoteBatch) {
        if let Err(e) = self.sink.on_ticks(ticks).await {
            warn!("行情批次处理失败: {e}");
        }

        let snapshot = self.trade.account_snapshot().await;

        let mut signals = Vec::new();
        for strategy in &mut self.strategies {
            signals.extend(strategy.evaluate(ticks, &snapshot));
        }
        if signals.is_empty() {
            return;
        }
        info!("策略产生 {} 个交易信号", signals.len());

        let todays_orders = self.trade.order_history().await;
        let accepted = self
            .gate
            .review(signals, &snapshot, ticks, &todays_orders)
            .await;
        if accepted.is_empty() {
            return;
        }

        for signal in accepted {
            let request = OrderRequest {
                code: signal.code.clone(),
                side: signal.side,
                quantity: signal.quantity,
                price: None,
                remark: signal.remark.clone(),
            };
            match self.trade.submit_order(request).await {
                Ok(order_id) => info!(
                    "执行交易: {} {} x{}, 订单 {}",
                    signal.side, signal.code, signal.quantity, order_id.0
                ),
                Err(e) => warn!("委托提交失败: {} {}: {e}", signal.side, signal.code),
            }
        }
    }
}
