use crate::account::Ledger;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zhanggui_core::common::time::TimeProvider;
use zhanggui_core::market::entity::TickQuote;
use zhanggui_core::market::port::QuoteBatch;
use zhanggui_core::trade::entity::{Order, OrderId, OrderStatus, TradeSide};
use zhanggui_core::trade::port::{OrderRequest, TradeError};

/// # Summary
/// 模拟交易所撮合引擎。持有挂单队列与行情缓存，按确定性的
/// 盘口穿越规则判定成交，成交通过账本落账。
///
/// # Invariants
/// - 订单状态机：`Pending -> Completed | Failed | Cancelled`，
///   终态只设置一次，Failed/Cancelled 的订单永不重新入队。
/// - 每个行情批次内挂单按创建顺序单遍复核，成交序列即落账序列。
/// - 账本拒绝成交（资金/持仓竞态）时订单记为 Failed，不重试——
///   每张订单至多成交一次。
pub struct MatchEngine {
    clock: Arc<dyn TimeProvider>,
    /// 手续费率（双边收取）
    commission_rate: Decimal,
    /// 挂单队列（保持提交顺序）
    pending: Vec<Order>,
    /// 已进入终态的订单（按终结顺序）
    finished: Vec<Order>,
    /// 标的代码 -> 最近一次收到的 Tick
    quotes: HashMap<String, TickQuote>,
}

impl MatchEngine {
    pub fn new(commission_rate: Decimal, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            clock,
            commission_rate,
            pending: Vec::new(),
            finished: Vec::new(),
            quotes: HashMap::new(),
        }
    }

    /// # Summary
    /// 提交一笔委托：校验参数，解析委托价，入队后立即尝试
    /// 对最近缓存的行情撮合一次。
    ///
    /// # Logic
    /// 1. 数量必须为正。
    /// 2. 未给限价时按方向取盘口价（买取卖一，卖取买一），
    ///    盘口缺失回退最新价；仍无价格则拒绝。
    /// 3. 创建 Pending 订单并尝试即时撮合。
    pub async fn submit(&mut self, request: OrderRequest, ledger: &Ledger) -> Result<OrderId, TradeError> {
        if request.quantity <= 0 {
            warn!("交易数量为 {}，不处理订单: {}", request.quantity, request.code);
            return Err(TradeError::InvalidOrder(format!(
                "委托数量必须为正: {}",
                request.quantity
            )));
        }

        let price = match request.price {
            Some(p) if p > Decimal::ZERO => p,
            _ => self
                .resolve_price(&request.code, request.side)
                .ok_or_else(|| {
                    warn!("无法获取有效价格，委托失败: {}", request.code);
                    TradeError::NoQuote(request.code.clone())
                })?,
        };

        let order_id = OrderId(Uuid::new_v4().to_string());
        let order = Order::new(
            order_id.clone(),
            request.code.clone(),
            request.side,
            request.quantity,
            price,
            request.remark,
            self.clock.now(),
        );
        info!(
            "创建订单: {}, 股票: {}, 方向: {}, 数量: {}, 限价: {:.2}",
            order_id.0, order.code, order.side, order.quantity, order.price
        );
        self.pending.push(order);

        // 已有该标的行情缓存时立即尝试一次撮合
        if self.quotes.contains_key(&request.code) {
            self.match_pending(ledger).await;
        } else {
            info!(
                "暂无股票 {} 的行情数据，订单 {} 将等待行情触发",
                request.code, order_id.0
            );
        }

        Ok(order_id)
    }

    /// # Summary
    /// 处理一批实时行情：刷新行情缓存与持仓估值，然后按创建顺序
    /// 复核全部挂单。
    pub async fn on_tick_batch(&mut self, ticks: &QuoteBatch, ledger: &Ledger) {
        let mut code2price = HashMap::new();
        for (code, tick) in ticks {
            if tick.last_price > Decimal::ZERO {
                code2price.insert(code.clone(), tick.last_price);
            }
            self.quotes.insert(code.clone(), tick.clone());
        }

        if !code2price.is_empty() {
            ledger.update_prices(&code2price).await;
        }

        self.match_pending(ledger).await;
        debug!("实时行情触发完成，处理了 {} 只股票的行情数据", ticks.len());
    }

    /// # Summary
    /// 撤销一笔仍在挂单队列中的委托。
    ///
    /// # Returns
    /// 订单不存在或已进入终态时返回 `OrderNotFound`。
    pub fn cancel(&mut self, order_id: &OrderId) -> Result<(), TradeError> {
        let Some(idx) = self.pending.iter().position(|o| o.id == *order_id) else {
            warn!("未找到可撤销的订单: {}", order_id.0);
            return Err(TradeError::OrderNotFound(order_id.0.clone()));
        };
        let mut order = self.pending.remove(idx);
        order.status = OrderStatus::Cancelled;
        info!("取消订单: {}", order_id.0);
        self.finished.push(order);
        Ok(())
    }

    /// 当前挂单（按创建顺序）
    pub fn pending_orders(&self) -> Vec<Order> {
        self.pending.clone()
    }

    /// 当日全部订单：挂单在前按创建顺序，终态单在后按终结顺序
    pub fn order_history(&self) -> Vec<Order> {
        let mut all = self.pending.clone();
        all.extend(self.finished.iter().cloned());
        all
    }

    /// # Summary
    /// 对全部挂单做一遍撮合复核。
    ///
    /// # Logic
    /// 1. 买单穿越条件：限价 >= 卖一价，按 `min(限价, 卖一)` 成交。
    /// 2. 卖单穿越条件：限价 <= 买一价，按 `max(限价, 买一)` 成交。
    /// 3. 盘口缺失的订单保持 Pending，等待后续行情。
    /// 4. 账本落账失败（资金/持仓不足）的订单标记 Failed，不重试。
    async fn match_pending(&mut self, ledger: &Ledger) {
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for mut order in std::mem::take(&mut self.pending) {
            let Some(execution_price) = self.crossing_price(&order) else {
                still_pending.push(order);
                continue;
            };

            match ledger
                .apply_fill(
                    &order.id,
                    &order.code,
                    order.side,
                    order.quantity,
                    execution_price,
                    self.commission_rate,
                    &order.remark,
                )
                .await
            {
                Ok(record) => {
                    order.status = OrderStatus::Completed;
                    order.execution_price = Some(execution_price);
                    order.execution_time = Some(record.trade_time);
                    info!(
                        "订单成交: {}, 股票: {}, 方向: {}, 数量: {}, 价格: {:.2}, 交易额: {:.2}",
                        order.id.0, order.code, order.side, order.quantity, execution_price, record.value
                    );
                    self.finished.push(order);
                }
                Err(e) => {
                    order.status = OrderStatus::Failed;
                    warn!("订单执行失败: {}, 原因: {}", order.id.0, e);
                    self.finished.push(order);
                }
            }
        }

        self.pending = still_pending;
    }

    /// 盘口穿越判定；不满足成交条件或无盘口时返回 None
    fn crossing_price(&self, order: &Order) -> Option<Decimal> {
        let tick = self.quotes.get(&order.code)?;
        match order.side {
            TradeSide::Buy => {
                let ask = tick.best_ask()?;
                (order.price >= ask).then(|| order.price.min(ask))
            }
            TradeSide::Sell => {
                let bid = tick.best_bid()?;
                (order.price <= bid).then(|| order.price.max(bid))
            }
        }
    }

    /// 按方向解析委托价：买取卖一，卖取买一，盘口缺失回退最新价
    fn resolve_price(&self, code: &str, side: TradeSide) -> Option<Decimal> {
        let tick = self.quotes.get(code)?;
        let level = match side {
            TradeSide::Buy => tick.best_ask(),
            TradeSide::Sell => tick.best_bid(),
        };
        level.or_else(|| (tick.last_price > Decimal::ZERO).then_some(tick.last_price))
    }
}
