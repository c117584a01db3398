use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{info, warn};
use zhanggui_core::common::round_down_to_lot;
use zhanggui_core::common::time::TimeProvider;
use zhanggui_core::config::RiskConfig;
use zhanggui_core::market::port::QuoteBatch;
use zhanggui_core::risk::entity::Signal;
use zhanggui_core::risk::port::RiskGate;
use zhanggui_core::trade::entity::{AccountSnapshot, Order, OrderStatus, TradeSide};

/// 单个标的的交易节奏状态
#[derive(Default, Clone, Copy)]
struct TradePacing {
    last_buy_secs: Option<i64>,
    last_sell_secs: Option<i64>,
}

/// # Summary
/// 风险管理器：策略信号进入撮合队列前的最后一道闸口。
/// 控制总仓位与单标的仓位上限、同标的交易节奏、当日重复委托，
/// 并在批次内对买入资金做顺序预占。
///
/// # Invariants
/// - 只读账户快照，从不直接改动账户或下单。
/// - 同一批次内先被接受的买入消耗预算，后续信号只能看到剩余额度；
///   整批通过聚合检查但逐单超支的情况由此被挡住。
pub struct RiskManager {
    config: RiskConfig,
    /// 估算最大可买数量时计入的手续费率
    commission_rate: Decimal,
    clock: Arc<dyn TimeProvider>,
    /// 标的代码 -> 最近一次买入/卖出的时间
    pacing: DashMap<String, TradePacing>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, commission_rate: Decimal, clock: Arc<dyn TimeProvider>) -> Self {
        info!(
            "初始化风险管理器: 最大总仓位 {:.2}%, 买入冷却 {}s",
            config.max_position_ratio * Decimal::from(100),
            config.buy_interval_secs
        );
        Self {
            config,
            commission_rate,
            clock,
            pacing: DashMap::new(),
        }
    }

    /// 指定标的的最大仓位比例（覆盖项优先，否则用默认值）
    fn code_limit(&self, code: &str) -> Decimal {
        self.config
            .code_limits
            .get(code)
            .copied()
            .unwrap_or(self.config.default_code_limit)
    }

    /// # Summary
    /// 计算某标的当前的最大可买数量（下单前的参考口径）。
    ///
    /// # Logic
    /// 三个上限取最小值：
    /// 1. 现金上限：可用资金扣除安全垫；
    /// 2. 单标的上限：单标的仓位比例限制剩余的空间；
    /// 3. 总仓位上限：最大总仓位比例剩余的空间。
    /// 再按含手续费的单价折算股数，向下取整到一手。
    pub fn max_buy_quantity(&self, account: &AccountSnapshot, code: &str, price: Decimal) -> i64 {
        if price <= Decimal::ZERO {
            return 0;
        }

        let total_asset = account.total_asset;
        let cash_cap = account.cash * (Decimal::ONE - self.config.cash_buffer_ratio);

        let current_value = account
            .position(code)
            .map(|p| p.market_value)
            .unwrap_or(Decimal::ZERO);
        let code_cap = self.code_limit(code) * total_asset - current_value;

        let total_cap = self.config.max_position_ratio * total_asset - account.market_value;

        let max_value = cash_cap.min(code_cap).min(total_cap);
        if max_value <= Decimal::ZERO {
            return 0;
        }

        let unit_cost = price * (Decimal::ONE + self.commission_rate);
        let max_quantity = (max_value / unit_cost).floor().to_i64().unwrap_or(0);
        round_down_to_lot(max_quantity)
    }

    /// 某标的当前的最大可卖数量（可用持仓）
    pub fn max_sell_quantity(&self, account: &AccountSnapshot, code: &str) -> i64 {
        account
            .position(code)
            .map(|p| p.usable_volume)
            .unwrap_or(0)
    }

    /// # Summary
    /// 巡检持仓是否越过任一仓位上限。
    ///
    /// # Returns
    /// `(是否需要再平衡, 原因描述)`。
    pub fn check_rebalance_need(&self, account: &AccountSnapshot) -> (bool, String) {
        if account.total_asset <= Decimal::ZERO {
            return (false, "总资产为0，无需再平衡".to_string());
        }

        let total_ratio = account.position_ratio();
        if total_ratio > self.config.max_position_ratio {
            return (
                true,
                format!(
                    "总仓位比例 {:.2}% 超过最大限制 {:.2}%",
                    total_ratio * Decimal::from(100),
                    self.config.max_position_ratio * Decimal::from(100)
                ),
            );
        }

        for position in &account.positions {
            let limit = self.code_limit(&position.code);
            if position.position_ratio > limit {
                return (
                    true,
                    format!(
                        "股票 {} 仓位比例 {:.2}% 超过限制 {:.2}%",
                        position.code,
                        position.position_ratio * Decimal::from(100),
                        limit * Decimal::from(100)
                    ),
                );
            }
        }

        (false, "持仓比例正常".to_string())
    }

    /// 当日是否已有同标的、同方向、同标签的未撤销委托
    fn is_duplicate(&self, signal: &Signal, todays_orders: &[Order]) -> bool {
        let today = self.clock.now().date_naive();
        todays_orders.iter().any(|order| {
            order.created_at.date_naive() == today
                && order.code == signal.code
                && order.side == signal.side
                && order.remark == signal.remark
                && matches!(order.status, OrderStatus::Pending | OrderStatus::Completed)
        })
    }
}

#[async_trait]
impl RiskGate for RiskManager {
    /// # Summary
    /// 按输入顺序评审一批信号。
    ///
    /// # Logic
    /// 1. 总资产无效时整批拒绝。
    /// 2. 总仓位超限进入只卖不买模式，本批全部买入被拒。
    /// 3. 买入预算 = min(可用资金扣安全垫, 总仓位上限剩余空间)，
    ///    批内顺序扣减；单标的另受其仓位上限约束。
    /// 4. 买入依次过：预算、单标的空间、冷却间隔、当日重复委托。
    /// 5. 卖出只要求可用持仓为正（可配置对称冷却），不占用资金预算。
    async fn review(
        &self,
        signals: Vec<Signal>,
        account: &AccountSnapshot,
        quotes: &QuoteBatch,
        todays_orders: &[Order],
    ) -> Vec<Signal> {
        if account.total_asset <= Decimal::ZERO {
            warn!("总资产无效 ({})，本批信号全部拒绝", account.total_asset);
            return Vec::new();
        }

        let position_ratio = account.position_ratio();
        let sell_only = position_ratio > self.config.max_position_ratio;
        if sell_only {
            warn!(
                "总仓位比例 {:.2}% 超过上限 {:.2}%，进入只卖不买模式",
                position_ratio * Decimal::from(100),
                self.config.max_position_ratio * Decimal::from(100)
            );
        }

        // 批次买入预算：现金安全垫与总仓位剩余空间二者取小
        let cash_cap = account.cash * (Decimal::ONE - self.config.cash_buffer_ratio);
        let total_cap = (self.config.max_position_ratio - position_ratio) * account.total_asset;
        let mut budget = cash_cap.min(total_cap).max(Decimal::ZERO);

        let now_secs = self.clock.now_secs();
        let mut accepted = Vec::new();

        for signal in signals {
            match signal.side {
                TradeSide::Buy => {
                    if sell_only {
                        warn!("只卖不买模式，拒绝买入信号: {}", signal.code);
                        continue;
                    }

                    let Some(price) = quotes
                        .get(&signal.code)
                        .map(|t| t.last_price)
                        .filter(|p| *p > Decimal::ZERO)
                    else {
                        warn!("股票 {} 暂无有效行情，无法估算买入资金，拒绝", signal.code);
                        continue;
                    };

                    let required = price * Decimal::from(signal.quantity);
                    if required > budget {
                        warn!(
                            "买入 {} 需要 {:.2}，剩余预算 {:.2}，拒绝",
                            signal.code, required, budget
                        );
                        continue;
                    }

                    let current_value = account
                        .position(&signal.code)
                        .map(|p| p.market_value)
                        .unwrap_or(Decimal::ZERO);
                    let code_room =
                        (self.code_limit(&signal.code) * account.total_asset - current_value)
                            .max(Decimal::ZERO);
                    if required > code_room {
                        warn!(
                            "买入 {} 需要 {:.2}，单标的剩余空间 {:.2}，拒绝",
                            signal.code, required, code_room
                        );
                        continue;
                    }

                    let pacing = self
                        .pacing
                        .get(&signal.code)
                        .map(|p| *p)
                        .unwrap_or_default();
                    if let Some(last) = pacing.last_buy_secs
                        && now_secs - last < self.config.buy_interval_secs
                    {
                        warn!(
                            "股票 {} 距上次买入仅 {}s，不足 {}s 冷却间隔，拒绝",
                            signal.code,
                            now_secs - last,
                            self.config.buy_interval_secs
                        );
                        continue;
                    }

                    if self.is_duplicate(&signal, todays_orders) {
                        warn!(
                            "股票 {} 当日已有同标签买入委托 ({})，拒绝重复提交",
                            signal.code, signal.remark
                        );
                        continue;
                    }

                    budget -= required;
                    self.pacing
                        .entry(signal.code.clone())
                        .or_default()
                        .last_buy_secs = Some(now_secs);
                    info!(
                        "接受买入信号: {} x{}，占用预算 {:.2}，剩余 {:.2}",
                        signal.code, signal.quantity, required, budget
                    );
                    accepted.push(signal);
                }
                TradeSide::Sell => {
                    let usable = account
                        .position(&signal.code)
                        .map(|p| p.usable_volume)
                        .unwrap_or(0);
                    if usable <= 0 {
                        warn!("股票 {} 没有可用持仓，不允许卖出", signal.code);
                        continue;
                    }

                    if let Some(interval) = self.config.sell_interval_secs {
                        let pacing = self
                            .pacing
                            .get(&signal.code)
                            .map(|p| *p)
                            .unwrap_or_default();
                        if let Some(last) = pacing.last_sell_secs
                            && now_secs - last < interval
                        {
                            warn!(
                                "股票 {} 距上次卖出仅 {}s，不足 {}s 冷却间隔，拒绝",
                                signal.code,
                                now_secs - last,
                                interval
                            );
                            continue;
                        }
                    }

                    self.pacing
                        .entry(signal.code.clone())
                        .or_default()
                        .last_sell_secs = Some(now_secs);
                    info!("接受卖出信号: {} x{}", signal.code, signal.quantity);
                    accepted.push(signal);
                }
            }
        }

        accepted
    }
}
