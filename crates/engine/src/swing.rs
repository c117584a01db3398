use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use zhanggui_core::market::port::{HistoryProvider, QuoteBatch};
use zhanggui_core::risk::entity::Signal;
use zhanggui_core::strategy::port::Strategy;
use zhanggui_core::trade::entity::{AccountSnapshot, TradeSide};

/// 波段策略参数
#[derive(Debug, Clone)]
pub struct SwingParams {
    /// 下跌买入阈值（现价 < 成本 * 此值时加仓）
    pub buy_threshold: Decimal,
    /// 上涨卖出阈值（现价 > 成本 * 此值时减仓）
    pub sell_threshold: Decimal,
    /// 接近满仓后的更深下跌买入阈值
    pub buy_threshold_2: Decimal,
    /// 深度获利的更高卖出阈值
    pub sell_threshold_2: Decimal,
    /// 空仓建仓折价（现价 < 区间均价 * 此值时首次买入）
    pub fresh_entry_discount: Decimal,
    /// 最大持仓数量（股）
    pub max_position: i64,
    /// 保底持仓数量（股），减仓不打穿
    pub min_position: i64,
    /// 软上限持仓数量（股）
    pub soft_max_position: i64,
    /// 软下限持仓数量（股）
    pub soft_min_position: i64,
    /// 单次交易数量（股）
    pub single_trade_quantity: i64,
    /// 大盘当日跌幅低于此值（百分比）时暂停买入
    pub market_drop_threshold: Decimal,
}

impl Default for SwingParams {
    fn default() -> Self {
        Self {
            buy_threshold: Decimal::new(95, 2),
            sell_threshold: Decimal::new(105, 2),
            buy_threshold_2: Decimal::new(92, 2),
            sell_threshold_2: Decimal::new(108, 2),
            fresh_entry_discount: Decimal::new(90, 2),
            max_position: 1000,
            min_position: 100,
            soft_max_position: 800,
            soft_min_position: 400,
            single_trade_quantity: 100,
            market_drop_threshold: Decimal::from(-2),
        }
    }
}

/// # Summary
/// 基于波动的持仓优化策略：利用周期内股价围绕成本的波动，
/// 低点加仓、高点减仓，降低持仓成本。
/// 策略假设：选中的标的中长线稳健向上。
///
/// # Invariants
/// - 求值只读行情与账户快照，冷却与资金约束交给下游风控。
/// - `prepare_data` 成功之前 `evaluate` 不产生任何信号。
pub struct SwingStrategy {
    name: String,
    params: SwingParams,
    target_codes: Vec<String>,
    market_index: String,
    /// 历史区间（均价基准），"YYYYMMDD"
    avg_start: String,
    avg_end: String,
    /// 标的代码 -> 区间日均价（空仓建仓的基准）
    code2avg: HashMap<String, Decimal>,
    data_ready: bool,
}

impl SwingStrategy {
    pub fn new(
        target_codes: Vec<String>,
        market_index: String,
        avg_start: impl Into<String>,
        avg_end: impl Into<String>,
        params: SwingParams,
    ) -> Self {
        Self {
            name: "swing".to_string(),
            params,
            target_codes,
            market_index,
            avg_start: avg_start.into(),
            avg_end: avg_end.into(),
            code2avg: HashMap::new(),
            data_ready: false,
        }
    }

    /// 买入判定；返回建议数量，0 表示不买
    fn buy_quantity(&self, volume: i64, cost_price: Decimal, price: Decimal, code: &str) -> i64 {
        if volume >= self.params.max_position {
            return 0;
        }

        // 空仓时以区间均价的折价作为建仓基准
        if cost_price <= Decimal::ZERO {
            let avg = self.code2avg.get(code).copied().unwrap_or(Decimal::ZERO);
            if avg > Decimal::ZERO && price < avg * self.params.fresh_entry_discount {
                return self.params.single_trade_quantity;
            }
            return 0;
        }

        // 常规加仓
        if volume < self.params.soft_max_position && price < cost_price * self.params.buy_threshold {
            return self.params.single_trade_quantity;
        }

        // 接近满仓时要求更深的回调
        if volume >= self.params.soft_max_position && price < cost_price * self.params.buy_threshold_2
        {
            return self.params.single_trade_quantity;
        }

        0
    }

    /// 卖出判定；返回建议数量，0 表示不卖
    fn sell_quantity(&self, volume: i64, cost_price: Decimal, price: Decimal) -> i64 {
        if cost_price <= Decimal::ZERO || volume <= self.params.min_position {
            return 0;
        }

        let hit = (volume > self.params.soft_min_position
            && price > cost_price * self.params.sell_threshold)
            || price > cost_price * self.params.sell_threshold_2;
        if !hit {
            return 0;
        }

        self.params
            .single_trade_quantity
            .min(volume - self.params.min_position)
            .max(0)
    }
}

#[async_trait]
impl Strategy for SwingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    /// # Logic
    /// 拉取区间日均价作为空仓建仓基准；拉取失败时保持未就绪并告警。
    async fn prepare_data(&mut self, history: &dyn HistoryProvider) -> bool {
        match history
            .daily_avg(&self.target_codes, &self.avg_start, &self.avg_end)
            .await
        {
            Ok(code2avg) => {
                for (code, avg) in &code2avg {
                    if *avg <= Decimal::ZERO {
                        warn!("{code} 区间均价无效，空仓建仓判定将跳过该标的");
                    }
                }
                self.code2avg = code2avg;
                self.data_ready = true;
                info!(
                    "策略 {} 数据准备完成: {} 个标的",
                    self.name,
                    self.code2avg.len()
                );
                true
            }
            Err(e) => {
                warn!("策略 {} 数据准备失败: {e}", self.name);
                false
            }
        }
    }

    /// # Logic
    /// 1. 大盘指数当日跌幅超过阈值时暂停一切买入（卖出不受限）。
    /// 2. 对每个目标标的：现价相对成本（或空仓时相对区间均价）
    ///    触发低买高卖判定，产出信号。
    fn evaluate(&mut self, ticks: &QuoteBatch, account: &AccountSnapshot) -> Vec<Signal> {
        if !self.data_ready {
            return Vec::new();
        }

        let market_weak = ticks
            .get(&self.market_index)
            .and_then(|t| t.rise_since_open())
            .is_some_and(|rise| rise < self.params.market_drop_threshold);

        let mut signals = Vec::new();
        for code in &self.target_codes {
            let Some(tick) = ticks.get(code) else {
                continue;
            };
            let price = tick.last_price;
            if price <= Decimal::ZERO {
                continue;
            }

            let (volume, cost_price) = account
                .position(code)
                .map(|p| (p.volume, p.avg_price))
                .unwrap_or((0, Decimal::ZERO));

            if !market_weak {
                let quantity = self.buy_quantity(volume, cost_price, price, code);
                if quantity > 0 {
                    signals.push(Signal::new(code.clone(), TradeSide::Buy, quantity, &self.name));
                    continue;
                }
            }

            let quantity = self.sell_quantity(volume, cost_price, price);
            if quantity > 0 {
                signals.push(Signal::new(code.clone(), TradeSide::Sell, quantity, &self.name));
            }
        }

        signals
    }
}
