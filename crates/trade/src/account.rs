use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zhanggui_core::common::time::TimeProvider;
use zhanggui_core::store::port::{AccountStore, AccountSummary, PersistedAccount};
use zhanggui_core::trade::entity::{
    AccountId, AccountSnapshot, OrderId, Position, TradeRecord, TradeSide,
};
use zhanggui_core::trade::port::TradeError;

/// # Summary
/// 账户账本的纯内存状态。资金、持仓、流水的唯一权威持有者，
/// 任何一次提交后都必须满足账务恒等式
/// `total_asset == cash + frozen_cash + Σ market_value`。
///
/// # Invariants
/// - `cash >= 0` 且所有 `position.volume >= 0`，在任意调用序列下成立。
/// - 被拒绝的变更（资金/持仓不足）不改动任何字段。
/// - `volume` 归零的持仓立即从持仓表移除。
pub struct AccountState {
    pub account_id: AccountId,
    cash: Decimal,
    frozen_cash: Decimal,
    market_value: Decimal,
    total_asset: Decimal,
    commission: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    positions: HashMap<String, Position>,
    trades: Vec<TradeRecord>,
}

impl AccountState {
    /// 以初始资金建立全新账户状态
    pub fn new(account_id: AccountId, initial_cash: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            cash: initial_cash,
            frozen_cash: Decimal::ZERO,
            market_value: Decimal::ZERO,
            total_asset: initial_cash,
            commission: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            positions: HashMap::new(),
            trades: Vec::new(),
        }
    }

    /// 从磁盘档案恢复账户状态
    pub fn from_persisted(persisted: PersistedAccount) -> Self {
        let s = persisted.summary;
        Self {
            account_id: s.account_id,
            cash: s.cash,
            frozen_cash: s.frozen_cash,
            market_value: s.market_value,
            total_asset: s.total_asset,
            commission: s.commission,
            created_at: s.created_at,
            updated_at: s.updated_at,
            positions: persisted.positions,
            trades: persisted.trades,
        }
    }

    /// # Summary
    /// 将一笔成交落账：资金划转、持仓成本重算、流水追加。
    ///
    /// # Logic
    /// 1. 校验数量与价格为正。
    /// 2. 买入：资金不足整单拒绝；否则扣减现金，按
    ///    `new_cost = old_cost + trade_value` 重算加权均价。
    /// 3. 卖出：持仓不足整单拒绝；否则按 `quantity / old_volume`
    ///    比例摊薄成本，实现盈亏 = 成交额 - 摊薄成本 - 手续费；
    ///    数量归零时整条持仓移除。
    /// 4. 追加不可变流水并刷新派生合计。
    ///
    /// # Returns
    /// 成交流水记录；拒绝时返回错误且状态保持原样。
    pub fn apply_fill(
        &mut self,
        order_id: &OrderId,
        code: &str,
        side: TradeSide,
        quantity: i64,
        price: Decimal,
        commission_rate: Decimal,
        remark: &str,
        now: DateTime<Utc>,
    ) -> Result<TradeRecord, TradeError> {
        if quantity <= 0 {
            return Err(TradeError::InvalidOrder(format!(
                "成交数量必须为正: {quantity}"
            )));
        }
        if price <= Decimal::ZERO {
            return Err(TradeError::InvalidOrder(format!("成交价格必须为正: {price}")));
        }

        let value = price * Decimal::from(quantity);
        let commission = value * commission_rate;
        let mut realized_profit = None;

        match side {
            TradeSide::Buy => {
                let required = value + commission;
                if self.cash < required {
                    warn!(
                        "资金不足，无法买入 {}: 需要 {:.2}, 可用 {:.2}",
                        code, required, self.cash
                    );
                    return Err(TradeError::InsufficientFunds {
                        required,
                        actual: self.cash,
                    });
                }

                self.cash -= required;
                self.commission += commission;

                if let Some(position) = self.positions.get_mut(code) {
                    position.volume += quantity;
                    // 模拟盘即时赋予可卖额度；实盘账本在此收紧为 T+1
                    position.usable_volume += quantity;
                    position.cost += value;
                    position.avg_price = position.cost / Decimal::from(position.volume);
                    position.last_price = price;
                    position.market_value = Decimal::from(position.volume) * price;
                    position.profit = position.market_value - position.cost;
                    position.profit_ratio = ratio_or_zero(position.profit, position.cost);
                    position.updated_at = now;
                } else {
                    self.positions
                        .insert(code.to_string(), Position::opened(code.to_string(), quantity, price, now));
                }

                info!(
                    "买入成功: 股票 {}, 数量 {}, 价格 {:.2}, 交易额 {:.2}, 手续费 {:.2}",
                    code, quantity, price, value, commission
                );
            }
            TradeSide::Sell => {
                let held = self.positions.get(code).map(|p| p.volume).unwrap_or(0);
                if held < quantity {
                    warn!(
                        "持仓不足，无法卖出 {}: 需要 {}, 可用 {}",
                        code, quantity, held
                    );
                    return Err(TradeError::InsufficientPosition {
                        required: quantity,
                        actual: held,
                    });
                }

                // held >= quantity > 0 保证 code 一定在持仓表中
                let Some(position) = self.positions.get_mut(code) else {
                    return Err(TradeError::Internal(format!("持仓表缺失 {code}")));
                };

                let sell_ratio = Decimal::from(quantity) / Decimal::from(position.volume);
                let sell_cost = position.cost * sell_ratio;
                let profit = value - sell_cost - commission;

                self.cash += value - commission;
                self.commission += commission;
                realized_profit = Some(profit);

                let new_volume = position.volume - quantity;
                if new_volume > 0 {
                    position.volume = new_volume;
                    position.usable_volume = (position.usable_volume - quantity).clamp(0, new_volume);
                    position.cost -= sell_cost;
                    position.avg_price = position.cost / Decimal::from(new_volume);
                    position.last_price = price;
                    position.market_value = Decimal::from(new_volume) * price;
                    position.profit = position.market_value - position.cost;
                    position.profit_ratio = ratio_or_zero(position.profit, position.cost);
                    position.updated_at = now;
                } else {
                    self.positions.remove(code);
                }

                info!(
                    "卖出成功: 股票 {}, 数量 {}, 价格 {:.2}, 交易额 {:.2}, 手续费 {:.2}, 收益 {:.2}",
                    code, quantity, price, value, commission, profit
                );
            }
        }

        let record = TradeRecord {
            trade_id: format!("{}_{}_{}", code, side, now.format("%Y%m%d%H%M%S%3f")),
            order_id: order_id.clone(),
            code: code.to_string(),
            side,
            quantity,
            price,
            value,
            commission,
            profit: realized_profit,
            remark: remark.to_string(),
            trade_time: now,
        };
        self.trades.push(record.clone());

        self.refresh_totals(now);
        Ok(record)
    }

    /// # Summary
    /// 按最新行情刷新持仓估值。
    ///
    /// # Logic
    /// 1. 对每个持仓中的标的更新最新价、市值、浮盈与盈亏比例。
    /// 2. 任一持仓变化后重算总市值、总资产与各持仓的仓位占比。
    ///
    /// # Returns
    /// 是否有持仓发生了变化。
    pub fn update_prices(&mut self, prices: &HashMap<String, Decimal>, now: DateTime<Utc>) -> bool {
        let mut updated = false;
        for (code, price) in prices {
            if *price <= Decimal::ZERO {
                continue;
            }
            if let Some(position) = self.positions.get_mut(code) {
                position.last_price = *price;
                position.market_value = Decimal::from(position.volume) * *price;
                position.profit = position.market_value - position.cost;
                position.profit_ratio = ratio_or_zero(position.profit, position.cost);
                position.updated_at = now;
                updated = true;
            }
        }

        if updated {
            self.refresh_totals(now);
        }
        updated
    }

    /// 重算总市值、总资产与各持仓的仓位占比
    fn refresh_totals(&mut self, now: DateTime<Utc>) {
        self.market_value = self.positions.values().map(|p| p.market_value).sum();
        self.total_asset = self.cash + self.frozen_cash + self.market_value;
        for position in self.positions.values_mut() {
            position.position_ratio = ratio_or_zero(position.market_value, self.total_asset);
        }
        self.updated_at = now;
    }

    pub fn available_cash(&self) -> Decimal {
        self.cash
    }

    pub fn total_asset(&self) -> Decimal {
        self.total_asset
    }

    pub fn market_value(&self) -> Decimal {
        self.market_value
    }

    pub fn position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    /// 当前总仓位比例（市值 / 总资产）
    pub fn position_ratio(&self) -> Decimal {
        ratio_or_zero(self.market_value, self.total_asset)
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// 资金与持仓的全量只读快照
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            account_id: self.account_id.clone(),
            cash: self.cash,
            frozen_cash: self.frozen_cash,
            market_value: self.market_value,
            total_asset: self.total_asset,
            commission: self.commission,
            created_at: self.created_at,
            updated_at: self.updated_at,
            positions: self.positions.values().cloned().collect(),
        }
    }

    /// 持久化用的账户摘要记录
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            account_id: self.account_id.clone(),
            cash: self.cash,
            frozen_cash: self.frozen_cash,
            market_value: self.market_value,
            total_asset: self.total_asset,
            commission: self.commission,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn positions_map(&self) -> &HashMap<String, Position> {
        &self.positions
    }
}

/// 分母非正时记 0 的比值
fn ratio_or_zero(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// # Summary
/// 账本句柄：内存状态 + 持久化端口的组合。
/// 每次账务变动后整体落盘（摘要/持仓/流水三类档案各自独立原子写），
/// 落盘失败只告警，不回滚内存——与实盘对账时以内存态为准。
pub struct Ledger {
    account_id: AccountId,
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn TimeProvider>,
    state: RwLock<AccountState>,
    /// 本次启动是否从磁盘档案恢复
    recovered: bool,
}

impl Ledger {
    /// # Summary
    /// 打开账本：有档案则恢复，否则按初始资金新建并立即落盘。
    ///
    /// # Logic
    /// 1. 尝试从存储端口加载；摘要缺失或损坏一律回退为全新状态并告警。
    /// 2. 新建时立即写出三类档案，保证磁盘与内存一致。
    pub async fn open(
        account_id: AccountId,
        initial_cash: Decimal,
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        let now = clock.now();
        let (state, recovered) = match store.load(&account_id).await {
            Ok(Some(persisted)) => {
                info!(
                    "加载账户档案成功: {}, 总资产: {:.2}",
                    account_id.0, persisted.summary.total_asset
                );
                (AccountState::from_persisted(persisted), true)
            }
            Ok(None) => {
                warn!(
                    "账户档案不存在或不完整，将使用初始资金 {:.2} 初始化账户 {}",
                    initial_cash, account_id.0
                );
                (AccountState::new(account_id, initial_cash, now), false)
            }
            Err(e) => {
                warn!("加载账户档案失败 ({e})，回退为全新账户 {}", account_id.0);
                (AccountState::new(account_id, initial_cash, now), false)
            }
        };

        let ledger = Self {
            account_id: state.account_id.clone(),
            store,
            clock,
            state: RwLock::new(state),
            recovered,
        };
        if !ledger.recovered {
            let state = ledger.state.read().await;
            ledger.persist_all(&state).await;
        }
        ledger
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// 本次启动是否从磁盘档案恢复（false 表示已回退为全新状态）
    pub fn recovered_from_disk(&self) -> bool {
        self.recovered
    }

    /// # Summary
    /// 落账一笔成交并持久化。拒绝的成交不触发任何写盘。
    pub async fn apply_fill(
        &self,
        order_id: &OrderId,
        code: &str,
        side: TradeSide,
        quantity: i64,
        price: Decimal,
        commission_rate: Decimal,
        remark: &str,
    ) -> Result<TradeRecord, TradeError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let record = state.apply_fill(
            order_id,
            code,
            side,
            quantity,
            price,
            commission_rate,
            remark,
            now,
        )?;
        self.persist_all(&state).await;
        Ok(record)
    }

    /// # Summary
    /// 刷新持仓最新价并持久化（摘要与持仓档案）。
    pub async fn update_prices(&self, prices: &HashMap<String, Decimal>) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let updated = state.update_prices(prices, now);
        if updated {
            self.persist_marks(&state).await;
        }
        updated
    }

    pub async fn snapshot(&self) -> AccountSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn available_cash(&self) -> Decimal {
        self.state.read().await.available_cash()
    }

    pub async fn total_asset(&self) -> Decimal {
        self.state.read().await.total_asset()
    }

    pub async fn market_value(&self) -> Decimal {
        self.state.read().await.market_value()
    }

    pub async fn position(&self, code: &str) -> Option<Position> {
        self.state.read().await.position(code).cloned()
    }

    pub async fn position_ratio(&self) -> Decimal {
        self.state.read().await.position_ratio()
    }

    pub async fn trade_records(&self) -> Vec<TradeRecord> {
        self.state.read().await.trades().to_vec()
    }

    /// # Summary
    /// 重置账户：归档现有档案（时间戳后缀改名，不删除），
    /// 然后以初始资金重建并落盘。
    pub async fn reset(&self, initial_cash: Decimal) -> Result<(), TradeError> {
        let mut state = self.state.write().await;
        self.store
            .archive(&state.account_id)
            .await
            .map_err(|e| TradeError::Internal(format!("归档账户档案失败: {e}")))?;

        let now = self.clock.now();
        let account_id = state.account_id.clone();
        *state = AccountState::new(account_id, initial_cash, now);
        self.persist_all(&state).await;
        info!("账户 {} 已重置，初始资金: {:.2}", state.account_id.0, initial_cash);
        Ok(())
    }

    /// 三类档案全量落盘，失败只告警
    async fn persist_all(&self, state: &AccountState) {
        if let Err(e) = self.store.save_summary(&state.summary()).await {
            warn!("保存账户摘要失败: {e}");
        }
        if let Err(e) = self
            .store
            .save_positions(&state.account_id, state.positions_map())
            .await
        {
            warn!("保存持仓档案失败: {e}");
        }
        if let Err(e) = self.store.save_trades(&state.account_id, state.trades()).await {
            warn!("保存成交流水失败: {e}");
        }
    }

    /// 行情刷新只涉及摘要与持仓档案
    async fn persist_marks(&self, state: &AccountState) {
        if let Err(e) = self.store.save_summary(&state.summary()).await {
            warn!("保存账户摘要失败: {e}");
        }
        if let Err(e) = self
            .store
            .save_positions(&state.account_id, state.positions_map())
            .await
        {
            warn!("保存持仓档案失败: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 45, 0).single().unwrap()
    }

    fn state(cash: Decimal) -> AccountState {
        AccountState::new(AccountId("ut".into()), cash, now())
    }

    fn oid() -> OrderId {
        OrderId("O1".into())
    }

    #[test]
    fn test_buy_weighted_average_cost() {
        let mut acc = state(dec!(100000));
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 100, dec!(10.0), Decimal::ZERO, "t", now())
            .unwrap();
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 100, dec!(12.0), Decimal::ZERO, "t", now())
            .unwrap();

        let pos = acc.position("430017.BJ").unwrap();
        assert_eq!(pos.volume, 200);
        assert_eq!(pos.avg_price, dec!(11.0));
        assert_eq!(pos.cost, dec!(2200));
        assert_eq!(pos.open_price, dec!(10.0));
    }

    #[test]
    fn test_partial_sell_apportions_cost() {
        let mut acc = state(dec!(100000));
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 100, dec!(10.0), Decimal::ZERO, "t", now())
            .unwrap();
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 100, dec!(12.0), Decimal::ZERO, "t", now())
            .unwrap();
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Sell, 50, dec!(13.0), Decimal::ZERO, "t", now())
            .unwrap();

        let pos = acc.position("430017.BJ").unwrap();
        assert_eq!(pos.volume, 150);
        assert_eq!(pos.cost, dec!(1650));
        assert_eq!(pos.avg_price, dec!(11.0));
    }

    #[test]
    fn test_full_liquidation_removes_position() {
        let mut acc = state(dec!(100000));
        acc.apply_fill(&oid(), "833171.BJ", TradeSide::Buy, 200, dec!(8.0), Decimal::ZERO, "t", now())
            .unwrap();
        acc.apply_fill(&oid(), "833171.BJ", TradeSide::Sell, 200, dec!(9.0), Decimal::ZERO, "t", now())
            .unwrap();

        assert!(acc.position("833171.BJ").is_none());
        assert_eq!(acc.available_cash(), dec!(100000) - dec!(1600) + dec!(1800));
    }

    #[test]
    fn test_insufficient_funds_mutates_nothing() {
        let mut acc = state(dec!(1000));
        let before = acc.snapshot();

        let err = acc
            .apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 100, dec!(15.0), dec!(0.0005), "t", now())
            .unwrap_err();
        assert!(matches!(err, TradeError::InsufficientFunds { .. }));

        let after = acc.snapshot();
        assert_eq!(before.cash, after.cash);
        assert_eq!(before.total_asset, after.total_asset);
        assert_eq!(before.commission, after.commission);
        assert!(after.positions.is_empty());
        assert!(acc.trades().is_empty());
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[test]
    fn test_insufficient_position_mutates_nothing() {
        let mut acc = state(dec!(10000));
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 100, dec!(10.0), Decimal::ZERO, "t", now())
            .unwrap();
        let before = acc.snapshot();

        let err = acc
            .apply_fill(&oid(), "430017.BJ", TradeSide::Sell, 200, dec!(11.0), Decimal::ZERO, "t", now())
            .unwrap_err();
        assert!(matches!(
            err,
            TradeError::InsufficientPosition { required: 200, actual: 100 }
        ));

        let after = acc.snapshot();
        assert_eq!(before.cash, after.cash);
        assert_eq!(after.position("430017.BJ").unwrap().volume, 100);
        assert_eq!(acc.trades().len(), 1);
    }

    #[test]
    fn test_accounting_identity_holds_through_fills_and_marks() {
        let mut acc = state(dec!(500000));
        let rate = dec!(0.0005);
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 1000, dec!(15.5), rate, "t", now())
            .unwrap();
        acc.apply_fill(&oid(), "600000.SH", TradeSide::Buy, 800, dec!(12.8), rate, "t", now())
            .unwrap();

        let mut prices = HashMap::new();
        prices.insert("430017.BJ".to_string(), dec!(17.2));
        prices.insert("600000.SH".to_string(), dec!(12.5));
        assert!(acc.update_prices(&prices, now()));

        let snap = acc.snapshot();
        let position_value: Decimal = snap.positions.iter().map(|p| p.market_value).sum();
        assert_eq!(snap.total_asset, snap.cash + snap.frozen_cash + position_value);
        assert!(snap.cash >= Decimal::ZERO);

        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Sell, 400, dec!(17.0), rate, "t", now())
            .unwrap();
        let snap = acc.snapshot();
        let position_value: Decimal = snap.positions.iter().map(|p| p.market_value).sum();
        assert_eq!(snap.total_asset, snap.cash + snap.frozen_cash + position_value);
    }

    #[test]
    fn test_update_prices_sets_profit_and_ratios() {
        let mut acc = state(dec!(100000));
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 1000, dec!(10.0), Decimal::ZERO, "t", now())
            .unwrap();

        let mut prices = HashMap::new();
        prices.insert("430017.BJ".to_string(), dec!(11.0));
        assert!(acc.update_prices(&prices, now()));

        let pos = acc.position("430017.BJ").unwrap();
        assert_eq!(pos.market_value, dec!(11000));
        assert_eq!(pos.profit, dec!(1000));
        assert_eq!(pos.profit_ratio, dec!(0.1));
        assert_eq!(pos.position_ratio, dec!(11000) / acc.total_asset());

        // 未持仓的标的不产生任何变化
        let mut other = HashMap::new();
        other.insert("000001.SZ".to_string(), dec!(9.0));
        assert!(!acc.update_prices(&other, now()));
    }

    #[test]
    fn test_sell_realizes_profit_net_of_commission() {
        let mut acc = state(dec!(100000));
        let rate = dec!(0.0003);
        acc.apply_fill(&oid(), "430017.BJ", TradeSide::Buy, 1000, dec!(15.5), rate, "t", now())
            .unwrap();
        let record = acc
            .apply_fill(&oid(), "430017.BJ", TradeSide::Sell, 1000, dec!(16.0), rate, "t", now())
            .unwrap();

        // 摊薄成本 15500，成交额 16000，手续费 4.8
        assert_eq!(record.profit, Some(dec!(16000) - dec!(15500) - dec!(4.8)));
        assert_eq!(record.value, dec!(16000));
    }
}
