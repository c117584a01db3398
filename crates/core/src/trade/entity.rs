use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 系统内的唯一账户标识，用于隔离不同账户的资金体系与持久化文件。
///
/// # Invariants
/// - AccountId 在整个系统中必须全局唯一。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountId(pub String);

/// # Summary
/// 订单的系统内唯一标识。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// # Summary
/// 交易方向。现货账户只有买入建仓和卖出减仓两个方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    /// 买入
    Buy,
    /// 卖出
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// # Summary
/// 订单的生命周期状态。
///
/// # Invariants
/// - `Pending` 是唯一的非终态；订单一旦进入终态不再发生任何状态迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// 待成交 (已进入模拟交易所撮合队列)
    Pending,
    /// 完全成交
    Completed,
    /// 执行失败 (账务拒绝，如资金或持仓不足)
    Failed,
    /// 已撤销
    Cancelled,
}

impl OrderStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// # Summary
/// 逻辑委托单。策略信号通过风控后转化为此结构进入撮合队列。
///
/// # Invariants
/// - `quantity` 恒为正；方向由 `side` 表达。
/// - `Completed` 状态必须同时携带 `execution_price` 与 `execution_time`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 系统内全局唯一的订单 ID
    pub id: OrderId,
    /// 交易标的代码
    pub code: String,
    /// 交易方向
    pub side: TradeSide,
    /// 委托数量
    pub quantity: i64,
    /// 委托限价
    pub price: Decimal,
    /// 委托备注（策略标签，用于重复委托判定）
    pub remark: String,
    /// 订单状态
    pub status: OrderStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 实际成交价格（仅 Completed）
    pub execution_price: Option<Decimal>,
    /// 实际成交时间（仅 Completed）
    pub execution_time: Option<DateTime<Utc>>,
}

impl Order {
    /// # Logic
    /// 创建一笔全新的委托单，初始状态为 Pending。
    pub fn new(
        id: OrderId,
        code: String,
        side: TradeSide,
        quantity: i64,
        price: Decimal,
        remark: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            side,
            quantity,
            price,
            remark,
            status: OrderStatus::Pending,
            created_at,
            execution_price: None,
            execution_time: None,
        }
    }
}

/// # Summary
/// 单笔成交流水。只由撮合引擎在成交时创建，创建后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 流水唯一 ID
    pub trade_id: String,
    /// 关联的原始委托单 ID
    pub order_id: OrderId,
    /// 交易标的代码
    pub code: String,
    /// 成交方向
    pub side: TradeSide,
    /// 成交数量
    pub quantity: i64,
    /// 成交价格
    pub price: Decimal,
    /// 成交金额 (price * quantity)
    pub value: Decimal,
    /// 手续费
    pub commission: Decimal,
    /// 已实现盈亏（仅卖出流水携带）
    pub profit: Option<Decimal>,
    /// 来源策略标签
    pub remark: String,
    /// 成交时间
    pub trade_time: DateTime<Utc>,
}

/// # Summary
/// 指定标的的持仓记录。
///
/// # Invariants
/// - `volume >= usable_volume >= 0`；`volume == 0` 的持仓必须从持仓表移除。
/// - `avg_price = cost / volume`，卖出摊薄成本后均价保持不变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 标的代码
    pub code: String,
    /// 当前持有数量
    pub volume: i64,
    /// 可卖数量（T+1 规则下可能小于 volume）
    pub usable_volume: i64,
    /// 持仓总成本
    pub cost: Decimal,
    /// 持仓均价
    pub avg_price: Decimal,
    /// 首次建仓价格
    pub open_price: Decimal,
    /// 最新价
    pub last_price: Decimal,
    /// 持仓市值 (volume * last_price)
    pub market_value: Decimal,
    /// 浮动盈亏 (market_value - cost)
    pub profit: Decimal,
    /// 盈亏比例 (profit / cost，成本为 0 时记 0)
    pub profit_ratio: Decimal,
    /// 仓位占比 (market_value / total_asset，总资产无效时记 0)
    pub position_ratio: Decimal,
    /// 建仓时间
    pub created_at: DateTime<Utc>,
    /// 最近更新时间
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// # Logic
    /// 以一笔买入成交建立新持仓。
    pub fn opened(
        code: String,
        quantity: i64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        let value = price * Decimal::from(quantity);
        Self {
            code,
            volume: quantity,
            usable_volume: quantity,
            cost: value,
            avg_price: price,
            open_price: price,
            last_price: price,
            market_value: value,
            profit: Decimal::ZERO,
            profit_ratio: Decimal::ZERO,
            position_ratio: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// # Summary
/// 账户聚合根的资金概况快照，持久化的账户摘要与之同构。
///
/// # Invariants
/// - `total_asset == cash + frozen_cash + market_value`（账务恒等式）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    /// 可用资金
    pub cash: Decimal,
    /// 冻结资金（模拟盘恒为 0，为对齐实盘账户保留）
    pub frozen_cash: Decimal,
    /// 持仓总市值
    pub market_value: Decimal,
    /// 总资产
    pub total_asset: Decimal,
    /// 累计手续费
    pub commission: Decimal,
    /// 账户创建时间
    pub created_at: DateTime<Utc>,
    /// 最近变动时间
    pub updated_at: DateTime<Utc>,
    /// 持仓列表
    pub positions: Vec<Position>,
}

impl AccountSnapshot {
    /// 当前总仓位比例 (市值 / 总资产)，总资产无效时记 0。
    pub fn position_ratio(&self) -> Decimal {
        if self.total_asset <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.market_value / self.total_asset
    }

    /// 按代码查找持仓
    pub fn position(&self, code: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.code == code)
    }
}
