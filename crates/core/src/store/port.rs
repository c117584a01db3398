use super::error::StoreError;
use crate::trade::entity::{AccountId, Position, TradeRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// # Summary
/// 持久化的账户摘要记录（资金侧，不含持仓明细）。
///
/// # Invariants
/// - 每次账务变动后整体重写，字段齐全才算有效档案。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: AccountId,
    pub cash: Decimal,
    pub frozen_cash: Decimal,
    pub market_value: Decimal,
    pub total_asset: Decimal,
    pub commission: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// # Summary
/// 从磁盘加载出的账户全量状态。三类档案相互独立：
/// 摘要可读而持仓/流水损坏时，后两者以空值兜底。
#[derive(Debug, Clone)]
pub struct PersistedAccount {
    pub summary: AccountSummary,
    pub positions: HashMap<String, Position>,
    pub trades: Vec<TradeRecord>,
}

/// # Summary
/// 账户档案持久化接口。摘要、持仓、流水按记录类型独立存放，
/// 任一类型加载失败不影响其余类型。
///
/// # Invariants
/// - 单个档案的写入必须是原子的（不留半写状态）。
/// - `archive` 只能改名留痕，永远不得删除旧档案。
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Summary
    /// 加载账户全量状态。
    ///
    /// # Returns
    /// * `Ok(None)` - 摘要档案不存在或不完整，调用方应以初始资金重建。
    /// * `Ok(Some(..))` - 加载成功；持仓/流水档案损坏时以空集合兜底。
    async fn load(&self, account_id: &AccountId) -> Result<Option<PersistedAccount>, StoreError>;

    /// 整体重写账户摘要档案
    async fn save_summary(&self, summary: &AccountSummary) -> Result<(), StoreError>;

    /// 整体重写持仓档案（按标的代码索引）
    async fn save_positions(
        &self,
        account_id: &AccountId,
        positions: &HashMap<String, Position>,
    ) -> Result<(), StoreError>;

    /// 整体重写成交流水档案（保持成交顺序）
    async fn save_trades(
        &self,
        account_id: &AccountId,
        trades: &[TradeRecord],
    ) -> Result<(), StoreError>;

    /// 将现有档案以时间戳后缀归档，供重置前留痕
    async fn archive(&self, account_id: &AccountId) -> Result<(), StoreError>;
}
