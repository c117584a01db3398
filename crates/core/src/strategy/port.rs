use crate::market::port::{HistoryProvider, QuoteBatch};
use crate::risk::entity::Signal;
use crate::trade::entity::AccountSnapshot;
use async_trait::async_trait;

/// # Summary
/// 策略能力接口。风控与撮合只依赖此接口，从不感知具体策略类型。
/// 两个操作对应策略的两个生命阶段：开盘前的数据准备，和盘中对
/// 每个行情批次的求值。
///
/// # Invariants
/// - `evaluate` 必须是无副作用的纯求值（除策略自身的内部状态外），
///   不允许直接触达账户或交易通道。
#[async_trait]
pub trait Strategy: Send + Sync {
    /// 策略名称，同时作为信号 remark 的来源标签
    fn name(&self) -> &str;

    /// # Summary
    /// 准备策略所需的历史数据（如区间日均价）。
    ///
    /// # Returns
    /// * `true` - 数据就绪，策略可以参与求值。
    /// * `false` - 数据缺失，调用方应跳过该策略并告警。
    async fn prepare_data(&mut self, history: &dyn HistoryProvider) -> bool;

    /// # Summary
    /// 对一批行情求值，产出零个或多个交易信号。
    ///
    /// # Arguments
    /// * `ticks` - 行情批次。
    /// * `account` - 账户快照（持仓数量、成本参与买卖判定）。
    fn evaluate(&mut self, ticks: &QuoteBatch, account: &AccountSnapshot) -> Vec<Signal>;
}
