use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use zhanggui_core::trade::entity::{AccountSnapshot, TradeRecord};

/// 回测期间单个交易日收盘后的资产记录
#[derive(Debug, Clone, Serialize)]
pub struct DailyValue {
    /// 交易日 "YYYYMMDD"
    pub date: String,
    /// 当日收盘后的总资产
    pub total_asset: Decimal,
    /// 当日大盘指数收盘价（无数据时为 0）
    pub market_index: Decimal,
    /// 当日收盘后的可用现金
    pub cash: Decimal,
}

/// # Summary
/// 一次回测跑批的评估结果。
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub strategy_name: String,
    pub initial_cash: Decimal,
    pub final_cash: Decimal,
    pub final_value: Decimal,
    /// 总收益率（百分比）
    pub total_return: Decimal,
    pub trade_count: usize,
    /// 每日资产价值曲线
    pub daily_values: Vec<DailyValue>,
}

/// # Summary
/// 策略评估器：汇总回测产生的成交与每日资产曲线，给出评分。
pub struct Evaluator;

impl Evaluator {
    /// # Logic
    /// 1. 总收益率 = (期末总资产 / 初始资金 - 1) * 100。
    /// 2. 曲线为空时以初始资金兜底（策略全程未动仓也要可评）。
    pub fn evaluate(
        strategy_name: &str,
        initial_cash: Decimal,
        final_snapshot: &AccountSnapshot,
        trades: &[TradeRecord],
        daily_values: Vec<DailyValue>,
    ) -> BacktestReport {
        let final_value = daily_values
            .last()
            .map(|d| d.total_asset)
            .unwrap_or(initial_cash);
        let total_return = if initial_cash > Decimal::ZERO {
            (final_value / initial_cash - Decimal::ONE) * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        let report = BacktestReport {
            strategy_name: strategy_name.to_string(),
            initial_cash,
            final_cash: final_snapshot.cash,
            final_value,
            total_return,
            trade_count: trades.len(),
            daily_values,
        };

        info!(
            "策略评估完成: {}, 总收益率: {:.2}%, 成交笔数: {}",
            report.strategy_name, report.total_return, report.trade_count
        );
        for day in &report.daily_values {
            info!(
                "每日资产价值: {}, {:.2}, 市场指数: {:.2}, cash: {:.2}",
                day.date, day.total_asset, day.market_index, day.cash
            );
        }
        report
    }
}
