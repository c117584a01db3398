use crate::EngineError;
use crate::evaluator::{BacktestReport, DailyValue, Evaluator};
use crate::runtime::TradingSession;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use zhanggui_core::common::time::FakeClockProvider;
use zhanggui_core::market::entity::TickQuote;
use zhanggui_core::market::error::MarketError;
use zhanggui_core::market::port::{HistoryProvider, QuoteBatch};
use zhanggui_core::trade::port::TradePort;

/// # Summary
/// 回测驱动器：接管时间流向，把历史日收盘价合成为行情批次，
/// 驱动与实盘完全相同的 策略 → 风控 → 模拟交易所 管线。
///
/// # Invariants
/// - 每个交易日先把虚拟时钟拨到该日收盘时刻，再派发行情批次；
///   冷却判定与订单时间戳由此全部落在回测时间轴上。
/// - 合成行情的买一/卖一都等于当日收盘价，收盘价委托必然穿越。
pub struct BacktestDriver {
    history: Arc<dyn HistoryProvider>,
    clock: Arc<FakeClockProvider>,
    market_index: String,
}

impl BacktestDriver {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        clock: Arc<FakeClockProvider>,
        market_index: impl Into<String>,
    ) -> Self {
        Self {
            history,
            clock,
            market_index: market_index.into(),
        }
    }

    /// # Summary
    /// 在给定日期区间内执行整个回测序列跑批并给出评估报告。
    ///
    /// # Logic
    /// 1. 预拉取全部交易日与逐日收盘价。
    /// 2. 逐日：拨动时钟 -> 合成行情批次 -> `session.step`。
    /// 3. 每日收盘后采样账户总资产，形成每日资产曲线。
    /// 4. 交由评估器汇总收益率与成交统计。
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        session: &mut TradingSession,
        trade: Arc<dyn TradePort>,
        codes: &[String],
        start: &str,
        end: &str,
        initial_cash: Decimal,
        strategy_name: &str,
    ) -> Result<BacktestReport, EngineError> {
        let days = self.history.trading_days(start, end).await?;
        if days.is_empty() {
            return Err(EngineError::Market(MarketError::NoHistory(format!(
                "区间 {start}..{end} 内没有交易日"
            ))));
        }
        info!("回测启动: {} 个交易日, {} 个标的", days.len(), codes.len());

        let mut all_codes = codes.to_vec();
        if !all_codes.contains(&self.market_index) {
            all_codes.push(self.market_index.clone());
        }
        let closes = self.history.daily_closes(&all_codes, start, end).await?;

        let mut daily_values = Vec::with_capacity(days.len());
        for (idx, day) in days.iter().enumerate() {
            let close_time = day_close_utc(day)?;
            self.clock.set_time(close_time);

            let mut batch = QuoteBatch::new();
            for code in &all_codes {
                let price = closes
                    .get(code)
                    .and_then(|prices| prices.get(idx))
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                if price > Decimal::ZERO {
                    batch.insert(code.clone(), synth_tick(price, close_time.timestamp_millis()));
                }
            }
            if batch.is_empty() {
                continue;
            }

            session.step(&batch).await;

            let snapshot = trade.account_snapshot().await;
            let index_price = closes
                .get(&self.market_index)
                .and_then(|prices| prices.get(idx))
                .copied()
                .unwrap_or(Decimal::ZERO);
            daily_values.push(DailyValue {
                date: day.clone(),
                total_asset: snapshot.total_asset,
                market_index: index_price,
                cash: snapshot.cash,
            });
        }

        let final_snapshot = trade.account_snapshot().await;
        let trades = trade.trade_records().await;
        info!("回测完成: 成交 {} 笔", trades.len());
        Ok(Evaluator::evaluate(
            strategy_name,
            initial_cash,
            &final_snapshot,
            &trades,
            daily_values,
        ))
    }
}

/// 把 "YYYYMMDD" 解析为该日 A 股收盘时刻（北京时间 15:00 = UTC 07:00）
fn day_close_utc(day: &str) -> Result<chrono::DateTime<Utc>, EngineError> {
    let date = NaiveDate::parse_from_str(day, "%Y%m%d")
        .map_err(|e| EngineError::Market(MarketError::Malformed(format!("交易日 {day}: {e}"))))?;
    date.and_hms_opt(7, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| EngineError::Internal(format!("交易日 {day} 无法换算收盘时刻")))
}

/// 从日收盘价合成可直接穿越的行情批次成员
fn synth_tick(price: Decimal, time_ms: i64) -> TickQuote {
    TickQuote {
        time: time_ms,
        last_price: price,
        open: price,
        high: price,
        low: price,
        prev_close: price,
        amount: Decimal::ZERO,
        volume: 0,
        ask_price: vec![price; 5],
        bid_price: vec![price; 5],
        ask_vol: vec![0; 5],
        bid_vol: vec![0; 5],
    }
}
