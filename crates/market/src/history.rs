use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use zhanggui_core::market::error::MarketError;
use zhanggui_core::market::port::HistoryProvider;

/// 日线历史文件的磁盘结构
#[derive(Debug, Deserialize)]
struct HistoryFile {
    /// 交易日历（升序，"YYYYMMDD"）
    trading_days: Vec<String>,
    /// 标的代码 -> 与交易日历逐位对齐的日收盘价
    daily_closes: HashMap<String, Vec<Decimal>>,
}

/// # Summary
/// 文件版历史数据提供者。整个文件在构造时一次载入，
/// 收盘价序列与交易日历逐位对齐，回测与策略数据准备共用。
///
/// # Invariants
/// - `trading_days` 升序且不重复。
/// - 某标的价格序列比日历短时，缺失位置按无数据处理。
pub struct FileHistoryProvider {
    data: HistoryFile,
}

impl FileHistoryProvider {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MarketError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MarketError::NoHistory(format!("{}: {e}", path.display())))?;
        let data: HistoryFile = serde_json::from_str(&raw)
            .map_err(|e| MarketError::Malformed(format!("{}: {e}", path.display())))?;
        info!(
            "加载日线历史: {}, 交易日 {} 个, 标的 {} 个",
            path.display(),
            data.trading_days.len(),
            data.daily_closes.len()
        );
        Ok(Self { data })
    }

    /// 日期闭区间在日历中的下标范围
    fn day_range(&self, start: &str, end: &str) -> Option<(usize, usize)> {
        let first = self
            .data
            .trading_days
            .iter()
            .position(|d| d.as_str() >= start)?;
        let last = self
            .data
            .trading_days
            .iter()
            .rposition(|d| d.as_str() <= end)?;
        (first <= last).then_some((first, last))
    }
}

#[async_trait]
impl HistoryProvider for FileHistoryProvider {
    /// # Logic
    /// 1. 将日期区间映射为日历下标区间。
    /// 2. 对每个标的截取对齐的收盘价切片；无数据的标的跳过并告警。
    async fn daily_closes(
        &self,
        codes: &[String],
        start: &str,
        end: &str,
    ) -> Result<HashMap<String, Vec<Decimal>>, MarketError> {
        let Some((first, last)) = self.day_range(start, end) else {
            return Err(MarketError::NoHistory(format!(
                "区间 {start}..{end} 内没有交易日"
            )));
        };

        let mut result = HashMap::new();
        for code in codes {
            match self.data.daily_closes.get(code) {
                Some(prices) if prices.len() > first => {
                    let upper = (last + 1).min(prices.len());
                    result.insert(code.clone(), prices[first..upper].to_vec());
                }
                _ => warn!("{code} 在指定时间段内没有有效的价格数据"),
            }
        }
        Ok(result)
    }

    async fn trading_days(&self, start: &str, end: &str) -> Result<Vec<String>, MarketError> {
        Ok(self
            .data
            .trading_days
            .iter()
            .filter(|d| d.as_str() >= start && d.as_str() <= end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tmp file");
        write!(
            file,
            r#"{{
                "trading_days": ["20240102", "20240103", "20240104", "20240105"],
                "daily_closes": {{
                    "430017.BJ": [15.2, 15.4, 15.1, 15.6],
                    "899050.BJ": [1020.0, 1018.5, 1025.0, 1030.2]
                }}
            }}"#
        )
        .expect("write sample");
        file
    }

    #[tokio::test]
    async fn test_daily_closes_aligned_to_calendar() -> anyhow::Result<()> {
        let file = sample_file();
        let provider = FileHistoryProvider::new(file.path())?;

        let closes = provider
            .daily_closes(&["430017.BJ".to_string()], "20240103", "20240104")
            .await?;
        assert_eq!(closes["430017.BJ"], vec![dec!(15.4), dec!(15.1)]);

        let days = provider.trading_days("20240103", "20240105").await?;
        assert_eq!(days, vec!["20240103", "20240104", "20240105"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_avg_skips_invalid_prices() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "trading_days": ["20240102", "20240103", "20240104"],
                "daily_closes": {{ "430017.BJ": [10.0, 0.0, 14.0] }}
            }}"#
        )?;
        let provider = FileHistoryProvider::new(file.path())?;

        let avgs = provider
            .daily_avg(&["430017.BJ".to_string(), "000000.XX".to_string()], "20240102", "20240104")
            .await?;
        // 无效的 0 价被剔除: (10 + 14) / 2
        assert_eq!(avgs["430017.BJ"], dec!(12));
        assert_eq!(avgs["000000.XX"], Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_range_is_error() -> anyhow::Result<()> {
        let file = sample_file();
        let provider = FileHistoryProvider::new(file.path())?;
        assert!(
            provider
                .daily_closes(&["430017.BJ".to_string()], "20250101", "20250131")
                .await
                .is_err()
        );
        Ok(())
    }
}
