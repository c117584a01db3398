use async_trait::async_trait;
use futures::stream;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};
use zhanggui_core::market::error::MarketError;
use zhanggui_core::market::port::{QuoteBatch, QuoteBatchStream, QuoteFeed};

/// # Summary
/// 行情回放数据源：从 JSON Lines 文件逐行读出行情批次
/// （每行一个 `标的代码 -> TickQuote` 映射），按文件顺序推送。
/// 模拟盘演示与集成测试用它顶替实盘行情通道。
///
/// # Invariants
/// - 批次顺序与文件行序一致，流结束即回放完毕。
/// - 订阅时按请求的标的过滤，过滤后为空的批次被跳过。
pub struct ReplayFeed {
    path: PathBuf,
}

impl ReplayFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuoteFeed for ReplayFeed {
    /// # Logic
    /// 1. 一次性读入并解析整个回放文件（行级容错：坏行告警后跳过）。
    /// 2. 过滤出请求的标的，空批次丢弃。
    /// 3. 以顺序流的形式交给消费方。
    async fn subscribe(&self, codes: &[String]) -> Result<QuoteBatchStream, MarketError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MarketError::Feed(format!("读取回放文件 {} 失败: {e}", self.path.display())))?;

        let wanted: HashSet<&String> = codes.iter().collect();
        let mut batches: Vec<QuoteBatch> = Vec::new();

        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let batch: QuoteBatch = match serde_json::from_str(line) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("回放文件第 {} 行解析失败，跳过: {e}", line_no + 1);
                    continue;
                }
            };
            let filtered: QuoteBatch = batch
                .into_iter()
                .filter(|(code, _)| wanted.contains(code))
                .collect();
            if !filtered.is_empty() {
                batches.push(filtered);
            }
        }

        info!(
            "回放数据源就绪: {}, 批次数: {}, 订阅标的: {}",
            self.path.display(),
            batches.len(),
            codes.len()
        );
        Ok(Box::pin(stream::iter(batches)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use zhanggui_core::market::entity::TickQuote;

    fn tick_json(last: &str) -> String {
        format!(
            r#"{{"430017.BJ": {{"time": 1744767365000, "last_price": {last}, "open": 15.3, "high": 15.88, "low": 15.25, "prev_close": 15.31, "amount": 0, "volume": 0, "ask_price": [15.55], "bid_price": [15.4], "ask_vol": [12], "bid_vol": [19]}}}}"#
        )
    }

    #[tokio::test]
    async fn test_replay_preserves_order_and_filters_codes() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "{}", tick_json("15.45"))?;
        writeln!(file, "not json at all")?;
        writeln!(file, "{}", tick_json("15.50"))?;

        let feed = ReplayFeed::new(file.path());
        let stream = feed.subscribe(&["430017.BJ".to_string()]).await?;
        let batches: Vec<QuoteBatch> = stream.collect().await;

        assert_eq!(batches.len(), 2);
        let first: &TickQuote = &batches[0]["430017.BJ"];
        assert_eq!(first.last_price, dec!(15.45));
        assert_eq!(batches[1]["430017.BJ"].last_price, dec!(15.50));

        // 未订阅的标的整批被过滤掉
        let feed = ReplayFeed::new(file.path());
        let stream = feed.subscribe(&["600000.SH".to_string()]).await?;
        assert_eq!(stream.collect::<Vec<_>>().await.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_feed_error() {
        let feed = ReplayFeed::new("/nonexistent/replay.jsonl");
        let err = feed.subscribe(&[]).await.err();
        assert!(matches!(err, Some(MarketError::Feed(_))));
    }
}
