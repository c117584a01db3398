use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zhanggui_core::store::error::StoreError;
use zhanggui_core::store::port::{AccountStore, AccountSummary, PersistedAccount};
use zhanggui_core::trade::entity::{AccountId, Position, TradeRecord};

/// # Summary
/// 基于 JSON 文件的账户档案存储。每个账户三个独立档案：
/// `{id}.json`（摘要）、`{id}_positions.json`（持仓，按代码索引）、
/// `{id}_trades.json`（成交流水，保持顺序）。
///
/// # Invariants
/// - 单个档案写入走临时文件 + 原子改名，磁盘上不存在半写状态。
/// - 三类档案相互独立，任一损坏不影响其余两类的读取。
/// - 归档只改名（`.{时间戳}.bak` 后缀），永不删除历史档案。
pub struct JsonAccountStore {
    base_dir: PathBuf,
}

impl JsonAccountStore {
    /// # Logic
    /// 确保档案目录存在；不可创建时直接报初始化错误。
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            std::fs::create_dir_all(&base_dir)
                .map_err(|e| StoreError::InitError(format!("创建账户档案目录失败: {e}")))?;
        }
        Ok(Self { base_dir })
    }

    fn summary_path(&self, account_id: &AccountId) -> PathBuf {
        self.base_dir.join(format!("{}.json", account_id.0))
    }

    fn positions_path(&self, account_id: &AccountId) -> PathBuf {
        self.base_dir.join(format!("{}_positions.json", account_id.0))
    }

    fn trades_path(&self, account_id: &AccountId) -> PathBuf {
        self.base_dir.join(format!("{}_trades.json", account_id.0))
    }

    /// 临时文件 + 原子改名的整体重写
    async fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Corrupt(format!("序列化档案失败: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| StoreError::Io(format!("写入 {} 失败: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Io(format!("替换 {} 失败: {e}", path.display())))?;
        debug!("保存档案成功: {}", path.display());
        Ok(())
    }

    /// 读取并反序列化一个档案；文件不存在返回 Ok(None)
    async fn read_record<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(format!("读取 {} 失败: {e}", path.display()))),
        };
        let value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{} 内容损坏: {e}", path.display())))?;
        Ok(Some(value))
    }

    /// 存在即归档改名；不存在跳过
    async fn archive_one(&self, path: &Path, backup_time: &str) -> Result<(), StoreError> {
        if !path.exists() {
            return Ok(());
        }
        let mut target = path.as_os_str().to_owned();
        target.push(format!(".{backup_time}.bak"));
        tokio::fs::rename(path, PathBuf::from(&target))
            .await
            .map_err(|e| StoreError::Io(format!("归档 {} 失败: {e}", path.display())))
    }
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    /// # Logic
    /// 1. 摘要档案不存在或损坏 -> Ok(None)，由调用方以初始资金重建。
    /// 2. 持仓/流水档案损坏时以空集合兜底并告警，不拖垮整体加载。
    async fn load(&self, account_id: &AccountId) -> Result<Option<PersistedAccount>, StoreError> {
        let summary: AccountSummary = match self.read_record(&self.summary_path(account_id)).await {
            Ok(Some(summary)) => summary,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("加载账户摘要失败: {e}");
                return Ok(None);
            }
        };

        let positions: HashMap<String, Position> =
            match self.read_record(&self.positions_path(account_id)).await {
                Ok(Some(positions)) => positions,
                Ok(None) => HashMap::new(),
                Err(e) => {
                    warn!("加载持仓档案失败，以空持仓继续: {e}");
                    HashMap::new()
                }
            };

        let trades: Vec<TradeRecord> = match self.read_record(&self.trades_path(account_id)).await {
            Ok(Some(trades)) => trades,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("加载成交流水失败，以空流水继续: {e}");
                Vec::new()
            }
        };

        info!(
            "加载账户档案: {}, 持仓数量: {}, 流水数量: {}",
            account_id.0,
            positions.len(),
            trades.len()
        );
        Ok(Some(PersistedAccount {
            summary,
            positions,
            trades,
        }))
    }

    async fn save_summary(&self, summary: &AccountSummary) -> Result<(), StoreError> {
        self.write_atomic(&self.summary_path(&summary.account_id), summary)
            .await
    }

    async fn save_positions(
        &self,
        account_id: &AccountId,
        positions: &HashMap<String, Position>,
    ) -> Result<(), StoreError> {
        self.write_atomic(&self.positions_path(account_id), positions)
            .await
    }

    async fn save_trades(
        &self,
        account_id: &AccountId,
        trades: &[TradeRecord],
    ) -> Result<(), StoreError> {
        self.write_atomic(&self.trades_path(account_id), &trades)
            .await
    }

    /// # Logic
    /// 以同一时间戳后缀归档三类档案，保持一次重置的档案成组可辨。
    async fn archive(&self, account_id: &AccountId) -> Result<(), StoreError> {
        let backup_time = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        self.archive_one(&self.summary_path(account_id), &backup_time)
            .await?;
        self.archive_one(&self.positions_path(account_id), &backup_time)
            .await?;
        self.archive_one(&self.trades_path(account_id), &backup_time)
            .await?;
        info!("账户 {} 档案已归档: 后缀 .{backup_time}.bak", account_id.0);
        Ok(())
    }
}
