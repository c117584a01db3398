use thiserror::Error;

/// # Summary
/// 存储层错误枚举，覆盖账户档案的读写与归档失败。
///
/// # Invariants
/// - 持久化失败不得反向回滚内存账务，调用方记录告警后继续。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 文件读写失败
    #[error("IO error: {0}")]
    Io(String),
    /// 档案内容损坏或缺少必要字段
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    /// 初始化存储目录失败
    #[error("Initialization error: {0}")]
    InitError(String),
}
