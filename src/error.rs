//! 同步过程中的致命错误
//!
//! 单个条目的传输 / 删除失败不走这里，而是记录在 `SyncReport::errors` 中。

use std::path::PathBuf;
use thiserror::Error;

/// 中止整个同步运行的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 配置缺失或无效
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 本地根目录不存在或不是目录
    #[error("local root does not exist or is not a directory: {}", path.display())]
    InvalidRoot { path: PathBuf },

    /// 枚举命名空间失败（后端不可达、路径缺失等）
    #[error("failed to enumerate {namespace}: {source}")]
    Enumerate {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    /// 创建存储后端失败
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
