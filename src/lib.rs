pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod storage;

pub use crate::core::{DiffResult, SyncEngine, SyncPolicy, SyncReport};
pub use error::{Result, SyncError};
pub use models::{StorageConfig, StorageType};

/// 平台相关的用户目录
pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// 应用配置目录：`<config_dir>/blobsync`，无法确定时使用当前目录下的 `.blobsync`
    pub fn app_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join("blobsync"))
            .unwrap_or_else(|| PathBuf::from(".blobsync"))
    }
}
