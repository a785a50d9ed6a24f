pub mod azblob;
pub mod local;
pub mod remote;
pub mod s3;
pub mod webdav;

use crate::error::SyncError;
use crate::models::{StorageConfig, StorageType};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 后端列出的原始条目（尚未经过扫描器过滤）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub is_dir: bool,
    /// 后端标记为已删除（软删除墓碑）
    pub deleted: bool,
}

/// 单个对象的元数据
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
    pub etag: Option<String>,
}

/// 存储抽象接口
///
/// 所有路径都是以 `/` 分隔的相对名称，不带前导 `/`。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 递归列出名称以 `prefix` 开头的所有条目
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>>;

    /// 获取对象元数据，不存在时返回 `None`
    async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>>;

    /// 读取整个对象
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入整个对象（已存在则覆盖），可附带用户元数据
    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()>;

    /// 删除对象，不存在时视为成功
    async fn delete(&self, path: &str) -> Result<()>;

    /// 检查对象是否存在
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// 后端是否有真实目录（本地文件系统、WebDAV），有则无需占位对象
    fn native_dirs(&self) -> bool {
        false
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 列表起点：前缀中最后一个 `/` 及之前的部分
///
/// `"docs/re"` 从 `"docs/"` 开始列出，`"do"` 从根开始，剩余部分由调用方按字符串前缀过滤。
pub fn list_root(prefix: Option<&str>) -> &str {
    match prefix {
        Some(p) => p.rfind('/').map_or("", |i| &p[..=i]),
        None => "",
    }
}

/// 名称是否落在前缀范围内（空前缀匹配所有）
pub fn matches_prefix(path: &str, prefix: Option<&str>) -> bool {
    prefix.map_or(true, |p| path.starts_with(p))
}

/// 根据配置创建存储实例
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, SyncError> {
    config.validate()?;

    match config.typ {
        StorageType::Local => {
            let path = required(&config.path, "local storage requires path")?;
            tracing::info!("初始化本地存储: {}", path);
            Ok(Arc::new(LocalStorage::new(path)?) as Arc<dyn Storage>)
        }
        StorageType::Azblob => {
            let account_url = required(&config.account_url, "azblob storage requires accountUrl")?;
            let container = required(&config.container, "azblob storage requires container")?;
            tracing::info!("初始化 Azure Blob 存储: {}/{}", account_url, container);
            Ok(Arc::new(azblob::build(
                account_url,
                container,
                config.account_name.as_deref(),
                config.account_key.as_deref(),
                config.sas_token.as_deref(),
                config.root.as_deref(),
            )?) as Arc<dyn Storage>)
        }
        StorageType::S3 => {
            let bucket = required(&config.bucket, "s3 storage requires bucket")?;
            let region = required(&config.region, "s3 storage requires region")?;
            tracing::info!("初始化S3存储: bucket={}, region={}", bucket, region);
            Ok(Arc::new(s3::build(
                bucket,
                region,
                config.access_key.as_deref(),
                config.secret_key.as_deref(),
                config.endpoint.as_deref(),
                config.root.as_deref(),
            )?) as Arc<dyn Storage>)
        }
        StorageType::WebDav => {
            let endpoint = required(&config.endpoint, "webdav storage requires endpoint")?;
            tracing::info!("创建WebDAV存储: endpoint={}, root={:?}", endpoint, config.root);
            Ok(Arc::new(
                webdav::build(
                    endpoint,
                    config.username.as_deref(),
                    config.password.as_deref(),
                    config.root.as_deref(),
                )
                .await?,
            ) as Arc<dyn Storage>)
        }
    }
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, SyncError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SyncError::Config(message.to_string()))
}
