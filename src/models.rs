use crate::error::SyncError;
use serde::{Deserialize, Serialize};

/// 存储类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Azblob,
    S3,
    WebDav,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub typ: StorageType,
    /// 本地根目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Azure 存储账户地址，如 https://myaccount.blob.core.windows.net
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// S3 自定义端点或 WebDAV 地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// 远程存储内的根路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl StorageConfig {
    /// 仅包含类型的空配置，字段由调用方填充
    pub fn empty(typ: StorageType) -> Self {
        Self {
            typ,
            path: None,
            account_url: None,
            container: None,
            account_name: None,
            account_key: None,
            sas_token: None,
            bucket: None,
            region: None,
            access_key: None,
            secret_key: None,
            endpoint: None,
            username: None,
            password: None,
            root: None,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::empty(StorageType::Local)
        }
    }

    pub fn azblob(account_url: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            account_url: Some(account_url.into()),
            container: Some(container.into()),
            ..Self::empty(StorageType::Azblob)
        }
    }

    /// 检查当前类型所需的字段是否齐全
    pub fn validate(&self) -> Result<(), SyncError> {
        let missing = |field: &str| {
            SyncError::Config(format!("{:?} storage requires {}", self.typ, field))
        };
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        match self.typ {
            StorageType::Local => {
                if !present(&self.path) {
                    return Err(missing("path"));
                }
            }
            StorageType::Azblob => {
                if !present(&self.account_url) {
                    return Err(missing("accountUrl"));
                }
                if !present(&self.container) {
                    return Err(missing("container"));
                }
            }
            StorageType::S3 => {
                if !present(&self.bucket) {
                    return Err(missing("bucket"));
                }
                if !present(&self.region) {
                    return Err(missing("region"));
                }
                if present(&self.access_key) != present(&self.secret_key) {
                    return Err(missing("both accessKey and secretKey"));
                }
            }
            StorageType::WebDav => {
                if !present(&self.endpoint) {
                    return Err(missing("endpoint"));
                }
            }
        }

        Ok(())
    }
}

/// 同步状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Scanning,
    Comparing,
    Syncing,
    Cleaning,
    /// 全部成功
    Completed,
    /// 部分条目失败
    Partial,
}

/// 同步进度
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub run_id: String,
    pub status: SyncStatus,
    pub phase: String,
    pub current_file: String,
    pub files_to_sync: u32,
    pub files_completed: u32,
    pub files_failed: u32,
    pub bytes_transferred: u64,
}
