//! 应用配置模块

use crate::core::SyncPolicy;
use crate::error::SyncError;
use crate::logging::LogConfig;
use crate::models::StorageConfig;
use crate::scheduler::{Anchor, Schedule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 定时运行配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// 两次运行之间的间隔（分钟），0 表示只运行一次
    #[serde(default)]
    pub interval_minutes: u64,
    /// 首次运行时间，如 "Mon 02:30"；为空时立即运行
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_run: Option<String>,
}

impl ScheduleConfig {
    /// 转换为调度参数，间隔为 0 时返回 `None`
    pub fn to_schedule(&self) -> Result<Option<Schedule>, SyncError> {
        if self.interval_minutes == 0 {
            return Ok(None);
        }
        let first_run = self.first_run.as_deref().map(Anchor::parse).transpose()?;
        Ok(Some(Schedule {
            interval: Duration::from_secs(self.interval_minutes * 60),
            first_run,
        }))
    }
}

/// 应用配置（`config.json`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub source: StorageConfig,
    pub target: StorageConfig,
    #[serde(default)]
    pub policy: SyncPolicy,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    pub fn new(source: StorageConfig, target: StorageConfig) -> Self {
        Self {
            source,
            target,
            policy: SyncPolicy::default(),
            schedule: ScheduleConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        crate::dirs::app_dir().join(CONFIG_FILE)
    }

    /// 从文件加载配置
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            SyncError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 运行前一次性校验所有配置
    pub fn validate(&self) -> Result<(), SyncError> {
        self.source.validate()?;
        self.target.validate()?;

        if self.policy.skip_create && self.policy.skip_update && self.policy.skip_delete {
            tracing::warn!("创建、更新和删除都被跳过，本次同步不会修改目标");
        }

        if let Some(base) = &self.policy.metadata_url_base {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(SyncError::Config(format!(
                    "metadataUrlBase must be an http(s) url, got {:?}",
                    base
                )));
            }
        }

        self.schedule.to_schedule()?;
        self.log.level.parse::<tracing::Level>().map_err(|_| {
            SyncError::Config(format!("unknown log level {:?}", self.log.level))
        })?;

        Ok(())
    }
}
