use crate::core::comparator::{DiffResult, FileComparator};
use crate::core::markers::{self, FolderMarkers};
use crate::core::scanner::{FileScanner, ScanConfig, Snapshot};
use crate::error::SyncError;
use crate::models::{SyncProgress, SyncStatus};
use crate::storage::Storage;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 单次运行的同步策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPolicy {
    /// 只同步名称以此开头的条目
    pub prefix: Option<String>,
    pub skip_create: bool,
    pub skip_update: bool,
    pub skip_delete: bool,
    /// 更新时是否允许覆盖目标（创建始终不覆盖）
    pub overwrite: bool,
    /// 为新文件所在目录创建占位对象
    pub create_folders: bool,
    /// 同步结束后删除目标中的所有占位对象
    pub cleanup_markers: bool,
    /// 只计算和报告，不写入目标
    pub dry_run: bool,
    /// 上传时附带 `url` 元数据：`<base>/<urlencoded name>`
    pub metadata_url_base: Option<String>,
    #[serde(flatten)]
    pub scan: ScanConfig,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            prefix: None,
            skip_create: false,
            skip_update: false,
            skip_delete: false,
            overwrite: true,
            create_folders: true,
            cleanup_markers: false,
            dry_run: false,
            metadata_url_base: None,
            scan: ScanConfig::default(),
        }
    }
}

/// 报告统计
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
    pub markers_created: usize,
    pub markers_removed: usize,
    pub bytes_transferred: u64,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub source: String,
    pub target: String,
    pub prefix: Option<String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: SyncStatus,
    /// 本次运行依据的差异（跳过删除时 to_delete 仍在此列出）
    pub diff: DiffResult,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    /// 因策略或目标已存在而未传输的条目
    pub skipped: Vec<String>,
    pub deleted: Vec<String>,
    pub markers_created: Vec<String>,
    pub markers_removed: Vec<String>,
    /// 名称 -> 错误信息
    pub errors: BTreeMap<String, String>,
    pub summary: ReportSummary,
}

impl SyncReport {
    fn new(source: &dyn Storage, target: &dyn Storage, policy: &SyncPolicy) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.name().to_string(),
            target: target.name().to_string(),
            prefix: policy.prefix.clone(),
            dry_run: policy.dry_run,
            started_at: now,
            finished_at: now,
            status: SyncStatus::Syncing,
            diff: DiffResult::default(),
            created: Vec::new(),
            updated: Vec::new(),
            skipped: Vec::new(),
            deleted: Vec::new(),
            markers_created: Vec::new(),
            markers_removed: Vec::new(),
            errors: BTreeMap::new(),
            summary: ReportSummary::default(),
        }
    }

    fn finish(mut self, bytes_transferred: u64) -> Self {
        self.finished_at = Utc::now();
        self.status = if self.errors.is_empty() {
            SyncStatus::Completed
        } else {
            SyncStatus::Partial
        };
        self.summary = ReportSummary {
            created: self.created.len(),
            updated: self.updated.len(),
            skipped: self.skipped.len(),
            deleted: self.deleted.len(),
            failed: self.errors.len(),
            markers_created: self.markers_created.len(),
            markers_removed: self.markers_removed.len(),
            bytes_transferred,
        };
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Create,
    Update,
}

/// 单个传输的结果
enum TransferOutcome {
    Copied(u64),
    /// 目标已存在且不允许覆盖
    Exists,
}

/// 同步引擎：枚举 -> 比较 -> 按策略过滤 -> 目录占位 -> 传输 -> 删除 -> 清理占位
pub struct SyncEngine {
    policy: SyncPolicy,
    scanner: FileScanner,
    progress_tx: Option<mpsc::Sender<SyncProgress>>,
}

impl SyncEngine {
    pub fn new(policy: SyncPolicy) -> Result<Self, SyncError> {
        let scanner = FileScanner::with_config(&policy.scan)?;
        Ok(Self {
            policy,
            scanner,
            progress_tx: None,
        })
    }

    /// 注入进度接收端
    pub fn with_progress(mut self, tx: mpsc::Sender<SyncProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// 只枚举和比较，不做任何修改
    pub async fn analyze(
        &self,
        source: &dyn Storage,
        target: &dyn Storage,
    ) -> Result<DiffResult, SyncError> {
        let (source_tree, target_tree) = self.enumerate(source, target).await?;
        Ok(FileComparator::new().diff(&source_tree, &target_tree))
    }

    async fn enumerate(
        &self,
        source: &dyn Storage,
        target: &dyn Storage,
    ) -> Result<(Snapshot, Snapshot), SyncError> {
        let prefix = self.policy.prefix.as_deref().filter(|p| !p.is_empty());

        let source_tree = self.scanner.scan(source, prefix).await.inspect_err(|e| {
            error!("扫描源存储失败: {}", e);
        })?;
        let target_tree = self.scanner.scan(target, prefix).await.inspect_err(|e| {
            error!("扫描目标存储失败: {}", e);
        })?;

        Ok((source_tree, target_tree))
    }

    /// 运行一次同步
    ///
    /// 枚举失败直接返回错误；单个条目的失败记录在报告中，不影响其余条目。
    pub async fn run(
        &self,
        source: &dyn Storage,
        target: &dyn Storage,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(source, target, &self.policy);
        let policy = &self.policy;

        info!(
            "开始同步: {} -> {} (run {}, prefix {:?}, dry_run {})",
            report.source, report.target, report.run_id, policy.prefix, policy.dry_run
        );

        // 1. 枚举
        self.send_progress(&report, SyncStatus::Scanning, "正在扫描...", "", 0, 0, 0)
            .await;
        let (source_tree, target_tree) = self.enumerate(source, target).await?;

        // 2. 比较
        self.send_progress(&report, SyncStatus::Comparing, "正在比较文件差异...", "", 0, 0, 0)
            .await;
        let diff = FileComparator::new().diff(&source_tree, &target_tree);
        info!(
            "比较完成: {} 个创建, {} 个更新, {} 个删除",
            diff.summary.create, diff.summary.update, diff.summary.delete
        );

        // 3. 按策略过滤
        let mut transfers: Vec<(String, TransferKind)> = Vec::new();
        if policy.skip_create {
            report.skipped.extend(diff.to_create.iter().cloned());
        } else {
            transfers.extend(diff.to_create.iter().map(|n| (n.clone(), TransferKind::Create)));
        }
        if policy.skip_update {
            report.skipped.extend(diff.to_update.iter().cloned());
        } else {
            transfers.extend(diff.to_update.iter().map(|n| (n.clone(), TransferKind::Update)));
        }
        let deletions: &[String] = if policy.skip_delete {
            debug!("跳过删除 {} 个条目", diff.to_delete.len());
            &[]
        } else {
            &diff.to_delete
        };

        let files_to_sync = (transfers.len() + deletions.len()) as u32;

        if policy.dry_run {
            info!(
                "[dry run] 将传输 {} 个文件, 删除 {} 个文件",
                transfers.len(),
                deletions.len()
            );
            if policy.cleanup_markers {
                self.cleanup_markers(target, true, &mut report).await;
            }
            report.diff = diff;
            return Ok(report.finish(0));
        }

        // 4. 目录占位（每次运行内去重）
        if policy.create_folders && !target.native_dirs() {
            let folders: BTreeSet<String> = transfers
                .iter()
                .flat_map(|(name, _)| markers::parent_folders(name))
                .collect();
            if !folders.is_empty() {
                let folders: Vec<String> = folders.into_iter().collect();
                let outcome = FolderMarkers::new(target).materialize(&folders).await;
                report.markers_created = outcome.created;
                // 占位创建失败不影响同步结果，只记录日志
                if !outcome.errors.is_empty() {
                    warn!("{} 个目录占位创建失败", outcome.errors.len());
                }
            }
        }

        // 5. 传输
        let mut bytes_transferred = 0u64;
        let mut completed = 0u32;

        for (name, kind) in &transfers {
            self.send_progress(
                &report,
                SyncStatus::Syncing,
                "正在同步...",
                name,
                files_to_sync,
                completed,
                bytes_transferred,
            )
            .await;

            match self.transfer(source, target, name, *kind).await {
                Ok(TransferOutcome::Copied(bytes)) => {
                    bytes_transferred += bytes;
                    match kind {
                        TransferKind::Create => report.created.push(name.clone()),
                        TransferKind::Update => report.updated.push(name.clone()),
                    }
                }
                Ok(TransferOutcome::Exists) => {
                    debug!("目标已存在且不覆盖，跳过: {}", name);
                    report.skipped.push(name.clone());
                }
                Err(e) => {
                    error!("传输失败 {}: {:#}", name, e);
                    report.errors.insert(name.clone(), format!("{:#}", e));
                }
            }
            completed += 1;
        }

        // 6. 删除
        for name in deletions {
            match target.delete(name).await {
                Ok(()) => {
                    debug!("已删除: {}", name);
                    report.deleted.push(name.clone());
                }
                Err(e) => {
                    error!("删除失败 {}: {:#}", name, e);
                    report.errors.insert(name.clone(), format!("{:#}", e));
                }
            }
            completed += 1;
        }

        // 7. 清理占位
        if policy.cleanup_markers {
            self.cleanup_markers(target, false, &mut report).await;
        }

        report.diff = diff;
        let report = report.finish(bytes_transferred);

        self.send_progress(
            &report,
            report.status.clone(),
            "同步完成",
            "",
            files_to_sync,
            completed,
            bytes_transferred,
        )
        .await;

        info!(
            "同步完成: 创建 {}, 更新 {}, 跳过 {}, 删除 {}, 失败 {}",
            report.summary.created,
            report.summary.updated,
            report.summary.skipped,
            report.summary.deleted,
            report.summary.failed
        );

        Ok(report)
    }

    /// 从源读取并写入目标
    async fn transfer(
        &self,
        source: &dyn Storage,
        target: &dyn Storage,
        name: &str,
        kind: TransferKind,
    ) -> Result<TransferOutcome> {
        let overwrite = match kind {
            TransferKind::Create => false,
            TransferKind::Update => self.policy.overwrite,
        };

        if !overwrite && target.exists(name).await? {
            return Ok(TransferOutcome::Exists);
        }

        let data = source.read(name).await?;
        let bytes = data.len() as u64;
        debug!("复制: {} ({} 字节, {:?})", name, bytes, kind);

        let metadata = self.upload_metadata(name);
        target.write(name, data, metadata.as_ref()).await?;

        Ok(TransferOutcome::Copied(bytes))
    }

    /// 逐段编码，`/` 保持不变
    fn upload_metadata(&self, name: &str) -> Option<HashMap<String, String>> {
        self.policy.metadata_url_base.as_ref().map(|base| {
            let encoded = name
                .split('/')
                .map(urlencoding::encode)
                .collect::<Vec<_>>()
                .join("/");
            let url = format!("{}/{}", base.trim_end_matches('/'), encoded);
            HashMap::from([("url".to_string(), url)])
        })
    }

    async fn cleanup_markers(&self, target: &dyn Storage, dry_run: bool, report: &mut SyncReport) {
        self.send_progress(report, SyncStatus::Cleaning, "正在清理目录占位...", "", 0, 0, 0)
            .await;

        match FolderMarkers::new(target)
            .remove_all(self.policy.prefix.as_deref(), dry_run)
            .await
        {
            Ok(removal) => {
                if !removal.errors.is_empty() {
                    warn!("{} 个目录占位删除失败", removal.errors.len());
                }
                report.markers_removed = removal.removed;
            }
            Err(e) => warn!("清理目录占位失败: {:#}", e),
        }
    }

    /// 发送进度更新
    #[allow(clippy::too_many_arguments)]
    async fn send_progress(
        &self,
        report: &SyncReport,
        status: SyncStatus,
        phase: &str,
        current_file: &str,
        files_to_sync: u32,
        files_completed: u32,
        bytes_transferred: u64,
    ) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx
                .send(SyncProgress {
                    run_id: report.run_id.clone(),
                    status,
                    phase: phase.to_string(),
                    current_file: current_file.to_string(),
                    files_to_sync,
                    files_completed,
                    files_failed: report.errors.len() as u32,
                    bytes_transferred,
                })
                .await;
        }
    }
}
