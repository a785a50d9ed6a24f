use super::{matches_prefix, ObjectInfo, ObjectMeta, Storage};
use crate::error::SyncError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use walkdir::WalkDir;

const PARTIAL_SUFFIX: &str = ".partial";

pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    /// 打开本地根目录，根目录必须已存在
    pub fn new(path: &str) -> Result<Self, SyncError> {
        let base_path = PathBuf::from(path);
        if !base_path.is_dir() {
            return Err(SyncError::InvalidRoot { path: base_path });
        }
        let name = format!("local:{}", path);
        Ok(Self { base_path, name })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 写入用的临时文件名：`.<name>.partial`
    fn partial_name(file_name: &str) -> String {
        format!(".{}{}", file_name, PARTIAL_SUFFIX)
    }

    /// 中断的写入留下的临时文件
    fn is_partial(file_name: &str) -> bool {
        file_name.len() > PARTIAL_SUFFIX.len() + 1
            && file_name.starts_with('.')
            && file_name.ends_with(PARTIAL_SUFFIX)
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let base_path = self.base_path.clone();
        let prefix = prefix.map(str::to_string);

        // walkdir 是同步 API，放到阻塞线程池里执行
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();

            for entry in WalkDir::new(&base_path).follow_links(false) {
                let entry = entry.context("walk local tree")?;

                // 目录和符号链接不产生条目
                if !entry.file_type().is_file() {
                    continue;
                }

                if entry.file_name().to_str().is_some_and(Self::is_partial) {
                    tracing::debug!("跳过未完成的临时文件: {:?}", entry.path());
                    continue;
                }

                let relative = entry
                    .path()
                    .strip_prefix(&base_path)
                    .with_context(|| format!("{:?} is outside root", entry.path()))?;
                let relative = relative
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("non UTF-8 path: {:?}", relative))?;
                let path = Self::normalize_path(relative);

                if !matches_prefix(&path, prefix.as_deref()) {
                    continue;
                }

                let metadata = entry
                    .metadata()
                    .with_context(|| format!("stat {}", path))?;

                files.push(ObjectInfo {
                    path,
                    size: metadata.len(),
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                    etag: None,
                    is_dir: false,
                    deleted: false,
                });
            }

            Ok(files)
        })
        .await?
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let full_path = self.resolve_path(path);

        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(Some(ObjectMeta {
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                is_dir: metadata.is_dir(),
                etag: None,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.resolve_path(path)).await?;
        Ok(data)
    }

    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        if metadata.is_some() {
            tracing::debug!("本地存储忽略对象元数据: {}", path);
        }

        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 先写临时文件再原子重命名，保证条目要么完整写入要么不变
        let file_name = full_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid file name: {}", path))?;
        let temp_path = full_path.with_file_name(Self::partial_name(file_name));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn native_dirs(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}
