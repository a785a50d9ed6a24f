//! 基于 OpenDAL `Operator` 的远程存储
//!
//! Azure Blob、S3、WebDAV 共用这一个实现，各服务模块只负责构建 `Operator`。

use super::{list_root, matches_prefix, ObjectInfo, ObjectMeta, Storage};
use super::{IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::core::markers;
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::collections::HashMap;
use std::time::Duration;

pub struct RemoteStorage {
    operator: Operator,
    name: String,
    /// 服务端有真实目录（WebDAV），写入前需要逐级创建父目录
    native_dirs: bool,
}

impl RemoteStorage {
    pub fn new(operator: Operator, name: String, native_dirs: bool) -> Self {
        Self {
            operator,
            name,
            native_dirs,
        }
    }

    /// 确保父目录存在（递归创建），忽略已存在等错误
    async fn ensure_parent_dirs(&self, path: &str) {
        for dir in markers::parent_folders(path) {
            let _ = self.operator.create_dir(&format!("{}/", dir)).await;
        }
    }
}

/// 所有远程服务共用的超时层
pub(crate) fn timeout_layer() -> TimeoutLayer {
    TimeoutLayer::default()
        .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
        .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS))
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let mut files = Vec::new();

        // 使用 lister_with 进行递归列表
        let mut lister = self
            .operator
            .lister_with(list_root(prefix))
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Etag | Metakey::Mode)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            let path = entry.path().trim_start_matches('/');

            // 跳过根目录
            if path.is_empty() || !matches_prefix(path, prefix) {
                continue;
            }

            let meta = entry.metadata();

            // OpenDAL 默认列表不返回已删除的版本，deleted 恒为 false
            files.push(ObjectInfo {
                path: path.to_string(),
                size: meta.content_length(),
                modified: meta.last_modified(),
                etag: meta.etag().map(|s| s.trim_matches('"').to_string()),
                is_dir: meta.is_dir(),
                deleted: false,
            });
        }

        Ok(files)
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>> {
        match self.operator.stat(&normalize(path)).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.content_length(),
                modified: meta.last_modified(),
                is_dir: meta.is_dir(),
                etag: meta.etag().map(|s| s.trim_matches('"').to_string()),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = self.operator.read(&normalize(path)).await?;
        Ok(data.to_vec())
    }

    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        let path = normalize(path);

        if self.native_dirs {
            self.ensure_parent_dirs(&path).await;
        }

        match metadata {
            Some(meta) => {
                self.operator
                    .write_with(&path, data)
                    .user_metadata(meta.clone())
                    .await?;
            }
            None => {
                self.operator.write(&path, data).await?;
            }
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.operator.delete(&normalize(path)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn native_dirs(&self) -> bool {
        self.native_dirs
    }

    fn name(&self) -> &str {
        &self.name
    }
}
