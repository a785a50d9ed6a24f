//! 目录占位对象
//!
//! 对象存储没有真实目录，用 `<folder>/.placeholder` 零字节对象模拟目录存在。
//! 占位对象只是实现细节，扫描时会被过滤，永远不会进入比较。

use crate::storage::Storage;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 占位对象名（路径最后一段）
pub const MARKER: &str = ".placeholder";

/// 所有非空的 `/` 分隔前缀，从短到长
///
/// `"a/b/c"` -> `["a", "a/b", "a/b/c"]`，不含分隔符的名称返回自身。
pub fn ancestors(name: &str) -> Vec<String> {
    let parts: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
    (1..=parts.len()).map(|i| parts[..i].join("/")).collect()
}

/// 数据条目所在目录及其所有上级目录
///
/// `"a/b/c.txt"` -> `["a", "a/b"]`，顶层文件返回空。
pub fn parent_folders(name: &str) -> Vec<String> {
    match name.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) => ancestors(parent),
        None => Vec::new(),
    }
}

/// 目录对应的占位对象名
pub fn marker_name(folder: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), MARKER)
}

pub fn is_marker(name: &str) -> bool {
    name == MARKER
        || name
            .strip_suffix(MARKER)
            .is_some_and(|rest| rest.ends_with('/'))
}

/// 占位对象创建结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializeOutcome {
    pub created: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

/// 占位对象清理结果
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRemoval {
    /// 已删除（dry run 时为将要删除）的占位对象
    pub removed: Vec<String>,
    pub errors: BTreeMap<String, String>,
    pub dry_run: bool,
}

/// 在目标存储上管理占位对象
pub struct FolderMarkers<'a> {
    target: &'a dyn Storage,
}

impl<'a> FolderMarkers<'a> {
    pub fn new(target: &'a dyn Storage) -> Self {
        Self { target }
    }

    /// 为每个目录写入零字节占位对象（已存在则覆盖）
    ///
    /// 单个失败只记录，不中断批次。
    pub async fn materialize(&self, folders: &[String]) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();

        for folder in folders {
            let name = marker_name(folder);
            match self.target.write(&name, Vec::new(), None).await {
                Ok(()) => {
                    debug!("创建目录占位: {}", name);
                    outcome.created.push(name);
                }
                Err(e) => {
                    warn!("创建目录占位失败 {}: {}", folder, e);
                    outcome.errors.insert(name, e.to_string());
                }
            }
        }

        outcome
    }

    /// 删除前缀下的所有占位对象，`dry_run` 时只报告不删除
    ///
    /// 列表失败返回错误；单个删除失败收集到 `errors` 中继续处理。
    pub async fn remove_all(
        &self,
        prefix: Option<&str>,
        dry_run: bool,
    ) -> anyhow::Result<MarkerRemoval> {
        let mut markers: Vec<String> = self
            .target
            .list(prefix)
            .await?
            .into_iter()
            .filter(|o| !o.deleted && is_marker(&o.path))
            .map(|o| o.path)
            .collect();
        markers.sort();

        let mut result = MarkerRemoval {
            dry_run,
            ..Default::default()
        };

        if dry_run {
            info!("[dry run] 将删除 {} 个目录占位", markers.len());
            result.removed = markers;
            return Ok(result);
        }

        for name in markers {
            match self.target.delete(&name).await {
                Ok(()) => result.removed.push(name),
                Err(e) => {
                    warn!("删除目录占位失败 {}: {}", name, e);
                    result.errors.insert(name, e.to_string());
                }
            }
        }

        info!(
            "已删除 {} 个目录占位, {} 个失败",
            result.removed.len(),
            result.errors.len()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::MemoryStorage;

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("x/y/z"), vec!["x", "x/y", "x/y/z"]);
        assert_eq!(ancestors("single"), vec!["single"]);
        assert_eq!(ancestors("a//b/"), vec!["a", "a/b"]);
        assert!(ancestors("").is_empty());
    }

    #[test]
    fn test_parent_folders() {
        assert_eq!(parent_folders("a/b/c.txt"), vec!["a", "a/b"]);
        assert!(parent_folders("top.txt").is_empty());
    }

    #[test]
    fn test_is_marker() {
        assert!(is_marker(".placeholder"));
        assert!(is_marker("a/.placeholder"));
        assert!(is_marker("a/b/.placeholder"));
        assert!(!is_marker("a/real.txt"));
        assert!(!is_marker("a/x.placeholder"));
        assert!(!is_marker("a/.placeholder/file"));
    }

    #[test]
    fn test_marker_name() {
        assert_eq!(marker_name("a/b"), "a/b/.placeholder");
        assert_eq!(marker_name("a/b/"), "a/b/.placeholder");
    }

    #[tokio::test]
    async fn test_materialize_continues_on_error() {
        let target = MemoryStorage::new("target");
        target.fail_write("b/.placeholder");

        let folders = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let outcome = FolderMarkers::new(&target).materialize(&folders).await;

        assert_eq!(outcome.created, vec!["a/.placeholder", "c/.placeholder"]);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors.contains_key("b/.placeholder"));
        assert_eq!(target.content("a/.placeholder"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_remove_all() {
        let target = MemoryStorage::new("target");
        target.put("folder1/.placeholder", b"", None);
        target.put("folder2/.placeholder", b"", None);
        target.put("folder3/subfolder/.placeholder", b"", None);
        target.put("regular_file.txt", b"content", None);

        let result = FolderMarkers::new(&target)
            .remove_all(None, false)
            .await
            .unwrap();

        assert_eq!(result.removed.len(), 3);
        assert!(result.errors.is_empty());
        assert_eq!(target.names(), vec!["regular_file.txt"]);
    }

    #[tokio::test]
    async fn test_remove_all_dry_run() {
        let target = MemoryStorage::new("target");
        target.put("folder/.placeholder", b"", None);

        let result = FolderMarkers::new(&target)
            .remove_all(None, true)
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.removed, vec!["folder/.placeholder"]);
        assert_eq!(target.names(), vec!["folder/.placeholder"]);
    }

    #[tokio::test]
    async fn test_remove_all_with_prefix_and_failure() {
        let target = MemoryStorage::new("target");
        target.put("docs/folder1/.placeholder", b"", None);
        target.put("docs/folder2/.placeholder", b"", None);
        target.put("other/folder3/.placeholder", b"", None);
        target.fail_delete("docs/folder2/.placeholder");

        let result = FolderMarkers::new(&target)
            .remove_all(Some("docs/"), false)
            .await
            .unwrap();

        assert_eq!(result.removed, vec!["docs/folder1/.placeholder"]);
        assert!(result.errors.contains_key("docs/folder2/.placeholder"));
        assert_eq!(
            target.names(),
            vec!["docs/folder2/.placeholder", "other/folder3/.placeholder"]
        );
    }
}
