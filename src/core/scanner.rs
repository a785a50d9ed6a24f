use crate::core::markers::is_marker;
use crate::error::SyncError;
use crate::storage::{ObjectInfo, Storage};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// 命名空间中的一个数据条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// 远程版本标识，仅远程存储提供
    pub etag: Option<String>,
}

impl Entry {
    pub fn new(name: impl Into<String>, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// 某一时刻命名空间的快照：名称 -> 条目
///
/// 构建后不可修改；占位对象永远不会进入快照。
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: HashMap<String, Entry>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Entry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .filter(|e| !is_marker(&e.name))
            .map(|e| (e.name.clone(), e))
            .collect();
        Self { entries }
    }
}

/// 文件扫描器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// 排除规则（glob patterns），不含 `/` 的规则只匹配文件名
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// 列出的条目分类
enum Listed {
    Data(Entry),
    Marker,
    Directory,
    Deleted,
    Excluded,
}

/// 文件扫描器：把存储列表转换成快照
#[derive(Debug, Default)]
pub struct FileScanner {
    exclude: Vec<(Regex, bool)>,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ScanConfig) -> Result<Self, SyncError> {
        let exclude = config
            .exclude_patterns
            .iter()
            .map(|p| {
                let re = glob_to_regex(p).map_err(|e| {
                    SyncError::Config(format!("invalid exclude pattern {:?}: {}", p, e))
                })?;
                Ok((re, p.contains('/')))
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        Ok(Self { exclude })
    }

    /// 检查路径是否应该被排除
    fn should_exclude(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.exclude.iter().any(|(re, full_path)| {
            if *full_path {
                re.is_match(path)
            } else {
                re.is_match(file_name)
            }
        })
    }

    fn classify(&self, info: ObjectInfo) -> Listed {
        if info.deleted {
            Listed::Deleted
        } else if info.is_dir {
            Listed::Directory
        } else if is_marker(&info.path) {
            Listed::Marker
        } else if self.should_exclude(&info.path) {
            Listed::Excluded
        } else {
            Listed::Data(Entry {
                name: info.path,
                size: info.size,
                modified: info.modified,
                etag: info.etag,
            })
        }
    }

    /// 扫描存储并返回快照，列表失败时整体失败，不返回部分结果
    pub async fn scan(
        &self,
        storage: &dyn Storage,
        prefix: Option<&str>,
    ) -> Result<Snapshot, SyncError> {
        info!("开始扫描存储: {}, prefix: {:?}", storage.name(), prefix);

        let listed = storage
            .list(prefix)
            .await
            .map_err(|source| SyncError::Enumerate {
                namespace: storage.name().to_string(),
                source,
            })?;
        debug!("list 返回 {} 个条目", listed.len());

        let mut entries = Vec::with_capacity(listed.len());
        let (mut markers, mut dirs, mut deleted, mut excluded) = (0usize, 0usize, 0usize, 0usize);

        for info in listed {
            match self.classify(info) {
                Listed::Data(entry) => entries.push(entry),
                Listed::Marker => markers += 1,
                Listed::Directory => dirs += 1,
                Listed::Deleted => deleted += 1,
                Listed::Excluded => excluded += 1,
            }
        }

        let snapshot: Snapshot = entries.into_iter().collect();

        info!(
            "扫描完成: {} 个文件, {} 个目录, {} 个占位, {} 个已删除, {} 个被排除",
            snapshot.len(),
            dirs,
            markers,
            deleted,
            excluded
        );

        Ok(snapshot)
    }
}

/// 把 glob 规则转换成锚定的正则：`**` 跨目录，`*` / `?` 不跨目录
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", "\u{0}")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", "[^/]")
        .replace('\u{0}', ".*");
    Regex::new(&format!("^{}$", escaped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{ts, MemoryStorage};

    #[tokio::test]
    async fn test_markers_excluded() {
        let storage = MemoryStorage::new("remote");
        storage.put("a/.placeholder", b"", None);
        storage.put("a/real.txt", b"data", Some(ts(1)));
        storage.put(".placeholder", b"", None);

        let snapshot = FileScanner::new().scan(&storage, None).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("a/real.txt"));
    }

    #[tokio::test]
    async fn test_tombstones_excluded() {
        let storage = MemoryStorage::new("remote");
        storage.put("live.txt", b"x", Some(ts(1)));
        storage.put_tombstone("gone.txt");

        let snapshot = FileScanner::new().scan(&storage, None).await.unwrap();

        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["live.txt"]);
    }

    #[tokio::test]
    async fn test_prefix_filter() {
        let storage = MemoryStorage::new("remote");
        storage.put("docs/file1.txt", b"1", None);
        storage.put("docs/file2.txt", b"2", None);
        storage.put("other/file3.txt", b"3", None);

        let snapshot = FileScanner::new()
            .scan(&storage, Some("docs/"))
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.contains("other/file3.txt"));
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let storage = MemoryStorage::new("remote");
        storage.put("a.txt", b"a", None);
        storage.fail_list();

        let err = FileScanner::new().scan(&storage, None).await.unwrap_err();

        match err {
            SyncError::Enumerate { namespace, .. } => assert_eq!(namespace, "memory:remote"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exclude_patterns() {
        let storage = MemoryStorage::new("remote");
        storage.put("keep.txt", b"k", None);
        storage.put("dir/notes.tmp", b"t", None);
        storage.put(".git/config", b"g", None);
        storage.put("dir/.DS_Store", b"d", None);

        let config = ScanConfig {
            exclude_patterns: vec![
                "*.tmp".to_string(),
                ".git/**".to_string(),
                ".DS_Store".to_string(),
            ],
        };
        let snapshot = FileScanner::with_config(&config)
            .unwrap()
            .scan(&storage, None)
            .await
            .unwrap();

        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["keep.txt"]);
    }

    #[test]
    fn test_snapshot_drops_markers() {
        let snapshot: Snapshot = vec![
            Entry::new("x/.placeholder", 0, None),
            Entry::new("x/y.txt", 1, None),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("x/y.txt").unwrap().size, 1);
    }

    #[test]
    fn test_glob_to_regex() {
        assert!(glob_to_regex("*.tmp").unwrap().is_match("a.tmp"));
        assert!(!glob_to_regex("*.tmp").unwrap().is_match("dir/a.tmp"));
        assert!(glob_to_regex("build/**").unwrap().is_match("build/x/y.o"));
        assert!(glob_to_regex("file?.txt").unwrap().is_match("file1.txt"));
        assert!(!glob_to_regex("a.txt").unwrap().is_match("abtxt"));
    }
}
