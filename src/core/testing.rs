//! 测试用内存存储，支持注入失败

use crate::storage::{matches_prefix, ObjectInfo, ObjectMeta, Storage};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: Option<DateTime<Utc>>,
    etag: Option<String>,
    metadata: HashMap<String, String>,
    deleted: bool,
}

pub struct MemoryStorage {
    name: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    failing_list: AtomicBool,
}

/// 2024-01-01 00:00:00 UTC 之后的第 `secs` 秒
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

impl MemoryStorage {
    pub fn new(name: &str) -> Self {
        Self {
            name: format!("memory:{}", name),
            objects: Mutex::new(BTreeMap::new()),
            failing_reads: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            failing_list: AtomicBool::new(false),
        }
    }

    pub fn put(&self, path: &str, data: &[u8], modified: Option<DateTime<Utc>>) {
        self.insert(path, data, modified, None, false);
    }

    pub fn put_with_etag(&self, path: &str, data: &[u8], etag: &str) {
        self.insert(path, data, None, Some(etag.to_string()), false);
    }

    pub fn put_tombstone(&self, path: &str) {
        self.insert(path, b"", Some(ts(0)), None, true);
    }

    fn insert(
        &self,
        path: &str,
        data: &[u8],
        modified: Option<DateTime<Utc>>,
        etag: Option<String>,
        deleted: bool,
    ) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            StoredObject {
                data: data.to_vec(),
                modified,
                etag,
                metadata: HashMap::new(),
                deleted,
            },
        );
    }

    pub fn fail_read(&self, path: &str) {
        self.failing_reads.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_write(&self, path: &str) {
        self.failing_writes.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_delete(&self, path: &str) {
        self.failing_deletes.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_list(&self) {
        self.failing_list.store(true, Ordering::SeqCst);
    }

    /// 所有未删除的对象名（有序）
    pub fn names(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| !o.deleted)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).map(|o| o.data.clone())
    }

    pub fn modified(&self, path: &str) -> Option<DateTime<Utc>> {
        self.objects.lock().unwrap().get(path).and_then(|o| o.modified)
    }

    pub fn metadata(&self, path: &str) -> HashMap<String, String> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|o| o.metadata.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        if self.failing_list.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }

        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| matches_prefix(path, prefix))
            .map(|(path, o)| ObjectInfo {
                path: path.clone(),
                size: o.data.len() as u64,
                modified: o.modified,
                etag: o.etag.clone(),
                is_dir: false,
                deleted: o.deleted,
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectMeta>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(path)
            .filter(|o| !o.deleted)
            .map(|o| ObjectMeta {
                size: o.data.len() as u64,
                modified: o.modified,
                is_dir: false,
                etag: o.etag.clone(),
            }))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        if self.failing_reads.lock().unwrap().contains(path) {
            anyhow::bail!("read failed: {}", path);
        }
        self.content(path)
            .ok_or_else(|| anyhow::anyhow!("not found: {}", path))
    }

    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        if self.failing_writes.lock().unwrap().contains(path) {
            anyhow::bail!("write failed: {}", path);
        }
        self.objects.lock().unwrap().insert(
            path.to_string(),
            StoredObject {
                data,
                modified: Some(Utc::now()),
                etag: None,
                metadata: metadata.cloned().unwrap_or_default(),
                deleted: false,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(path) {
            anyhow::bail!("delete failed: {}", path);
        }
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
