use crate::core::scanner::{Entry, Snapshot};
use serde::{Deserialize, Serialize};

/// 同名条目的比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRelation {
    /// 源比目标新，需要更新
    SourceNewer,
    /// 视为已同步
    InSync,
}

/// 差异统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

/// 两个快照之间的差异，三个列表均按字节序排序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub to_create: Vec<String>,
    pub to_update: Vec<String>,
    pub to_delete: Vec<String>,
    pub summary: DiffSummary,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// 文件比较器
#[derive(Debug, Clone, Copy, Default)]
pub struct FileComparator;

impl FileComparator {
    pub fn new() -> Self {
        Self
    }

    /// 比较两个同名条目，依次应用第一条适用的规则：
    ///
    /// 1. 两边都有修改时间：源严格更新才更新，时间相同不更新
    /// 2. 两边都有 etag 且不同
    /// 3. 大小不同
    ///
    /// 本地文件没有 etag，时间缺失时只能比较大小，大小相同的内容变化检测不到。
    pub fn compare(&self, source: &Entry, target: &Entry) -> EntryRelation {
        let newer = match (source.modified, target.modified) {
            (Some(src), Some(dst)) => src > dst,
            _ => match (&source.etag, &target.etag) {
                (Some(src), Some(dst)) => src != dst,
                _ => source.size != target.size,
            },
        };

        if newer {
            tracing::debug!(
                "需要更新: {} (src={:?}/{}, dst={:?}/{})",
                source.name,
                source.modified,
                source.size,
                target.modified,
                target.size
            );
            EntryRelation::SourceNewer
        } else {
            EntryRelation::InSync
        }
    }

    /// 计算让目标与源一致所需的创建 / 更新 / 删除集合，纯计算，无 IO
    pub fn diff(&self, source: &Snapshot, target: &Snapshot) -> DiffResult {
        let mut to_create = Vec::new();
        let mut to_update = Vec::new();

        for src in source.iter() {
            match target.get(&src.name) {
                None => to_create.push(src.name.clone()),
                Some(dst) => {
                    if self.compare(src, dst) == EntryRelation::SourceNewer {
                        to_update.push(src.name.clone());
                    }
                }
            }
        }

        let mut to_delete: Vec<String> = target
            .names()
            .filter(|name| !source.contains(name))
            .map(str::to_string)
            .collect();

        to_create.sort();
        to_update.sort();
        to_delete.sort();

        let summary = DiffSummary {
            create: to_create.len(),
            update: to_update.len(),
            delete: to_delete.len(),
        };

        DiffResult {
            to_create,
            to_update,
            to_delete,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ts;
    use std::collections::BTreeSet;

    fn snapshot(entries: Vec<Entry>) -> Snapshot {
        entries.into_iter().collect()
    }

    #[test]
    fn test_empty() {
        let result = FileComparator::new().diff(&Snapshot::default(), &Snapshot::default());
        assert!(result.is_empty());
        assert_eq!(result.summary, DiffSummary::default());
    }

    #[test]
    fn test_create_and_delete_sorted() {
        let source = snapshot(vec![
            Entry::new("b.txt", 1, Some(ts(0))),
            Entry::new("B.txt", 1, Some(ts(0))),
            Entry::new("a/x.txt", 1, Some(ts(0))),
        ]);
        let target = snapshot(vec![
            Entry::new("zz.txt", 1, Some(ts(0))),
            Entry::new("stale.txt", 1, Some(ts(0))),
        ]);

        let result = FileComparator::new().diff(&source, &target);

        // 字节序：大写字母排在小写之前
        assert_eq!(result.to_create, vec!["B.txt", "a/x.txt", "b.txt"]);
        assert_eq!(result.to_delete, vec!["stale.txt", "zz.txt"]);
        assert!(result.to_update.is_empty());
        assert_eq!(
            result.summary,
            DiffSummary {
                create: 3,
                update: 0,
                delete: 2
            }
        );
    }

    #[test]
    fn test_timestamp_strictness() {
        let cmp = FileComparator::new();

        let equal = cmp.compare(
            &Entry::new("f", 1, Some(ts(10))),
            &Entry::new("f", 2, Some(ts(10))),
        );
        assert_eq!(equal, EntryRelation::InSync);

        let newer = cmp.compare(
            &Entry::new("f", 1, Some(ts(11))),
            &Entry::new("f", 1, Some(ts(10))),
        );
        assert_eq!(newer, EntryRelation::SourceNewer);

        // 目标更新时不回写，即使大小不同
        let older = cmp.compare(
            &Entry::new("f", 5, Some(ts(9))),
            &Entry::new("f", 1, Some(ts(10))),
        );
        assert_eq!(older, EntryRelation::InSync);
    }

    #[test]
    fn test_etag_rule() {
        let cmp = FileComparator::new();

        let differ = cmp.compare(
            &Entry::new("f", 1, None).with_etag("v1"),
            &Entry::new("f", 1, Some(ts(0))).with_etag("v2"),
        );
        assert_eq!(differ, EntryRelation::SourceNewer);

        // etag 相同时不再比较大小
        let same = cmp.compare(
            &Entry::new("f", 1, None).with_etag("v1"),
            &Entry::new("f", 9, None).with_etag("v1"),
        );
        assert_eq!(same, EntryRelation::InSync);
    }

    #[test]
    fn test_size_fallback() {
        let cmp = FileComparator::new();

        let differ = cmp.compare(&Entry::new("f", 1, Some(ts(0))), &Entry::new("f", 2, None));
        assert_eq!(differ, EntryRelation::SourceNewer);

        let same = cmp.compare(&Entry::new("f", 2, None), &Entry::new("f", 2, None));
        assert_eq!(same, EntryRelation::InSync);
    }

    #[test]
    fn test_update_scenario() {
        let source = snapshot(vec![Entry::new("f1.txt", 8, Some(ts(20)))]);
        let target = snapshot(vec![Entry::new("f1.txt", 8, Some(ts(10)))]);

        let result = FileComparator::new().diff(&source, &target);

        assert_eq!(result.to_update, vec!["f1.txt"]);
        assert!(result.to_create.is_empty());
        assert!(result.to_delete.is_empty());
    }

    #[test]
    fn test_partition_and_idempotence() {
        let source = snapshot(vec![
            Entry::new("only_src", 1, Some(ts(1))),
            Entry::new("newer", 1, Some(ts(5))),
            Entry::new("same", 1, Some(ts(5))),
            Entry::new("older", 1, Some(ts(1))),
            Entry::new("dir/size", 3, None),
        ]);
        let target = snapshot(vec![
            Entry::new("only_dst", 1, Some(ts(1))),
            Entry::new("newer", 1, Some(ts(4))),
            Entry::new("same", 1, Some(ts(5))),
            Entry::new("older", 1, Some(ts(2))),
            Entry::new("dir/size", 4, None),
        ]);

        let cmp = FileComparator::new();
        let result = cmp.diff(&source, &target);

        let create: BTreeSet<_> = result.to_create.iter().cloned().collect();
        let update: BTreeSet<_> = result.to_update.iter().cloned().collect();
        let delete: BTreeSet<_> = result.to_delete.iter().cloned().collect();

        assert!(create.is_disjoint(&update));
        assert!(create.is_disjoint(&delete));
        assert!(update.is_disjoint(&delete));

        let src_names: BTreeSet<String> = source.names().map(String::from).collect();
        let dst_names: BTreeSet<String> = target.names().map(String::from).collect();
        let common: BTreeSet<String> = src_names.intersection(&dst_names).cloned().collect();

        assert_eq!(create, src_names.difference(&dst_names).cloned().collect());
        assert_eq!(delete, dst_names.difference(&src_names).cloned().collect());
        assert!(update.is_subset(&common));

        let all: BTreeSet<String> = src_names.union(&dst_names).cloned().collect();
        let partitioned: BTreeSet<String> = create
            .iter()
            .chain(common.iter())
            .chain(delete.iter())
            .cloned()
            .collect();
        assert_eq!(partitioned, all);

        assert_eq!(result.to_update, vec!["dir/size", "newer"]);
        assert_eq!(cmp.diff(&source, &target), result);
    }
}
