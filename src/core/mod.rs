pub mod comparator;
pub mod engine;
pub mod markers;
pub mod scanner;

#[cfg(test)]
pub mod testing;

pub use comparator::{DiffResult, DiffSummary, EntryRelation, FileComparator};
pub use engine::{ReportSummary, SyncEngine, SyncPolicy, SyncReport};
pub use markers::{FolderMarkers, MarkerRemoval, MaterializeOutcome, MARKER};
pub use scanner::{Entry, FileScanner, ScanConfig, Snapshot};
