//! Tree scanning and cycle-to-cycle issue tracking.

pub mod incremental;
pub mod scanner;
pub mod snapshot;

pub use incremental::{DeltaKind, DeltaSummary, IssueDelta, IssueTracker, ScanScope};
pub use scanner::{ScanOptions, ScanOutput, ScanReport, TreeScanner};
pub use snapshot::{ClassificationError, PositionMode, StyleSnapshot, Visibility};
