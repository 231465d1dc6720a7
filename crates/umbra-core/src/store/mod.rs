//! Pattern store and feedback ledger.
//!
//! The ledger is the source of truth. Pattern records are a pure function
//! of the ledger and are recomputed whenever it changes.

pub mod kv;
pub mod ledger;
pub mod pattern;
pub mod persistence;

pub use kv::{FileKvStore, KeyValueStore, KvError, MemoryKvStore};
pub use ledger::{CatalogEntry, FeedbackEntry, FeedbackLedger, PatchCatalog, Rating};
pub use pattern::{majority_vote, PatternLifecycle, PatternRecord};
pub use persistence::{
    FeedbackOutcome, ImportMode, ImportReport, PatternStore, PersistenceError, StoreDocument,
    StoreStats, STORE_KEY,
};
