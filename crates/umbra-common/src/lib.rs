//! Umbra common types, IDs, and errors.
//!
//! This crate provides foundational types shared across umbra-core modules:
//! - Node, patch, and session identity types
//! - Issue fingerprints for cycle-to-cycle comparison
//! - The unified error type
//! - Schema versioning for persisted documents

pub mod error;
pub mod id;
pub mod schema;

pub use error::{Error, Result};
pub use id::{IssueFingerprint, NodeId, PatchId, SessionId};
pub use schema::SCHEMA_VERSION;
