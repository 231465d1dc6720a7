//! Umbra core: dark-mode defect detection and repair.
//!
//! This crate provides the pipeline behind the `umbra` binary:
//! - Tree scanning and issue deltas over a host document
//! - Defect classification (heuristic or learned)
//! - Patch synthesis from learned patterns, a remote generator, or templates
//! - Patch application and the feedback-driven pattern store
//! - The debounced change monitor and the session that ties it together

pub mod action;
pub mod cli;
pub mod collect;
pub mod exit_codes;
pub mod host;
pub mod inference;
pub mod monitor;
pub mod session;
pub mod store;
pub mod synth;

pub use exit_codes::ExitCode;
pub use host::{HostTree, MemoryTree};
pub use session::{CycleReport, CycleStatus, Session};
