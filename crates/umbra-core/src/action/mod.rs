//! Patch application.

pub mod applier;

pub use applier::{
    block_id, ActivePatch, ApplyError, ApplyOutcome, DisableReport, PatchApplier, BLOCK_PREFIX,
};
