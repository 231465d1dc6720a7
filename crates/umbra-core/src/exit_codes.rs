//! Exit codes for the `umbra` CLI.
//!
//! Exit codes communicate the outcome of a run without requiring output
//! parsing. Values are stable.

use crate::session::{CycleReport, CycleStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// No issues found, or nothing left to do
    Clean = 0,

    /// Issues found, none patched (dry run or no source produced a patch)
    IssuesFound = 1,

    /// Every issue handled this cycle was patched
    Patched = 2,

    /// Some issues patched, others left open
    PartialFail = 3,

    /// Configuration or policy error
    ConfigError = 10,

    /// Host document could not be loaded or read
    HostError = 11,

    /// Pattern store read/write failure
    PersistenceError = 12,

    /// Generator failure on an explicit request
    GenerationError = 13,

    /// Host rejected a write on an explicit request
    ApplyError = 14,

    /// I/O error
    IoError = 15,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::IssuesFound | ExitCode::Patched)
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Outcome of a scan cycle.
    pub fn from_report(report: &CycleReport) -> Self {
        let open = report.no_patch.len() + report.apply_errors.len();
        match report.status {
            CycleStatus::Disabled => ExitCode::Clean,
            _ if report.issues.is_empty() => ExitCode::Clean,
            _ if report.patches.is_empty() => ExitCode::IssuesFound,
            _ if open > 0 => ExitCode::PartialFail,
            _ => ExitCode::Patched,
        }
    }

    pub fn from_error(err: &umbra_common::Error) -> Self {
        match err.code() {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::HostError,
            30..=39 => ExitCode::GenerationError,
            40..=49 => ExitCode::ApplyError,
            50..=59 => ExitCode::PersistenceError,
            60..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_by_component() {
        assert_eq!(
            ExitCode::from_error(&umbra_common::Error::Config("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::from_error(&umbra_common::Error::UnknownPatch("p".into())),
            ExitCode::PersistenceError
        );
        assert_eq!(
            ExitCode::from_error(&umbra_common::Error::GenerationTimeout { seconds: 20 }),
            ExitCode::GenerationError
        );
        assert!(ExitCode::ConfigError.is_error());
        assert!(!ExitCode::PartialFail.is_success());
    }
}
