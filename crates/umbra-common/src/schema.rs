//! Versioning for persisted documents (store exports, policy files).

/// Version written into every document this build produces.
///
/// A major bump means older builds cannot read the document.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// `MAJOR.MINOR.PATCH`, each part a plain integer.
pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some((major, minor, patch))
}

/// Whether a document stamped `version` can be read by this build.
///
/// Only the major component has to match; malformed versions never do.
pub fn is_compatible(version: &str) -> bool {
    match (parse_version(version), parse_version(SCHEMA_VERSION)) {
        (Some((theirs, _, _)), Some((ours, _, _))) => theirs == ours,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_and_patch_drift_is_readable() {
        assert!(is_compatible(SCHEMA_VERSION));
        assert!(is_compatible("1.7.3"));
    }

    #[test]
    fn other_majors_and_garbage_are_not() {
        assert!(!is_compatible("2.0.0"));
        assert!(!is_compatible("0.9.9"));
        assert!(!is_compatible("1.0"));
        assert!(!is_compatible("one.two.three"));
    }

    #[test]
    fn parses_three_part_versions() {
        assert_eq!(parse_version(" 1.2.30 "), Some((1, 2, 30)));
        assert_eq!(parse_version("1.2.x"), None);
    }
}
