//! Policy resolution: explicit path → `UMBRA_CONFIG` → XDG config → defaults.

use crate::policy::Policy;
use crate::snapshot::ConfigSource;
use crate::validate::{validate_policy, ValidationError};
use std::path::{Path, PathBuf};

/// Environment variable naming a policy file.
pub const CONFIG_ENV_VAR: &str = "UMBRA_CONFIG";

/// File name looked up under the config directory.
pub const POLICY_FILE_NAME: &str = "policy.json";

/// Candidate locations, in precedence order.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path given on the command line.
    pub explicit: Option<PathBuf>,
    /// Value of `UMBRA_CONFIG`.
    pub env: Option<PathBuf>,
    /// `$XDG_CONFIG_HOME/umbra`, or an override.
    pub config_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// Populate from the process environment.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            env: std::env::var_os(CONFIG_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            config_dir: dirs::config_dir().map(|d| d.join("umbra")),
        }
    }

    fn xdg_policy(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|d| d.join(POLICY_FILE_NAME))
    }
}

/// A resolved, validated policy plus where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub policy: Policy,
    pub source: ConfigSource,
    pub warnings: Vec<String>,
}

fn load(path: &Path) -> Result<(Policy, Vec<String>), ValidationError> {
    let policy = Policy::from_file(path)?;
    let warnings = validate_policy(&policy).into_result()?;
    Ok((policy, warnings))
}

/// Resolve the effective policy.
///
/// An explicit or env path that does not exist is an error; a missing XDG
/// file silently falls through to defaults.
pub fn resolve_config(paths: &ConfigPaths) -> Result<ResolvedConfig, ValidationError> {
    if let Some(path) = &paths.explicit {
        let (policy, warnings) = load(path)?;
        return Ok(ResolvedConfig {
            policy,
            source: ConfigSource::Explicit(path.clone()),
            warnings,
        });
    }

    if let Some(path) = &paths.env {
        let (policy, warnings) = load(path)?;
        return Ok(ResolvedConfig {
            policy,
            source: ConfigSource::Environment(path.clone()),
            warnings,
        });
    }

    if let Some(path) = paths.xdg_policy() {
        if path.is_file() {
            let (policy, warnings) = load(&path)?;
            return Ok(ResolvedConfig {
                policy,
                source: ConfigSource::UserConfig(path),
                warnings,
            });
        }
    }

    Ok(ResolvedConfig {
        policy: Policy::default(),
        source: ConfigSource::Defaults,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_policy(dir: &Path, name: &str, z: i64) -> PathBuf {
        let mut policy = Policy::default();
        policy.classifier.menu_min_z_index = z;
        let path = dir.join(name);
        std::fs::write(&path, policy.to_json()).unwrap();
        path
    }

    #[test]
    fn defaults_when_nothing_is_configured() {
        let dir = tempdir().unwrap();
        let paths = ConfigPaths {
            config_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let resolved = resolve_config(&paths).unwrap();
        assert_eq!(resolved.source, ConfigSource::Defaults);
        assert_eq!(resolved.policy, Policy::default());
    }

    #[test]
    fn explicit_beats_env_beats_xdg() {
        let dir = tempdir().unwrap();
        let explicit = write_policy(dir.path(), "explicit.json", 1);
        let env = write_policy(dir.path(), "env.json", 2);
        write_policy(dir.path(), POLICY_FILE_NAME, 3);

        let mut paths = ConfigPaths {
            explicit: Some(explicit.clone()),
            env: Some(env.clone()),
            config_dir: Some(dir.path().to_path_buf()),
        };
        let resolved = resolve_config(&paths).unwrap();
        assert_eq!(resolved.policy.classifier.menu_min_z_index, 1);
        assert_eq!(resolved.source, ConfigSource::Explicit(explicit));

        paths.explicit = None;
        let resolved = resolve_config(&paths).unwrap();
        assert_eq!(resolved.policy.classifier.menu_min_z_index, 2);

        paths.env = None;
        let resolved = resolve_config(&paths).unwrap();
        assert_eq!(resolved.policy.classifier.menu_min_z_index, 3);
        assert!(matches!(resolved.source, ConfigSource::UserConfig(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let paths = ConfigPaths {
            explicit: Some(PathBuf::from("/nonexistent/umbra/policy.json")),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(&paths),
            Err(ValidationError::IoError(_))
        ));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let dir = tempdir().unwrap();
        let mut policy = Policy::default();
        policy.synthesis.template_min_confidence = -1.0;
        let path = dir.path().join("bad.json");
        std::fs::write(&path, policy.to_json()).unwrap();
        let paths = ConfigPaths {
            explicit: Some(path),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(&paths),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
