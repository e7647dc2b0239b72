//! Environment configuration
//!
//! Hosts that start capturing with [`crate::capture`] cannot pass options, so
//! the viewer and artifact directory can be overridden from the environment.

use std::path::PathBuf;

use crate::artifact::ArtifactStore;
use crate::orchestrator::Viewer;

/// Viewer command line, split on whitespace; `none` or `off` disables it
pub const ENV_VIEWER: &str = "AUTOPROF_VIEWER";
/// Directory artifacts are created in (must exist)
pub const ENV_DIR: &str = "AUTOPROF_DIR";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConfig {
    /// `None` keeps the default `go tool pprof -http=:`
    pub viewer: Option<Viewer>,
    /// `None` keeps the OS temp directory
    pub artifact_dir: Option<PathBuf>,
}

impl CaptureConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, e.g. a map in tests
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let viewer = lookup(ENV_VIEWER).and_then(|value| Viewer::from_command_line(&value));
        let artifact_dir = lookup(ENV_DIR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self { viewer, artifact_dir }
    }

    #[must_use]
    pub fn viewer(&self) -> Viewer {
        self.viewer.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn artifacts(&self) -> ArtifactStore {
        self.artifact_dir.clone().map_or_else(ArtifactStore::temp, ArtifactStore::in_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> CaptureConfig {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        CaptureConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_empty_env_uses_defaults() {
        let config = config(&[]);
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.viewer(), Viewer::pprof_http());
        assert_eq!(config.artifacts().dir(), std::env::temp_dir());
    }

    #[test]
    fn test_viewer_command_is_split() {
        let config = config(&[(ENV_VIEWER, "pprof -http=localhost:8080")]);
        assert_eq!(config.viewer(), Viewer::new("pprof").args(["-http=localhost:8080"]));
    }

    #[test]
    fn test_viewer_can_be_disabled() {
        assert!(!config(&[(ENV_VIEWER, "none")]).viewer().is_enabled());
        assert!(!config(&[(ENV_VIEWER, "OFF")]).viewer().is_enabled());
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = config(&[(ENV_VIEWER, "   "), (ENV_DIR, "")]);
        assert_eq!(config, CaptureConfig::default());
    }

    #[test]
    fn test_artifact_dir() {
        let config = config(&[(ENV_DIR, "/var/tmp/profiles")]);
        assert_eq!(config.artifacts().dir(), PathBuf::from("/var/tmp/profiles"));
    }
}
