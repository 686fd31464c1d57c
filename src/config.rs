//! Checker configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// NORMA 2006-04 root namespace.
pub const NORMA_ROOT_NS: &str = "http://schemas.neumont.edu/ORM/2006-04/ORMRoot";
/// NORMA 2006-04 core namespace.
pub const NORMA_CORE_NS: &str = "http://schemas.neumont.edu/ORM/2006-04/ORMCore";
/// NORMA 2006-04 diagram namespace.
pub const NORMA_DIAGRAM_NS: &str = "http://schemas.neumont.edu/ORM/2006-04/ORMDiagram";

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "ORM_CHECK_CONFIG";
/// Environment variable overriding `parallel_checks`.
pub const PARALLEL_ENV: &str = "ORM_CHECK_PARALLEL";

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Configuration for building and validating a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Run the validator checks on the rayon pool.
    pub parallel_checks: bool,
    /// Accepted namespaces.
    pub namespaces: NamespaceConfig,
    /// Reading expansion options.
    pub readings: ReadingConfig,
    /// Drop a validator defect identical to one the builder already reported.
    pub dedupe_defects: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            parallel_checks: false,
            namespaces: NamespaceConfig::default(),
            readings: ReadingConfig::default(),
            dedupe_defects: true,
        }
    }
}

/// Namespace URIs the document reader accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub root: Vec<String>,
    pub core: Vec<String>,
    /// Elements in these namespaces are skipped unread.
    pub diagram: Vec<String>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            root: vec![NORMA_ROOT_NS.to_string()],
            core: vec![NORMA_CORE_NS.to_string()],
            diagram: vec![NORMA_DIAGRAM_NS.to_string()],
        }
    }
}

impl NamespaceConfig {
    pub fn is_root(&self, ns: Option<&str>) -> bool {
        ns.is_some_and(|ns| self.root.iter().any(|r| r == ns))
    }

    pub fn is_core(&self, ns: Option<&str>) -> bool {
        ns.is_some_and(|ns| self.core.iter().any(|c| c == ns))
    }

    pub fn is_diagram(&self, ns: Option<&str>) -> bool {
        ns.is_some_and(|ns| self.diagram.iter().any(|d| d == ns))
    }
}

/// Reading expansion options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub role_label: RoleLabel,
}

/// Which label substitutes a reading placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleLabel {
    /// Role name, then the player's name, then `R<n>`.
    #[default]
    RoleName,
    /// Player's name, then the role name, then `R<n>`.
    PlayerName,
}

impl CheckConfig {
    /// Load configuration from a YAML file. Missing keys take defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
        let config: CheckConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: shown.clone(),
                source,
            })?;
        info!("Loaded checker configuration from {}", shown);
        Ok(config)
    }

    /// Load from `ORM_CHECK_CONFIG` if set, then apply `ORM_CHECK_PARALLEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_yaml_file(path)?,
            _ => Self::default(),
        };
        if let Ok(value) = std::env::var(PARALLEL_ENV) {
            config.parallel_checks = parse_flag(&value);
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = CheckConfig::default();
        assert!(!config.parallel_checks);
        assert!(config.dedupe_defects);
        assert_eq!(config.readings.role_label, RoleLabel::RoleName);
        assert!(config.namespaces.is_core(Some(NORMA_CORE_NS)));
        assert!(!config.namespaces.is_core(Some(NORMA_ROOT_NS)));
        assert!(!config.namespaces.is_core(None));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallel_checks: true").unwrap();
        writeln!(file, "readings:").unwrap();
        writeln!(file, "  role_label: PlayerName").unwrap();

        let config = CheckConfig::from_yaml_file(file.path()).unwrap();
        assert!(config.parallel_checks);
        assert_eq!(config.readings.role_label, RoleLabel::PlayerName);
        assert!(config.dedupe_defects);
        assert_eq!(config.namespaces, NamespaceConfig::default());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CheckConfig::from_yaml_file("/nonexistent/orm-check.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallel_checks: [not, a, bool]").unwrap();
        let err = CheckConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("false"));
    }
}
