use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::value::DEFAULT_MAX_TABLE_DEPTH;

pub const DEFAULT_MAX_ACTOR_DEPTH: usize = 128;

/// Settings shared by every script manager built from it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Base directory for `ActorUtil.ResolvePath` and relative texture paths.
    pub theme_root: PathBuf,
    pub max_table_depth: usize,
    pub max_actor_depth: usize,
    /// Fail manager construction when a class binding is incomplete instead
    /// of only logging the omitted methods.
    pub strict_bindings: bool,
    pub verbose: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            theme_root: PathBuf::from("."),
            max_table_depth: DEFAULT_MAX_TABLE_DEPTH,
            max_actor_depth: DEFAULT_MAX_ACTOR_DEPTH,
            strict_bindings: false,
            verbose: false,
        }
    }
}

impl ManagerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(text)?;
        anyhow::ensure!(config.max_table_depth > 0, "max_table_depth must be positive");
        anyhow::ensure!(config.max_actor_depth > 0, "max_actor_depth must be positive");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = ManagerConfig::from_json_str(r#"{ "theme_root": "Themes/default" }"#)
            .expect("config parses");
        assert_eq!(config.theme_root, PathBuf::from("Themes/default"));
        assert_eq!(config.max_table_depth, DEFAULT_MAX_TABLE_DEPTH);
        assert_eq!(config.max_actor_depth, DEFAULT_MAX_ACTOR_DEPTH);
        assert!(!config.strict_bindings);
    }

    #[test]
    fn zero_depth_is_rejected() {
        assert!(ManagerConfig::from_json_str(r#"{ "max_table_depth": 0 }"#).is_err());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "verbose": true, "max_actor_depth": 4 }"#).expect("write config");
        let config = ManagerConfig::from_json_file(&path).expect("load config");
        assert!(config.verbose);
        assert_eq!(config.max_actor_depth, 4);
    }
}
