//! Store configuration files.
//!
//! A config file holds a [`ConfigData`] in RON, TOML or JSON. Every key is
//! optional; absent keys fall back to [`StoreConfig::default`].

use idfstore_core::config::{RemovalPolicy, StoreConfig, UnknownTypePolicy};
use idfstore_core::validity::Strictness;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::loader::{LoadError, deserialize_file, find_data_file};

/// Base name looked up by [`find_config`].
pub const CONFIG_BASE_NAME: &str = "idfstore";

/// On-disk form of a store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigData {
    #[serde(default)]
    pub removal_policy: Option<RemovalPolicy>,
    #[serde(default)]
    pub unknown_types: Option<UnknownTypePolicy>,
    #[serde(default)]
    pub default_strictness: Option<Strictness>,
    #[serde(default)]
    pub comment_column: Option<usize>,
}

impl ConfigData {
    /// Fill absent keys from the defaults.
    pub fn resolve(self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            removal_policy: self.removal_policy.unwrap_or(defaults.removal_policy),
            unknown_types: self.unknown_types.unwrap_or(defaults.unknown_types),
            default_strictness: self
                .default_strictness
                .unwrap_or(defaults.default_strictness),
            comment_column: self.comment_column.unwrap_or(defaults.comment_column),
        }
    }
}

/// Load a config file; the format is picked by extension.
pub fn load_config(path: &Path) -> Result<StoreConfig, LoadError> {
    let data: ConfigData = deserialize_file(path)?;
    if data.comment_column == Some(0) {
        return Err(LoadError::Invalid {
            file: path.to_path_buf(),
            detail: "comment_column must be at least 1".to_string(),
        });
    }
    let config = data.resolve();
    info!(
        target: "idfstore::config",
        file = %path.display(),
        removal_policy = ?config.removal_policy,
        unknown_types = ?config.unknown_types,
        default_strictness = ?config.default_strictness,
        "loaded store config"
    );
    Ok(config)
}

/// Load `idfstore.{ron,toml,json}` from `dir`, or the defaults when there is
/// none.
pub fn find_config(dir: &Path) -> Result<StoreConfig, LoadError> {
    match find_data_file(dir, CONFIG_BASE_NAME)? {
        Some(path) => load_config(&path),
        None => Ok(StoreConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idfstore.toml");
        fs::write(&path, "removal_policy = \"cascade\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.removal_policy, RemovalPolicy::Cascade);
        assert_eq!(config.unknown_types, UnknownTypePolicy::Catchall);
        assert_eq!(config.default_strictness, Strictness::Draft);
        assert_eq!(config.comment_column, 38);
    }

    #[test]
    fn full_ron_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ron");
        fs::write(
            &path,
            "(removal_policy: Some(detach), unknown_types: Some(reject), \
             default_strictness: Some(final), comment_column: Some(40))",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.unknown_types, UnknownTypePolicy::Reject);
        assert_eq!(config.default_strictness, Strictness::Final);
        assert_eq!(config.comment_column, 40);
    }

    #[test]
    fn json_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"removal": "cascade"}"#).unwrap();
        assert!(matches!(load_config(&path), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn zero_comment_column_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"comment_column": 0}"#).unwrap();
        assert!(matches!(load_config(&path), Err(LoadError::Invalid { .. })));
    }

    #[test]
    fn find_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = find_config(dir.path()).unwrap();
        assert_eq!(config.removal_policy, RemovalPolicy::Detach);

        fs::write(dir.path().join("idfstore.json"), r#"{"unknown_types": "reject"}"#).unwrap();
        let config = find_config(dir.path()).unwrap();
        assert_eq!(config.unknown_types, UnknownTypePolicy::Reject);
    }
}
