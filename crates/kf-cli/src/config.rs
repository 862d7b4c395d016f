//! kf CLI configuration stored at `~/.kf/`.
//!
//! `~/.kf/config.json` holds the space targeted by `kf target`.
//!
//! The namespace resolution chain (highest priority first):
//! 1. Explicit `--namespace` flag
//! 2. `KF_NAMESPACE` environment variable (both handled by clap)
//! 3. `space` in `~/.kf/config.json`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = ".kf";
const CONFIG_FILE_NAME: &str = "config.json";

/// Persistent CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct KfConfig {
    /// Space (namespace) targeted by `kf target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
}

/// Returns `~/.kf/`, creating it if it doesn't exist.
pub fn kf_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::command_failed("could not determine home directory"))?;
    let dir = home.join(CONFIG_DIR_NAME);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::command_failed(format!("failed to create {}: {}", dir.display(), e))
        })?;
    }
    Ok(dir)
}

/// Path to `~/.kf/config.json`.
pub fn config_path() -> Result<PathBuf> {
    Ok(kf_dir()?.join(CONFIG_FILE_NAME))
}

/// Load config from `path`, returning default if missing.
pub fn load_config_from(path: &Path) -> Result<KfConfig> {
    if !path.exists() {
        return Ok(KfConfig::default());
    }
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::command_failed(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::command_failed(format!("failed to parse {}: {}", path.display(), e)))
}

/// Save config to `path`.
pub fn save_config_to(path: &Path, config: &KfConfig) -> Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)
        .map_err(|e| Error::command_failed(format!("failed to write {}: {}", path.display(), e)))
}

/// Parameters every command runs with.
#[derive(Debug, Clone, Default)]
pub struct KfParams {
    /// Namespace the command acts on; empty when no space is targeted.
    pub namespace: String,
    /// Explicit kubeconfig path, if any.
    pub kubeconfig: Option<String>,
}

impl KfParams {
    /// Resolve parameters from the global flags, falling back to the space
    /// saved in the config file. `config_path` is only called when no
    /// namespace was given.
    pub fn resolve<P>(
        namespace: Option<String>,
        kubeconfig: Option<String>,
        config_path: P,
    ) -> Result<Self>
    where
        P: FnOnce() -> Result<PathBuf>,
    {
        let namespace = match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => ns,
            None => load_config_from(&config_path()?)?.space.unwrap_or_default(),
        };
        Ok(Self {
            namespace,
            kubeconfig,
        })
    }

    /// The targeted namespace, or a validation error telling the user how to
    /// target one.
    pub fn validate_namespace(&self) -> Result<&str> {
        if self.namespace.is_empty() {
            return Err(Error::validation(
                "no space targeted, use 'kf target --space SPACE' to target a space",
            ));
        }
        Ok(&self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, KfConfig::default());
    }

    #[test]
    fn saved_space_is_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save_config_to(
            &path,
            &KfConfig {
                space: Some("dev".to_string()),
            },
        )
        .unwrap();

        assert_eq!(load_config_from(&path).unwrap().space.as_deref(), Some("dev"));
    }

    #[test]
    fn corrupt_config_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn explicit_namespace_wins_over_saved_space() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save_config_to(
            &path,
            &KfConfig {
                space: Some("saved".to_string()),
            },
        )
        .unwrap();

        let params =
            KfParams::resolve(Some("flag".to_string()), None, || Ok(path.clone())).unwrap();
        assert_eq!(params.validate_namespace().unwrap(), "flag");

        let params = KfParams::resolve(None, None, || Ok(path.clone())).unwrap();
        assert_eq!(params.validate_namespace().unwrap(), "saved");
    }

    #[test]
    fn no_space_anywhere_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let params = KfParams::resolve(None, None, || Ok(dir.path().join("config.json"))).unwrap();

        let err = params.validate_namespace().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(
            err.to_string(),
            "no space targeted, use 'kf target --space SPACE' to target a space"
        );
    }

    #[test]
    fn explicit_namespace_never_touches_the_config() {
        let params = KfParams::resolve(Some("dev".to_string()), None, || {
            Err(Error::command_failed("could not determine home directory"))
        })
        .unwrap();

        assert_eq!(params.validate_namespace().unwrap(), "dev");
    }

    #[test]
    fn missing_home_fails_only_when_falling_back_to_the_config() {
        let err = KfParams::resolve(None, None, || {
            Err(Error::command_failed("could not determine home directory"))
        })
        .unwrap_err();

        assert!(err.to_string().contains("home directory"));
    }
}
