use std::path::{Path, PathBuf};

use tidemark_common::{Error, Result};
use tracing::{debug, info};

use crate::model::MigrationsConfig;

const CONFIG_FILE_NAMES: &[&str] = &["tidemark.yml", "tidemark.yaml", "tidemark.toml"];

pub const DATABASE_ENV: &str = "TIDEMARK_DATABASE";
pub const COLLECTION_ENV: &str = "TIDEMARK_COLLECTION";

/// Reads `MigrationsConfig` from YAML or TOML and applies environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default configuration directory, `~/.tidemark`.
    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tidemark")
    }

    /// Load a config file, choosing the parser from its extension.
    pub fn load(path: &Path) -> Result<MigrationsConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut config: MigrationsConfig = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    /// Load the first config file found in `config_dir`, or fall back to defaults.
    pub fn load_or_default(config_dir: &Path) -> Result<MigrationsConfig> {
        for name in CONFIG_FILE_NAMES {
            let candidate = config_dir.join(name);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }

        debug!(
            "no config file in {}, using defaults",
            config_dir.display()
        );
        let mut config = MigrationsConfig::default();
        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }
}

fn apply_env_overrides(config: &mut MigrationsConfig) {
    if let Ok(path) = std::env::var(DATABASE_ENV)
        && !path.is_empty()
    {
        config.database_path = Some(PathBuf::from(path));
    }
    if let Ok(name) = std::env::var(COLLECTION_ENV)
        && !name.is_empty()
    {
        config.collection_name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.yml");
        std::fs::write(&path, "collection_name: schema_control\nlog: false\n").unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.collection_name, "schema_control");
        assert!(!config.log);
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.toml");
        std::fs::write(&path, "commit_each_step = true\ntrigger_var = \"APP_MIGRATE\"\n").unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert!(config.commit_each_step);
        assert_eq!(config.trigger_var, "APP_MIGRATE");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.ini");
        std::fs::write(&path, "log = true").unwrap();

        let err = ConfigLoader::load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }

    #[test]
    fn rejects_invalid_collection_name_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.yaml");
        std::fs::write(&path, "collection_name: \"bad name\"\n").unwrap();

        assert!(ConfigLoader::load(&path).is_err());
    }

    #[test]
    fn empty_dir_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load_or_default(dir.path()).unwrap();
        assert_eq!(config.trigger_var, "MIGRATE");
    }
}
