use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tidemark_common::{Error, Result};

static COLLECTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("collection name pattern is valid")
});

/// Runtime options for the migration engine and its control store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationsConfig {
    /// `false` disables engine logging entirely.
    pub log: bool,
    /// Log "already at version" when a migration is a no-op.
    pub log_if_latest: bool,
    /// Name of the table holding control records.
    pub collection_name: String,
    pub database_path: Option<PathBuf>,
    /// Environment variable read by the startup trigger.
    pub trigger_var: String,
    /// Persist the reached version after every step instead of once per walk.
    pub commit_each_step: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            log: true,
            log_if_latest: true,
            collection_name: "migrations".to_string(),
            database_path: None,
            trigger_var: "MIGRATE".to_string(),
            commit_each_step: false,
        }
    }
}

impl MigrationsConfig {
    /// Check values that would otherwise fail late, e.g. a table name that
    /// cannot be used as a bare SQL identifier.
    pub fn validate(&self) -> Result<()> {
        validate_collection_name(&self.collection_name)?;
        if self.trigger_var.trim().is_empty() {
            return Err(Error::Config("trigger_var cannot be empty".into()));
        }
        Ok(())
    }
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    if COLLECTION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "collection name {name:?} must be a plain identifier"
        )))
    }
}
