use std::collections::HashMap;

use tidemark_common::{Error, Result};
use tracing::debug;

use crate::migration::{Migration, Version, validate_version};

pub const DEFAULT_CHANNEL: &str = "default";

/// Ordered migrations per channel. Every channel begins with the version-0
/// identity migration.
#[derive(Debug)]
pub struct Registry {
    channels: HashMap<String, Vec<Migration>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(DEFAULT_CHANNEL.to_string(), vec![Migration::identity()]);
        Self { channels }
    }

    /// Add a migration to `channel`, creating the channel if needed.
    ///
    /// Versions are not checked for uniqueness. The sort is stable, so among
    /// equal versions the first registered stays first.
    pub fn register(&mut self, migration: Migration, channel: &str) -> Result<()> {
        validate_version(migration.version())?;
        if channel.is_empty() {
            return Err(Error::InvalidMigration(
                "channel name cannot be empty".into(),
            ));
        }

        debug!(
            "registering migration {}{} on {channel}",
            migration.version(),
            migration.label()
        );
        let migrations = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| vec![Migration::identity()]);
        migrations.push(migration);
        migrations.sort_by_key(Migration::version);
        Ok(())
    }

    /// Position of the first migration with exactly `version`.
    pub fn index_of_version(&self, version: Version, channel: &str) -> Result<usize> {
        self.migrations(channel)
            .and_then(|ms| ms.iter().position(|m| m.version() == version))
            .ok_or_else(|| Error::VersionNotFound {
                version,
                channel: channel.to_string(),
            })
    }

    pub fn migrations(&self, channel: &str) -> Option<&[Migration]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    /// Highest registered version on `channel`.
    pub fn latest(&self, channel: &str) -> Option<Version> {
        self.migrations(channel)
            .and_then(|ms| ms.last())
            .map(Migration::version)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Drop every registered migration, leaving only the default channel's
    /// identity migration.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(version: Version) -> Migration {
        Migration::new(version, |_| Ok(()))
    }

    fn versions(registry: &Registry, channel: &str) -> Vec<Version> {
        registry
            .migrations(channel)
            .unwrap()
            .iter()
            .map(Migration::version)
            .collect()
    }

    #[test]
    fn new_registry_has_identity_on_default() {
        let registry = Registry::new();
        assert_eq!(versions(&registry, DEFAULT_CHANNEL), vec![0]);
        assert_eq!(registry.latest(DEFAULT_CHANNEL), Some(0));
    }

    #[test]
    fn register_keeps_versions_sorted() {
        let mut registry = Registry::new();
        registry.register(noop(3), DEFAULT_CHANNEL).unwrap();
        registry.register(noop(1), DEFAULT_CHANNEL).unwrap();
        registry.register(noop(2), DEFAULT_CHANNEL).unwrap();

        assert_eq!(versions(&registry, DEFAULT_CHANNEL), vec![0, 1, 2, 3]);
        assert_eq!(registry.index_of_version(2, DEFAULT_CHANNEL).unwrap(), 2);
        assert_eq!(registry.latest(DEFAULT_CHANNEL), Some(3));
    }

    #[test]
    fn register_seeds_new_channel() {
        let mut registry = Registry::new();
        registry.register(noop(5), "reports").unwrap();

        assert_eq!(versions(&registry, "reports"), vec![0, 5]);
        assert_eq!(versions(&registry, DEFAULT_CHANNEL), vec![0]);
    }

    #[test]
    fn register_rejects_version_zero() {
        let mut registry = Registry::new();
        let err = registry.register(noop(0), DEFAULT_CHANNEL).unwrap_err();
        assert!(matches!(err, Error::InvalidMigration(_)));
        assert_eq!(versions(&registry, DEFAULT_CHANNEL), vec![0]);
    }

    #[test]
    fn duplicate_versions_keep_insertion_order() {
        let mut registry = Registry::new();
        registry
            .register(noop(1).with_name("first"), DEFAULT_CHANNEL)
            .unwrap();
        registry
            .register(noop(1).with_name("second"), DEFAULT_CHANNEL)
            .unwrap();

        let idx = registry.index_of_version(1, DEFAULT_CHANNEL).unwrap();
        let found = &registry.migrations(DEFAULT_CHANNEL).unwrap()[idx];
        assert_eq!(found.name(), Some("first"));
    }

    #[test]
    fn missing_version_is_reported() {
        let registry = Registry::new();
        let err = registry.index_of_version(9, DEFAULT_CHANNEL).unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { version: 9, .. }));

        let err = registry.index_of_version(0, "nowhere").unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }

    #[test]
    fn reset_clears_channels() {
        let mut registry = Registry::new();
        registry.register(noop(1), DEFAULT_CHANNEL).unwrap();
        registry.register(noop(1), "other").unwrap();
        registry.reset();

        assert_eq!(versions(&registry, DEFAULT_CHANNEL), vec![0]);
        assert!(registry.migrations("other").is_none());
    }
}
