use std::sync::Arc;

use tidemark_common::{Error, Result};
use tidemark_config::MigrationsConfig;
use tidemark_db::ControlStore;

use crate::command::{Command, Target};
use crate::logger::{LogSink, Logger};
use crate::migration::{Direction, Migration, Version};
use crate::registry::Registry;

/// How a `migrate_to` call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The walk completed and the channel is now at `to`.
    Migrated { from: Version, to: Version },
    /// Nothing to do; the channel was already at this version.
    AlreadyAt(Version),
    /// The `up` step of this version ran again. The recorded version is unchanged.
    Rerun(Version),
    /// Another caller holds the channel lock. Nothing ran.
    Locked,
}

/// A failure under the lock, with the version the walk had reached when the
/// failure should still be recorded.
struct Failure {
    error: Error,
    reached: Option<Version>,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            reached: None,
        }
    }
}

/// Runs registered migrations against a control store, one channel at a time.
///
/// The registry is owned here rather than held in a global; callers register
/// everything up front and then invoke `migrate_to`.
pub struct Migrator {
    registry: Registry,
    store: Arc<dyn ControlStore>,
    logger: Logger,
    log_if_latest: bool,
    commit_each_step: bool,
}

impl Migrator {
    pub fn new(store: Arc<dyn ControlStore>) -> Self {
        Self {
            registry: Registry::new(),
            store,
            logger: Logger::default(),
            log_if_latest: true,
            commit_each_step: false,
        }
    }

    pub fn from_config(store: Arc<dyn ControlStore>, config: &MigrationsConfig) -> Self {
        Self {
            registry: Registry::new(),
            store,
            logger: Logger::new(config.log, None),
            log_if_latest: config.log_if_latest,
            commit_each_step: config.commit_each_step,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Route log records to `sink` instead of `tracing`.
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logger = Logger::new(self.logger.is_enabled(), Some(sink));
        self
    }

    pub fn log_if_latest(mut self, enabled: bool) -> Self {
        self.log_if_latest = enabled;
        self
    }

    /// Persist the reached version after every step, not only at the end of
    /// the walk. A failed walk then leaves the record at the last completed
    /// step instead of the version it started from.
    pub fn commit_each_step(mut self, enabled: bool) -> Self {
        self.commit_each_step = enabled;
        self
    }

    pub fn add(&mut self, migration: Migration, channel: &str) -> Result<()> {
        self.registry.register(migration, channel)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ControlStore> {
        &self.store
    }

    /// Current recorded version of `channel`.
    pub fn version(&self, channel: &str) -> Result<Version> {
        Ok(self.store.read_or_create(channel)?.version)
    }

    /// Clear a stale lock left by a crashed run. The version is not touched.
    pub fn unlock(&self, channel: &str) -> Result<()> {
        self.logger.warn(format!("Force-unlocking {channel}"));
        self.store.force_unlock(channel)
    }

    /// Forget all registered migrations and delete every control record.
    pub fn reset(&mut self) -> Result<()> {
        self.registry.reset();
        self.store.reset()
    }

    /// Bring `channel` to the version named by `command`.
    ///
    /// Returns `Outcome::Locked` without error when another caller holds the
    /// channel. If a step function fails the lock is released and the error
    /// returned; the recorded version stays where it was before the walk (or at
    /// the last completed step with `commit_each_step`), even though earlier
    /// steps may already have changed the data. A step with no function for the
    /// walk's direction instead records the version reached so far.
    pub fn migrate_to(&self, command: impl Into<Command>, channel: &str) -> Result<Outcome> {
        let command = command.into();
        let migrations = self
            .registry
            .migrations(channel)
            .filter(|ms| !ms.is_empty())
            .ok_or_else(|| {
                let mut known: Vec<&str> = self.registry.channels().collect();
                known.sort_unstable();
                Error::InvalidCommand(format!(
                    "cannot migrate on unknown channel: {channel} (known: {})",
                    known.join(", ")
                ))
            })?;

        let target = match command.target {
            Target::Latest => migrations[migrations.len() - 1].version(),
            Target::Version(version) => version,
        };
        // Fail before touching the lock if the target does not exist.
        self.registry.index_of_version(target, channel)?;

        self.logger.info(format!("Migrating {channel} to {target}"));
        self.store.read_or_create(channel)?;

        if !self.store.conditional_lock(channel)? {
            self.logger.info("Not migrating, control is locked.");
            return Ok(Outcome::Locked);
        }

        match self.run_locked(migrations, target, command.is_rerun(), channel) {
            Ok(outcome) => Ok(outcome),
            Err(Failure { error, reached }) => {
                self.logger
                    .error(format!("Migration of {channel} failed: {error}"));
                let unlocked = match reached {
                    Some(version) => self.store.commit(channel, version, false),
                    None => self.store.force_unlock(channel),
                };
                if let Err(unlock_err) = unlocked {
                    self.logger
                        .error(format!("Failed to unlock {channel}: {unlock_err}"));
                }
                Err(error)
            }
        }
    }

    fn run_locked(
        &self,
        migrations: &[Migration],
        target: Version,
        rerun: bool,
        channel: &str,
    ) -> std::result::Result<Outcome, Failure> {
        // Read under the lock so a run that finished just before we locked is seen.
        let current = self.store.read_or_create(channel)?.version;

        if rerun {
            self.logger.info(format!("Rerunning version {target}"));
            let idx = self.registry.index_of_version(target, channel)?;
            self.run_step(&migrations[idx], Direction::Up)?;
            self.store.commit(channel, current, false)?;
            self.logger.info("Finished migrating.");
            return Ok(Outcome::Rerun(target));
        }

        if current == target {
            if self.log_if_latest {
                self.logger.info(format!(
                    "Not migrating, {channel} already at version {target}"
                ));
            }
            self.store.commit(channel, current, false)?;
            return Ok(Outcome::AlreadyAt(current));
        }

        let start = self.registry.index_of_version(current, channel)?;
        let end = self.registry.index_of_version(target, channel)?;
        self.logger.info(format!(
            "Migrating from version {} -> {}",
            migrations[start].version(),
            migrations[end].version()
        ));

        let mut reached = current;
        if current < target {
            for migration in &migrations[start + 1..=end] {
                self.step_or_record(migration, Direction::Up, reached)?;
                reached = migration.version();
                self.checkpoint(channel, reached)?;
            }
        } else {
            for idx in (end + 1..=start).rev() {
                self.step_or_record(&migrations[idx], Direction::Down, reached)?;
                reached = migrations[idx - 1].version();
                self.checkpoint(channel, reached)?;
            }
        }

        self.store.commit(channel, reached, false)?;
        self.logger.info("Finished migrating.");
        Ok(Outcome::Migrated {
            from: current,
            to: reached,
        })
    }

    /// Run one walk step. A missing direction carries `reached` so the caller
    /// can record the progress made before it.
    fn step_or_record(
        &self,
        migration: &Migration,
        direction: Direction,
        reached: Version,
    ) -> std::result::Result<(), Failure> {
        self.run_step(migration, direction).map_err(|error| {
            let reached = matches!(error, Error::MissingDirection { .. }).then_some(reached);
            Failure { error, reached }
        })
    }

    fn run_step(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let step = migration
            .step(direction)
            .ok_or(Error::MissingDirection {
                direction: direction.as_str(),
                version: migration.version(),
            })?;

        self.logger.info(format!(
            "Running {direction}() on version {}{}",
            migration.version(),
            migration.label()
        ));

        step(migration).map_err(|source| Error::StepFailed {
            direction: direction.as_str(),
            version: migration.version(),
            source,
        })
    }

    fn checkpoint(&self, channel: &str, version: Version) -> Result<()> {
        if self.commit_each_step {
            self.store.commit(channel, version, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tidemark_db::MemoryControlStore;

    use super::*;
    use crate::registry::DEFAULT_CHANNEL;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn recording(calls: &Calls, version: Version) -> Migration {
        let up_calls = Arc::clone(calls);
        let down_calls = Arc::clone(calls);
        Migration::new(version, move |m| {
            up_calls.lock().unwrap().push(format!("up{}", m.version()));
            Ok(())
        })
        .with_down(move |m| {
            down_calls.lock().unwrap().push(format!("down{}", m.version()));
            Ok(())
        })
    }

    fn migrator() -> Migrator {
        Migrator::new(Arc::new(MemoryControlStore::new())).with_logger(Logger::disabled())
    }

    #[test]
    fn walks_up_then_down() {
        let calls = Calls::default();
        let mut m = migrator();
        for v in [1, 2, 3] {
            m.add(recording(&calls, v), DEFAULT_CHANNEL).unwrap();
        }

        let outcome = m.migrate_to(Command::latest(), DEFAULT_CHANNEL).unwrap();
        assert_eq!(outcome, Outcome::Migrated { from: 0, to: 3 });

        let outcome = m.migrate_to(Command::to(1), DEFAULT_CHANNEL).unwrap();
        assert_eq!(outcome, Outcome::Migrated { from: 3, to: 1 });

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["up1", "up2", "up3", "down3", "down2"]
        );
        assert_eq!(m.version(DEFAULT_CHANNEL).unwrap(), 1);
    }

    #[test]
    fn unknown_channel_is_invalid_command() {
        let m = migrator();
        let err = m.migrate_to(Command::to(1), "nowhere").unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[test]
    fn unknown_target_fails_without_locking() {
        let m = migrator();
        let err = m.migrate_to(Command::to(4), DEFAULT_CHANNEL).unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { version: 4, .. }));
        assert!(m.store().list().unwrap().is_empty());
    }

    #[test]
    fn missing_down_unlocks_and_keeps_version() {
        let mut m = migrator();
        m.add(Migration::new(1, |_| Ok(())), DEFAULT_CHANNEL).unwrap();
        m.migrate_to(Command::to(1), DEFAULT_CHANNEL).unwrap();

        let err = m.migrate_to(Command::to(0), DEFAULT_CHANNEL).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingDirection {
                direction: "down",
                version: 1
            }
        ));

        let record = m.store().read_or_create(DEFAULT_CHANNEL).unwrap();
        assert_eq!(record.version, 1);
        assert!(!record.locked);
    }

    #[test]
    fn missing_down_mid_walk_records_reached_version() {
        let calls = Calls::default();
        let mut m = migrator();
        m.add(Migration::new(1, |_| Ok(())), DEFAULT_CHANNEL).unwrap();
        m.add(Migration::new(2, |_| Ok(())), DEFAULT_CHANNEL).unwrap();
        m.add(recording(&calls, 3), DEFAULT_CHANNEL).unwrap();
        m.migrate_to(Command::latest(), DEFAULT_CHANNEL).unwrap();
        calls.lock().unwrap().clear();

        let err = m.migrate_to(Command::to(0), DEFAULT_CHANNEL).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingDirection {
                direction: "down",
                version: 2
            }
        ));
        let record = m.store().read_or_create(DEFAULT_CHANNEL).unwrap();
        assert_eq!(record.version, 2);
        assert!(!record.locked);

        // A second attempt resumes at 2 and does not undo version 3 again.
        assert!(m.migrate_to(Command::to(0), DEFAULT_CHANNEL).is_err());
        assert_eq!(*calls.lock().unwrap(), vec!["down3"]);
        assert_eq!(m.version(DEFAULT_CHANNEL).unwrap(), 2);
    }

    #[test]
    fn unknown_channel_error_lists_known_channels() {
        let mut m = migrator();
        m.add(Migration::new(1, |_| Ok(())), "reports").unwrap();
        let err = m.migrate_to(Command::to(1), "nowhere").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid command: cannot migrate on unknown channel: nowhere (known: default, reports)"
        );
    }

    #[test]
    fn locked_channel_is_a_no_op() {
        let calls = Calls::default();
        let mut m = migrator();
        m.add(recording(&calls, 1), DEFAULT_CHANNEL).unwrap();
        m.store().read_or_create(DEFAULT_CHANNEL).unwrap();
        assert!(m.store().conditional_lock(DEFAULT_CHANNEL).unwrap());

        let outcome = m.migrate_to(Command::to(1), DEFAULT_CHANNEL).unwrap();
        assert_eq!(outcome, Outcome::Locked);
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(m.version(DEFAULT_CHANNEL).unwrap(), 0);

        m.unlock(DEFAULT_CHANNEL).unwrap();
        assert_eq!(
            m.migrate_to(Command::to(1), DEFAULT_CHANNEL).unwrap(),
            Outcome::Migrated { from: 0, to: 1 }
        );
    }

    #[test]
    fn reset_clears_registry_and_store() {
        let mut m = migrator();
        m.add(Migration::new(1, |_| Ok(())), DEFAULT_CHANNEL).unwrap();
        m.migrate_to(Command::to(1), DEFAULT_CHANNEL).unwrap();

        m.reset().unwrap();
        assert_eq!(m.registry().latest(DEFAULT_CHANNEL), Some(0));
        assert!(m.store().list().unwrap().is_empty());
        assert_eq!(m.version(DEFAULT_CHANNEL).unwrap(), 0);
    }
}
