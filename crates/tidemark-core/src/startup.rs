use tidemark_common::Result;
use tidemark_config::MigrationsConfig;
use tracing::debug;

use crate::command::Command;
use crate::engine::{Migrator, Outcome};

/// Result of a startup-triggered migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerReport {
    /// `None` when the variable was unset or empty.
    pub outcome: Option<Outcome>,
    /// The command carried `,exit`; the host should stop after this call.
    pub exit_requested: bool,
}

/// Run the migration named by the environment variable `var`, if set.
///
/// Typical values are `latest`, `latest,exit`, `2,exit` or `3,rerun`. The
/// process is never terminated here; check `exit_requested` instead.
pub fn run_from_env(migrator: &Migrator, var: &str, channel: &str) -> Result<TriggerReport> {
    let value = std::env::var(var).unwrap_or_default();
    run_from_value(migrator, &value, channel)
}

/// `run_from_env` with the variable named in `config.trigger_var`.
pub fn run_from_config(
    migrator: &Migrator,
    config: &MigrationsConfig,
    channel: &str,
) -> Result<TriggerReport> {
    run_from_env(migrator, &config.trigger_var, channel)
}

pub(crate) fn run_from_value(
    migrator: &Migrator,
    value: &str,
    channel: &str,
) -> Result<TriggerReport> {
    if value.trim().is_empty() {
        debug!("startup trigger not set, skipping migrations");
        return Ok(TriggerReport {
            outcome: None,
            exit_requested: false,
        });
    }

    let command = Command::parse(value)?;
    let outcome = migrator.migrate_to(command, channel)?;
    Ok(TriggerReport {
        outcome: Some(outcome),
        exit_requested: command.exit_requested(),
    })
}
