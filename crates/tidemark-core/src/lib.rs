pub mod command;
pub mod engine;
pub mod logger;
pub mod migration;
pub mod registry;
pub mod startup;

pub use command::{Command, Modifier, Target};
pub use engine::{Migrator, Outcome};
pub use logger::{LogLevel, LogRecord, LogSink, Logger};
pub use migration::{Migration, MigrationBuilder, StepFn, Version};
pub use registry::{DEFAULT_CHANNEL, Registry};
pub use startup::{TriggerReport, run_from_config, run_from_env};
