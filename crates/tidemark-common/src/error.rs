use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by user-supplied migration steps.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("can't find migration version {version} on channel {channel}")]
    VersionNotFound { version: u32, channel: String },

    #[error("cannot migrate {direction} on version {version}")]
    MissingDirection {
        direction: &'static str,
        version: u32,
    },

    #[error("invalid control record: {0}")]
    InvalidControlRecord(String),

    #[error("{direction}() on version {version} failed: {source}")]
    StepFailed {
        direction: &'static str,
        version: u32,
        #[source]
        source: BoxError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),
}
