use std::fmt;
use std::sync::Arc;

use tidemark_common::{BoxError, Error, Result};

pub type Version = u32;

/// A migration step. Receives the migration it belongs to.
pub type StepFn = Arc<dyn Fn(&Migration) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A versioned pair of up/down steps. Fields are private and there are no
/// setters, so a registered migration cannot change afterwards.
#[derive(Clone)]
pub struct Migration {
    version: Version,
    up: StepFn,
    down: Option<StepFn>,
    name: Option<String>,
}

impl Migration {
    pub fn new<F>(version: Version, up: F) -> Self
    where
        F: Fn(&Migration) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            version,
            up: Arc::new(up),
            down: None,
            name: None,
        }
    }

    pub fn builder(version: Version) -> MigrationBuilder {
        MigrationBuilder {
            version,
            up: None,
            down: None,
            name: None,
        }
    }

    /// The version-0 identity migration every channel starts with.
    pub(crate) fn identity() -> Self {
        Self::new(0, |_| Ok(()))
    }

    pub fn with_down<F>(mut self, down: F) -> Self
    where
        F: Fn(&Migration) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.down = Some(Arc::new(down));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn step(&self, direction: Direction) -> Option<&StepFn> {
        match direction {
            Direction::Up => Some(&self.up),
            Direction::Down => self.down.as_ref(),
        }
    }

    /// `" (name)"` when the migration has a display name.
    pub(crate) fn label(&self) -> String {
        self.name
            .as_deref()
            .map(|n| format!(" ({n})"))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("has_down", &self.down.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for migrations assembled from loosely-specified parts.
pub struct MigrationBuilder {
    version: Version,
    up: Option<StepFn>,
    down: Option<StepFn>,
    name: Option<String>,
}

impl MigrationBuilder {
    pub fn up<F>(mut self, up: F) -> Self
    where
        F: Fn(&Migration) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.up = Some(Arc::new(up));
        self
    }

    pub fn down<F>(mut self, down: F) -> Self
    where
        F: Fn(&Migration) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.down = Some(Arc::new(down));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Migration> {
        let up = self.up.ok_or_else(|| {
            Error::InvalidMigration("migration must supply an up function".into())
        })?;
        validate_version(self.version)?;
        Ok(Migration {
            version: self.version,
            up,
            down: self.down,
            name: self.name,
        })
    }
}

pub(crate) fn validate_version(version: Version) -> Result<()> {
    if version == 0 {
        return Err(Error::InvalidMigration(
            "migration version must be greater than 0".into(),
        ));
    }
    Ok(())
}
