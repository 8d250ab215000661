use std::fmt;
use std::str::FromStr;

use tidemark_common::{Error, Result};

use crate::migration::Version;

/// Which version a command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Latest,
    Version(Version),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Re-apply the target's `up` step without moving the recorded version.
    Rerun,
    /// Ask the host process to exit once the attempt completes.
    Exit,
}

/// A parsed invocation such as `latest`, `2,exit` or `3,rerun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub target: Target,
    pub modifier: Option<Modifier>,
}

impl Command {
    pub fn latest() -> Self {
        Self {
            target: Target::Latest,
            modifier: None,
        }
    }

    /// Migrate to an exact version.
    pub fn to(version: Version) -> Self {
        Self {
            target: Target::Version(version),
            modifier: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        input.parse()
    }

    pub fn is_rerun(&self) -> bool {
        self.modifier == Some(Modifier::Rerun)
    }

    pub fn exit_requested(&self) -> bool {
        self.modifier == Some(Modifier::Exit)
    }
}

impl From<Version> for Command {
    fn from(version: Version) -> Self {
        Self::to(version)
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut parts = input.split(',').map(str::trim);
        let head = parts.next().unwrap_or_default();
        if head.is_empty() {
            return Err(Error::InvalidCommand(format!("{input:?}")));
        }

        let target = if head == "latest" {
            Target::Latest
        } else {
            let version = head.parse::<Version>().map_err(|_| {
                Error::InvalidCommand(format!("{input:?}: {head:?} is not a version"))
            })?;
            Target::Version(version)
        };

        let modifier = match parts.next() {
            None => None,
            Some("rerun") => Some(Modifier::Rerun),
            Some("exit") => Some(Modifier::Exit),
            Some(other) => {
                return Err(Error::InvalidCommand(format!(
                    "{input:?}: unknown modifier {other:?}"
                )));
            }
        };

        if parts.next().is_some() {
            return Err(Error::InvalidCommand(format!(
                "{input:?}: at most one modifier is allowed"
            )));
        }

        Ok(Self { target, modifier })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Target::Latest => f.write_str("latest")?,
            Target::Version(v) => write!(f, "{v}")?,
        }
        match self.modifier {
            Some(Modifier::Rerun) => f.write_str(",rerun"),
            Some(Modifier::Exit) => f.write_str(",exit"),
            None => Ok(()),
        }
    }
}
