use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidemark_common::Result;

/// Persisted state of one migration channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub id: String,
    pub channel: String,
    pub version: u32,
    pub locked: bool,
    /// When the lock was last taken. Informational only.
    pub locked_at: Option<DateTime<Utc>>,
}

impl ControlRecord {
    /// A fresh record: version 0, unlocked.
    pub fn initial(channel: &str) -> Self {
        Self {
            id: control_id(channel),
            channel: channel.to_string(),
            version: 0,
            locked: false,
            locked_at: None,
        }
    }
}

/// Key under which a channel's control record is stored.
pub fn control_id(channel: &str) -> String {
    format!("control_{channel}")
}

/// Storage contract for control records.
///
/// Implementations must make `conditional_lock` a single atomic
/// compare-and-set: of any number of concurrent callers on the same channel,
/// at most one may observe `true`.
pub trait ControlStore: Send + Sync {
    /// Return the channel's record, creating it at version 0 if absent.
    fn read_or_create(&self, channel: &str) -> Result<ControlRecord>;

    /// Take the lock if and only if the record is currently unlocked.
    fn conditional_lock(&self, channel: &str) -> Result<bool>;

    /// Write version and lock state, creating the record if needed.
    fn commit(&self, channel: &str, version: u32, locked: bool) -> Result<()>;

    /// Clear the lock flag without touching the version.
    fn force_unlock(&self, channel: &str) -> Result<()>;

    /// All control records, ordered by channel name.
    fn list(&self) -> Result<Vec<ControlRecord>>;

    /// Delete every control record.
    fn reset(&self) -> Result<()>;
}

pub(crate) fn check_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(tidemark_common::Error::InvalidControlRecord(
            "channel name cannot be empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_id_is_derived_from_channel() {
        assert_eq!(control_id("default"), "control_default");
        assert_eq!(ControlRecord::initial("a").id, "control_a");
    }

    #[test]
    fn record_serializes_with_optional_timestamp() {
        let record = ControlRecord::initial("default");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["locked"], false);
        assert!(json["locked_at"].is_null());
    }
}
