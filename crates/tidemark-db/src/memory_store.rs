use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tidemark_common::{Error, Result};

use crate::control::{ControlRecord, ControlStore, check_channel};

/// Process-local control store. The compare-and-set runs under one mutex,
/// so it is atomic across threads but not across processes.
#[derive(Default)]
pub struct MemoryControlStore {
    records: Mutex<BTreeMap<String, ControlRecord>>,
}

impl MemoryControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<String, ControlRecord>>> {
        self.records
            .lock()
            .map_err(|_| Error::Database("memory store lock poisoned".into()))
    }
}

impl ControlStore for MemoryControlStore {
    fn read_or_create(&self, channel: &str) -> Result<ControlRecord> {
        check_channel(channel)?;
        let mut records = self.records()?;
        Ok(records
            .entry(channel.to_string())
            .or_insert_with(|| ControlRecord::initial(channel))
            .clone())
    }

    fn conditional_lock(&self, channel: &str) -> Result<bool> {
        check_channel(channel)?;
        let mut records = self.records()?;
        match records.get_mut(channel) {
            Some(record) if !record.locked => {
                record.locked = true;
                record.locked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn commit(&self, channel: &str, version: u32, locked: bool) -> Result<()> {
        check_channel(channel)?;
        let mut records = self.records()?;
        let record = records
            .entry(channel.to_string())
            .or_insert_with(|| ControlRecord::initial(channel));
        record.version = version;
        record.locked = locked;
        Ok(())
    }

    fn force_unlock(&self, channel: &str) -> Result<()> {
        check_channel(channel)?;
        if let Some(record) = self.records()?.get_mut(channel) {
            record.locked = false;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<ControlRecord>> {
        Ok(self.records()?.values().cloned().collect())
    }

    fn reset(&self) -> Result<()> {
        self.records()?.clear();
        Ok(())
    }
}
