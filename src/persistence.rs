//! Durable snapshot of the widget store.
//!
//! The state file is a JSON object of named records, like browser local
//! storage. The dashboard owns one record; any others are left untouched.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::store::StoreSnapshot;

pub const STATE_RECORD: &str = "finance-dashboard";

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the dashboard record. A missing file or record is an empty dashboard.
    pub fn load(&self) -> Result<StoreSnapshot> {
        let Some(mut records) = self.read_records()? else {
            debug!("No state file at {:?}", self.path);
            return Ok(StoreSnapshot::default());
        };
        let Some(record) = records.remove(STATE_RECORD) else {
            debug!("State file {:?} has no '{}' record", self.path, STATE_RECORD);
            return Ok(StoreSnapshot::default());
        };

        let snapshot: StoreSnapshot = serde_json::from_value(record)
            .with_context(|| format!("Failed to parse dashboard state in {:?}", self.path))?;
        info!(
            "Loaded {} widgets and {} cache entries from {:?}",
            snapshot.widgets.len(),
            snapshot.api_cache.len(),
            self.path
        );
        Ok(snapshot)
    }

    /// Write the dashboard record, replacing the file atomically.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let mut records = self.read_records()?.unwrap_or_default();
        records.insert(STATE_RECORD.to_string(), serde_json::to_value(snapshot)?);

        let body = serde_json::to_string_pretty(&Value::Object(records))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write state: {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state: {:?}", self.path))?;

        info!("Saved {} widgets to {:?}", snapshot.widgets.len(), self.path);
        Ok(())
    }

    fn read_records(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state: {:?}", self.path))?;
        let records = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state: {:?}", self.path))?;
        Ok(Some(records))
    }
}
