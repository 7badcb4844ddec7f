//! ---
//! ems_section: "09-ai-governance-advisory"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Governance advisory client and insight persistence."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Slot name under which the last advisory text is stored.
pub const INSIGHT_KEY: &str = "last_ai_insight";

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the insight store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InsightEnvelope {
    key: String,
    text: String,
    saved_at: DateTime<Utc>,
}

/// Durable single-slot store for the last successful advisory text.
///
/// The slot outlives the process; it is read back at startup as the initial
/// displayed text and whenever a live advisory request cannot be issued.
/// Writes replace the whole file, so no partial state can be observed by a
/// later load.
#[derive(Debug, Clone)]
pub struct InsightStore {
    path: PathBuf,
}

impl InsightStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted text. Missing, unreadable or corrupt slots all
    /// yield `None`; a corrupt slot is reported but never fails the caller.
    pub fn load(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<InsightEnvelope>(&contents) {
            Ok(envelope) if envelope.key == INSIGHT_KEY => Some(envelope.text),
            Ok(envelope) => {
                warn!(slot = %envelope.key, path = %self.path.display(), "unexpected insight slot key");
                None
            }
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "corrupt insight slot");
                None
            }
        }
    }

    /// Overwrite the slot with fresh advisory text.
    pub fn save(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let envelope = InsightEnvelope {
            key: INSIGHT_KEY.to_owned(),
            text: text.to_owned(),
            saved_at: Utc::now(),
        };
        fs::write(&self.path, serde_json::to_vec_pretty(&envelope)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = InsightStore::new(dir.path().join("insight.json"));
        assert_eq!(store.load(), None);
        store.save("Shift HVAC loads to off-peak windows.").unwrap();
        assert_eq!(
            store.load().as_deref(),
            Some("Shift HVAC loads to off-peak windows.")
        );
    }

    #[test]
    fn overwrites_previous_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = InsightStore::new(dir.path().join("insight.json"));
        store.save("first").unwrap();
        store.save("second").unwrap();
        assert_eq!(store.load().as_deref(), Some("second"));
    }

    #[test]
    fn corrupt_slot_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insight.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert_eq!(InsightStore::new(&path).load(), None);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = InsightStore::new(dir.path().join("state/nested/insight.json"));
        store.save("made it").unwrap();
        assert_eq!(store.load().as_deref(), Some("made it"));
    }
}
