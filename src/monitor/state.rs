//! Persisted monitor state
//!
//! Holds one marker per monitored address (raw form). A marker only moves
//! forward and is written after the event it covers is in the event log.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fsutil::{atomic_write, atomic_write_async};

/// Last processed event of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Empty for a baseline taken on an account with no history
    pub event_id: String,
    pub lt: u64,
    pub updated_at: DateTime<Utc>,
}

/// Wallet entry shown by `monitor status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedWallet {
    pub label: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorState {
    #[serde(default)]
    pub last_seen: BTreeMap<String, Marker>,
    /// Set while a monitor process is running
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub wallets: Vec<WatchedWallet>,
    /// Current phase of the running monitor
    #[serde(default)]
    pub mode: Option<String>,
}

impl MonitorState {
    /// Missing file reads as an empty state
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Serialization(format!(
                    "Monitor state {} is unreadable: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, &serde_json::to_vec_pretty(self)?)
    }

    pub async fn save_async(&self, path: &Path) -> Result<()> {
        atomic_write_async(path, serde_json::to_vec_pretty(self)?).await
    }

    pub fn marker(&self, address_raw: &str) -> Option<&Marker> {
        self.last_seen.get(address_raw)
    }

    /// Move the marker of `address_raw` to `lt`; never moves it back
    pub fn advance(&mut self, address_raw: &str, event_id: &str, lt: u64) -> bool {
        if self.last_seen.get(address_raw).is_some_and(|m| m.lt >= lt) {
            return false;
        }
        self.set(address_raw, event_id, lt);
        true
    }

    /// First marker of an address; no-op once one exists
    pub fn baseline(&mut self, address_raw: &str, event_id: &str, lt: u64) -> bool {
        if self.last_seen.contains_key(address_raw) {
            return false;
        }
        self.set(address_raw, event_id, lt);
        true
    }

    fn set(&mut self, address_raw: &str, event_id: &str, lt: u64) {
        debug!("Marker {} -> lt {}", address_raw, lt);
        self.last_seen.insert(
            address_raw.to_string(),
            Marker {
                event_id: event_id.to_string(),
                lt,
                updated_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_markers_only_move_forward() {
        let mut state = MonitorState::default();
        assert!(state.advance("0:aa", "e5", 5));
        assert!(!state.advance("0:aa", "e3", 3));
        assert!(!state.advance("0:aa", "e5", 5));
        assert!(state.advance("0:aa", "e9", 9));
        assert_eq!(state.marker("0:aa").unwrap().event_id, "e9");
        assert!(state.marker("0:bb").is_none());

        assert!(state.baseline("0:bb", "", 0));
        assert!(!state.baseline("0:bb", "e7", 7));
        assert_eq!(state.marker("0:bb").unwrap().lt, 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("monitor_state.json");
        assert!(MonitorState::load(&path).unwrap().last_seen.is_empty());

        let mut state = MonitorState::default();
        state.advance("0:aa", "e1", 1);
        state.started_at = Some(Utc::now());
        state.save(&path).unwrap();

        let loaded = MonitorState::load(&path).unwrap();
        assert_eq!(loaded.marker("0:aa").unwrap().lt, 1);
        assert!(loaded.started_at.is_some());

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["last_seen"]["0:aa"]["event_id"], "e1");

        std::fs::write(&path, b"{not json").unwrap();
        assert!(MonitorState::load(&path).is_err());
    }
}
