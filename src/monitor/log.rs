//! Append-only JSON-lines event log
//!
//! Each emitted event is one line, synced to disk before the caller advances
//! the address marker. An external consumer may tail and truncate the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::ton::address::canonical;

use super::event::MonitorEvent;

/// Newest logged event per address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMarker {
    pub tx_id: String,
    pub lt: u64,
}

pub struct EventLog {
    path: PathBuf,
    file: File,
}

impl EventLog {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one event line and sync it
    pub async fn append(&mut self, event: &MonitorEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        self.file.write_all(&line).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;

        debug!("Logged {} {} lt={}", event.kind.name(), event.wallet, event.lt);
        Ok(())
    }
}

/// Highest `lt` logged per raw address.
///
/// Unparseable lines (a torn final write) are skipped.
pub fn last_logged(path: &Path) -> Result<HashMap<String, LoggedMarker>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut markers: HashMap<String, LoggedMarker> = HashMap::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: MonitorEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping event log line {}: {}", n + 1, e);
                continue;
            }
        };

        let key = canonical(&event.address);
        if markers.get(&key).map_or(true, |m| event.lt > m.lt) {
            markers.insert(
                key,
                LoggedMarker {
                    tx_id: event.tx_id,
                    lt: event.lt,
                },
            );
        }
    }
    Ok(markers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::transfer_event;
    use crate::monitor::event::classify;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_and_reconcile_markers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let alice = format!("0:{}", "aa".repeat(32));
        let bob = format!("0:{}", "bb".repeat(32));

        let mut log = EventLog::open(&path).await.unwrap();
        for (lt, who) in [(3, &alice), (5, &alice), (4, &bob)] {
            let event = classify(&transfer_event(lt, "0:00", who, 1), "w", who);
            log.append(&event).await.unwrap();
        }

        // Torn last line from a crash mid-write
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{\"wallet\":\"w\",\"addr").unwrap();
        }

        let markers = last_logged(&path).unwrap();
        assert_eq!(markers[&alice].lt, 5);
        assert_eq!(markers[&alice].tx_id, "event-5");
        assert_eq!(markers[&bob].lt, 4);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        assert!(last_logged(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }
}
