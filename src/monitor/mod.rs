//! Transaction monitor
//!
//! Watches wallet addresses for new on-chain events and appends one JSON line
//! per event to the event log.
//!
//! # Architecture
//!
//! ```text
//! TonApiStream ─┐
//!               ├→ Wakeup → Monitor::scan → classify → EventLog → marker
//! PollSource ───┘                 ↑
//!                           ChainQuery (paged account events)
//! ```
//!
//! Each monitored address has a marker (its last processed logical time).
//! An event is appended to the log before the marker moves past it, and the
//! marker is reconciled against the log on start.

pub mod daemon;
pub mod event;
pub mod log;
pub mod runner;
pub mod source;
pub mod state;
pub mod stream;

pub use daemon::{MonitorStatus, PidGuard};
pub use event::{classify, EventKind, MonitorEvent};
pub use log::EventLog;
pub use runner::{resolve_wallets, Monitor, MonitorSettings, MonitoredWallet, Phase, RunSummary};
pub use source::{EventSource, PollSource, StreamConnector, Wakeup};
pub use state::{Marker, MonitorState};
pub use stream::TonApiStreamConnector;
