//! Event sources driving the monitor loop
//!
//! A source only says *when* to look and *which* accounts; the scan itself
//! always catches up from the persisted marker, so a missed notification is
//! never a missed event.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::Result;

/// What the next scan should cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup {
    /// Every monitored account
    All,
    /// Only these accounts (any address form)
    Accounts(Vec<String>),
}

/// Capability shared by the streaming and polling strategies
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next reason to scan.
    ///
    /// An error means the source is dead and must be replaced.
    async fn next_wakeup(&mut self) -> Result<Wakeup>;

    fn name(&self) -> &'static str;
}

/// Opens streaming sources; a failed connect sends the monitor to polling
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, accounts: &[String]) -> Result<Box<dyn EventSource>>;
}

/// Timer-driven fallback: every tick scans all accounts
pub struct PollSource {
    timer: Interval,
}

impl PollSource {
    /// First wakeup fires immediately
    pub fn new(period: Duration) -> Self {
        let mut timer = interval_at(Instant::now(), period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { timer }
    }
}

#[async_trait]
impl EventSource for PollSource {
    async fn next_wakeup(&mut self) -> Result<Wakeup> {
        self.timer.tick().await;
        Ok(Wakeup::All)
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}
