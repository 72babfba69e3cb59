//! Monitor run loop
//!
//! Phases: stopped -> starting -> streaming | polling -> stopping -> stopped.
//! A failed stream drops to polling and is reconnected on a capped backoff;
//! a successful reconnect returns to streaming. Every scan catches up from the
//! persisted marker, so switching sources neither loses nor repeats events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{AccountEvent, ChainQuery};
use crate::config::{Config, MonitorMode};
use crate::error::{Error, Result};
use crate::ton::address::{canonical, same_account};
use crate::ton::{is_valid_address, WalletKit};
use crate::wallet::WalletStore;

use super::event::{classify, MonitorEvent};
use super::log::{last_logged, EventLog};
use super::source::{EventSource, PollSource, StreamConnector, Wakeup};
use super::state::{MonitorState, WatchedWallet};

/// Lifecycle phase of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Stopped,
    Starting,
    Streaming,
    Polling,
    Stopping,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Stopped => "stopped",
            Phase::Starting => "starting",
            Phase::Streaming => "streaming",
            Phase::Polling => "polling",
            Phase::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Runtime settings, resolved from [`MonitorConfig`](crate::config::MonitorConfig)
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub mode: MonitorMode,
    pub poll_interval: Duration,
    pub page_size: u32,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub retry_base_delay: Duration,
    pub retry_cap: Duration,
    pub state_path: PathBuf,
    pub events_path: PathBuf,
    /// Print every event line on stdout
    pub echo: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        let m = &config.monitor;
        Self {
            mode: m.mode,
            poll_interval: Duration::from_secs(m.poll_interval_secs),
            page_size: m.page_size,
            reconnect_delay: Duration::from_millis(m.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_secs(m.max_reconnect_delay_secs),
            retry_base_delay: Duration::from_millis(m.retry_base_delay_ms),
            retry_cap: Duration::from_secs(m.retry_cap_secs),
            state_path: config.state_path(),
            events_path: config.events_path(),
            echo: false,
        }
    }

    /// Unbounded in time, capped per attempt
    fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_base_delay)
            .with_max_interval(self.retry_cap)
            .with_max_elapsed_time(None)
            .build()
    }

    fn reconnect_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.reconnect_delay)
            .with_max_interval(self.max_reconnect_delay)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Wallet the monitor watches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredWallet {
    pub label: String,
    pub address: String,
    pub address_raw: String,
}

impl MonitoredWallet {
    /// Watch an address that is not in the store
    pub fn from_address(address: &str) -> Self {
        Self {
            label: address.to_string(),
            address: address.to_string(),
            address_raw: canonical(address),
        }
    }
}

/// Resolve `--wallet` arguments against the store.
///
/// No arguments means every stored wallet (none if there is no store).
/// Labels that do not resolve are skipped with a warning; if nothing
/// resolves the call fails with `WalletNotFound`.
pub fn resolve_wallets<K: WalletKit>(
    store: &WalletStore<K>,
    password: Option<&str>,
    requested: &[String],
) -> Result<Vec<MonitoredWallet>> {
    let known = match (store.exists(), password) {
        (false, _) => Vec::new(),
        (true, Some(password)) => store.list(password)?,
        (true, None) if requested.is_empty() => {
            return Err(Error::InvalidInput(
                "A password is required to read the wallet store".to_string(),
            ))
        }
        (true, None) => Vec::new(),
    };

    let mut wallets: Vec<MonitoredWallet> = Vec::new();
    let mut push = |wallet: MonitoredWallet| {
        if !wallets.iter().any(|w| w.address_raw == wallet.address_raw) {
            wallets.push(wallet);
        }
    };

    if requested.is_empty() {
        for w in &known {
            push(MonitoredWallet {
                label: w.label.clone(),
                address: w.address.clone(),
                address_raw: w.address_raw.clone(),
            });
        }
        return Ok(wallets);
    }

    let mut missing = Vec::new();
    for item in requested {
        let stored = known
            .iter()
            .find(|w| w.label.eq_ignore_ascii_case(item) || same_account(&w.address_raw, item));

        match stored {
            Some(w) => push(MonitoredWallet {
                label: w.label.clone(),
                address: w.address.clone(),
                address_raw: w.address_raw.clone(),
            }),
            None if is_valid_address(item) => push(MonitoredWallet::from_address(item)),
            None => {
                warn!("Skipping '{}': wallet not found", item);
                missing.push(item.as_str());
            }
        }
    }

    if wallets.is_empty() {
        return Err(Error::WalletNotFound(missing.join(", ")));
    }
    Ok(wallets)
}

/// Result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub wallets: usize,
    pub events: u64,
}

pub struct Monitor {
    chain: Arc<dyn ChainQuery>,
    connector: Option<Arc<dyn StreamConnector>>,
    settings: MonitorSettings,
    wallets: Vec<MonitoredWallet>,
    state: MonitorState,
    log: Option<EventLog>,
    phase: watch::Sender<Phase>,
    emitted: u64,
}

impl Monitor {
    /// Without a connector the monitor only polls
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        connector: Option<Arc<dyn StreamConnector>>,
        settings: MonitorSettings,
        wallets: Vec<MonitoredWallet>,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Stopped);
        Self {
            chain,
            connector,
            settings,
            wallets,
            state: MonitorState::default(),
            log: None,
            phase,
            emitted: 0,
        }
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    fn set_phase(&mut self, next: Phase) {
        let prev = self.phase.send_replace(next);
        if prev != next {
            info!("Monitor {} -> {}", prev, next);
        }
        self.state.mode = Some(next.to_string());
    }

    /// Load state, reconcile markers with the event log and open the log
    pub async fn start(&mut self) -> Result<()> {
        let mut state = MonitorState::load(&self.settings.state_path)?;

        // A crash between appending an event and saving its marker leaves
        // the log ahead of the state
        for (address_raw, logged) in last_logged(&self.settings.events_path)? {
            if state.advance(&address_raw, &logged.tx_id, logged.lt) {
                info!(
                    "Marker of {} restored from event log at lt {}",
                    address_raw, logged.lt
                );
            }
        }

        state.started_at = Some(Utc::now());
        state.wallets = self
            .wallets
            .iter()
            .map(|w| WatchedWallet {
                label: w.label.clone(),
                address: w.address.clone(),
            })
            .collect();
        self.state = state;
        self.set_phase(Phase::Starting);

        self.log = Some(EventLog::open(&self.settings.events_path).await?);
        self.state.save_async(&self.settings.state_path).await?;

        if self.wallets.is_empty() {
            warn!("No wallets to monitor; idling until stopped");
        } else {
            info!("Monitoring {} wallet(s)", self.wallets.len());
        }
        Ok(())
    }

    /// Run until `cancel` fires, then persist the stopped state
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary> {
        self.start().await?;

        let mut reconnect = self.settings.reconnect_backoff();
        let mut reconnect_at: Option<Instant> = None;

        let mut source: Box<dyn EventSource> = if self.settings.mode == MonitorMode::Stream
            && self.connector.is_some()
        {
            match self.connect_stream().await {
                Ok(stream) => {
                    self.set_phase(Phase::Streaming);
                    stream
                }
                Err(e) => {
                    reconnect_at = Some(self.schedule_reconnect(&e, &mut reconnect));
                    self.set_phase(Phase::Polling);
                    Box::new(PollSource::new(self.settings.poll_interval))
                }
            }
        } else {
            self.set_phase(Phase::Polling);
            Box::new(PollSource::new(self.settings.poll_interval))
        };
        self.persist().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = sleep_until(reconnect_at) => {
                    match self.connect_stream().await {
                        Ok(stream) => {
                            info!("Stream reconnected");
                            reconnect.reset();
                            reconnect_at = None;
                            source = stream;
                            self.set_phase(Phase::Streaming);
                            self.persist().await;
                        }
                        Err(e) => {
                            reconnect_at = Some(self.schedule_reconnect(&e, &mut reconnect));
                        }
                    }
                }

                wakeup = source.next_wakeup() => match wakeup {
                    Ok(wakeup) => {
                        if !self.scan(wakeup, &cancel).await {
                            break;
                        }
                    }
                    Err(e) => {
                        reconnect_at = Some(self.schedule_reconnect(&e, &mut reconnect));
                        source = Box::new(PollSource::new(self.settings.poll_interval));
                        self.set_phase(Phase::Polling);
                        self.persist().await;
                    }
                },
            }
        }

        self.stop().await
    }

    async fn stop(mut self) -> Result<RunSummary> {
        self.set_phase(Phase::Stopping);
        self.state.started_at = None;
        self.set_phase(Phase::Stopped);
        self.state.save_async(&self.settings.state_path).await?;

        info!("Monitor stopped after {} event(s)", self.emitted);
        Ok(RunSummary {
            wallets: self.wallets.len(),
            events: self.emitted,
        })
    }

    async fn connect_stream(&self) -> Result<Box<dyn EventSource>> {
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| Error::Config("No stream connector configured".to_string()))?;
        let accounts: Vec<String> = self.wallets.iter().map(|w| w.address_raw.clone()).collect();
        connector.connect(&accounts).await
    }

    fn schedule_reconnect(&self, err: &Error, backoff: &mut ExponentialBackoff) -> Instant {
        let delay = backoff
            .next_backoff()
            .unwrap_or(self.settings.max_reconnect_delay);
        warn!("Stream unavailable: {}; polling, reconnect in {:?}", err, delay);
        Instant::now() + delay
    }

    async fn persist(&self) {
        if let Err(e) = self.state.save_async(&self.settings.state_path).await {
            warn!("Failed to save monitor state: {}", e);
        }
    }

    /// Scan the accounts named by `wakeup`. Returns `false` once cancelled.
    pub async fn scan(&mut self, wakeup: Wakeup, cancel: &CancellationToken) -> bool {
        let targets: Vec<usize> = match &wakeup {
            Wakeup::All => (0..self.wallets.len()).collect(),
            Wakeup::Accounts(ids) => (0..self.wallets.len())
                .filter(|&i| ids.iter().any(|id| same_account(id, &self.wallets[i].address_raw)))
                .collect(),
        };

        for i in targets {
            if cancel.is_cancelled() || !self.scan_with_retry(i, cancel).await {
                return false;
            }
        }
        true
    }

    async fn scan_with_retry(&mut self, index: usize, cancel: &CancellationToken) -> bool {
        let mut backoff = self.settings.retry_backoff();
        let label = self.wallets[index].label.clone();

        loop {
            match self.scan_wallet(index).await {
                Ok(0) => return true,
                Ok(n) => {
                    debug!("{} new event(s) for {}", n, label);
                    return true;
                }
                Err(e) if e.is_retryable() => {
                    let delay = backoff.next_backoff().unwrap_or(self.settings.retry_cap);
                    warn!("Scan of {} failed: {}; retrying in {:?}", label, e, delay);
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!("Scan of {} failed: {}; skipped until next wakeup", label, e);
                    return true;
                }
            }
        }
    }

    /// Emit every completed event newer than the marker, oldest first
    async fn scan_wallet(&mut self, index: usize) -> Result<usize> {
        let wallet = self.wallets[index].clone();
        let marker_lt = self.state.marker(&wallet.address_raw).map(|m| m.lt);
        let page_size = self.settings.page_size.max(1);

        // Newest first; follow the cursor until the marker or the end of history.
        // Page length says nothing about what is left, only `next_from` does.
        let mut fresh: Vec<AccountEvent> = Vec::new();
        let mut before_lt: Option<u64> = None;
        loop {
            let page = self
                .chain
                .account_events(&wallet.address, page_size, before_lt)
                .await?;
            let next_from = page.next_from;

            let mut reached = false;
            for event in page.events {
                if marker_lt.is_some_and(|lt| event.lt <= lt) {
                    reached = true;
                    break;
                }
                fresh.push(event);
            }

            if marker_lt.is_none() || reached || next_from == 0 {
                break;
            }
            if before_lt.is_some_and(|lt| next_from >= lt) {
                // Nothing is committed, the next wakeup starts over
                return Err(Error::Internal(format!(
                    "Event cursor for {} did not move back (next_from {})",
                    wallet.label, next_from
                )));
            }
            before_lt = Some(next_from);
        }

        if marker_lt.is_none() {
            self.take_baseline(&wallet, &fresh).await?;
            return Ok(0);
        }

        let mut emitted = 0;
        for event in fresh.iter().rev() {
            if event.in_progress {
                debug!("Event {} of {} still in progress", event.event_id, wallet.label);
                break;
            }
            self.commit(&wallet, classify(event, &wallet.label, &wallet.address))
                .await?;
            emitted += 1;
        }
        Ok(emitted)
    }

    /// First sight of a wallet: its history so far is not reported
    async fn take_baseline(&mut self, wallet: &MonitoredWallet, newest: &[AccountEvent]) -> Result<()> {
        let changed = match newest.iter().find(|e| !e.in_progress) {
            Some(event) => self
                .state
                .baseline(&wallet.address_raw, &event.event_id, event.lt),
            None if newest.is_empty() => self.state.baseline(&wallet.address_raw, "", 0),
            None => false,
        };

        if changed {
            info!("Baseline for {} taken", wallet.label);
            self.state.save_async(&self.settings.state_path).await?;
        }
        Ok(())
    }

    /// Log first, then move the marker
    async fn commit(&mut self, wallet: &MonitoredWallet, event: MonitorEvent) -> Result<()> {
        let log = self
            .log
            .as_mut()
            .ok_or_else(|| Error::Internal("Event log is not open".to_string()))?;
        log.append(&event).await?;

        if self.settings.echo {
            println!("{}", serde_json::to_string(&event)?);
        }
        info!(
            "{} | {} | {} (lt {})",
            event.wallet,
            event.kind.name(),
            event.summary(),
            event.lt
        );

        self.state.advance(&wallet.address_raw, &event.tx_id, event.lt);
        self.state.save_async(&self.settings.state_path).await?;
        self.emitted += 1;
        Ok(())
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
