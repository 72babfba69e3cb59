//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub tonapi: TonApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Which TON network addresses and endpoints belong to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn is_testnet(&self) -> bool {
        matches!(self, Network::Testnet)
    }
}

/// TonAPI (chain indexer) connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct TonApiConfig {
    /// REST base URL; derived from the network when unset
    #[serde(default)]
    pub base_url: Option<String>,
    /// Streaming endpoint; derived from the network when unset
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Wallet store location and key-derivation cost
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_wallets_file")]
    pub wallets_file: String,
    #[serde(default)]
    pub kdf: KdfConfig,
}

/// Argon2id parameters used when a new store file is created.
///
/// Existing files carry their own parameters in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KdfConfig {
    #[serde(default = "default_kdf_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_kdf_iterations")]
    pub iterations: u32,
    #[serde(default = "default_kdf_parallelism")]
    pub parallelism: u32,
}

/// Which event source the monitor starts with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Stream,
    Polling,
}

impl std::fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorMode::Stream => write!(f, "stream"),
            MonitorMode::Polling => write!(f, "polling"),
        }
    }
}

/// Transaction monitor settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mode: MonitorMode,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Events requested per page when scanning an account
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Scan retries back off up to this interval, then keep retrying at it
    #[serde(default = "default_retry_cap_secs")]
    pub retry_cap_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_events_file")]
    pub events_file: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_pid_file")]
    pub pid_file: String,
}

// Default value functions

fn default_api_key() -> String {
    std::env::var("TONAPI_KEY").unwrap_or_default()
}

fn default_timeout_ms() -> u64 {
    15000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

/// `$TON_SKILL_HOME`, else `~/.openclaw/ton-skill`
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TON_SKILL_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openclaw")
        .join("ton-skill")
}

fn default_wallets_file() -> String {
    "wallets.enc".to_string()
}

fn default_kdf_memory_kib() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    20
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_max_reconnect_delay_secs() -> u64 {
    300
}

fn default_retry_cap_secs() -> u64 {
    300
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_state_file() -> String {
    "monitor_state.json".to_string()
}

fn default_events_file() -> String {
    "monitor_events.jsonl".to_string()
}

fn default_log_file() -> String {
    "monitor.log".to_string()
}

fn default_pid_file() -> String {
    "monitor.pid".to_string()
}

impl Default for TonApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            ws_url: None,
            api_key: default_api_key(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            wallets_file: default_wallets_file(),
            kdf: KdfConfig::default(),
        }
    }
}

impl KdfConfig {
    /// 4 GiB
    pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;
    pub const MAX_ITERATIONS: u32 = 64;
    pub const MAX_PARALLELISM: u32 = 16;

    /// Range check shared by the config file and store headers
    pub fn check(&self) -> std::result::Result<(), String> {
        if !(1..=Self::MAX_ITERATIONS).contains(&self.iterations) {
            return Err(format!(
                "iterations {} outside 1..={}",
                self.iterations,
                Self::MAX_ITERATIONS
            ));
        }
        if !(1..=Self::MAX_PARALLELISM).contains(&self.parallelism) {
            return Err(format!(
                "parallelism {} outside 1..={}",
                self.parallelism,
                Self::MAX_PARALLELISM
            ));
        }
        let min_memory = 8 * self.parallelism;
        if !(min_memory..=Self::MAX_MEMORY_KIB).contains(&self.memory_kib) {
            return Err(format!(
                "memory_kib {} outside {}..={}",
                self.memory_kib,
                min_memory,
                Self::MAX_MEMORY_KIB
            ));
        }
        Ok(())
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_kdf_memory_kib(),
            iterations: default_kdf_iterations(),
            parallelism: default_kdf_parallelism(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: MonitorMode::default(),
            poll_interval_secs: default_poll_interval_secs(),
            page_size: default_page_size(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_cap_secs: default_retry_cap_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            state_file: default_state_file(),
            events_file: default_events_file(),
            log_file: default_log_file(),
            pid_file: default_pid_file(),
        }
    }
}

impl TonApiConfig {
    pub fn base_url(&self, network: Network) -> String {
        match &self.base_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => match network {
                Network::Mainnet => "https://tonapi.io".to_string(),
                Network::Testnet => "https://testnet.tonapi.io".to_string(),
            },
        }
    }

    pub fn ws_url(&self, network: Network) -> String {
        match &self.ws_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => match network {
                Network::Mainnet => "wss://tonapi.io/v2/websocket".to_string(),
                Network::Testnet => "wss://testnet.tonapi.io/v2/websocket".to_string(),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// `path` defaults to `<data_dir>/config.toml`; a missing file is fine.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_data_dir().join("config.toml"));

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path.as_path()).required(false))
            // Override with environment variables (prefix TON_SKILL_)
            .add_source(
                config::Environment::with_prefix("TON_SKILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("tonapi.base_url", self.tonapi.base_url(self.network)),
            ("tonapi.ws_url", self.tonapi.ws_url(self.network)),
        ] {
            url::Url::parse(&url).with_context(|| format!("{} is not a valid URL: {}", name, url))?;
        }

        if self.tonapi.timeout_ms == 0 {
            anyhow::bail!("tonapi.timeout_ms must be positive");
        }

        if let Err(reason) = self.storage.kdf.check() {
            anyhow::bail!("storage.kdf: {}", reason);
        }

        if self.storage.wallets_file.is_empty() {
            anyhow::bail!("storage.wallets_file cannot be empty");
        }

        let monitor = &self.monitor;
        if monitor.poll_interval_secs == 0 {
            anyhow::bail!("monitor.poll_interval_secs must be positive");
        }
        if monitor.page_size == 0 || monitor.page_size > 100 {
            anyhow::bail!("monitor.page_size must be between 1 and 100");
        }
        if monitor.retry_cap_secs == 0 || monitor.max_reconnect_delay_secs == 0 {
            anyhow::bail!("monitor retry caps must be positive");
        }
        if monitor.ping_interval_secs == 0 {
            anyhow::bail!("monitor.ping_interval_secs must be positive");
        }

        Ok(())
    }

    pub fn wallets_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.wallets_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.monitor.state_file)
    }

    pub fn events_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.monitor.events_file)
    }

    pub fn monitor_log_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.monitor.log_file)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.monitor.pid_file)
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked(&self) -> Value {
        json!({
            "network": self.network,
            "tonapi": {
                "base_url": mask_url(&self.tonapi.base_url(self.network)),
                "ws_url": mask_url(&self.tonapi.ws_url(self.network)),
                "api_key": if self.tonapi.api_key.is_empty() { "(not set)" } else { "***" },
                "timeout_ms": self.tonapi.timeout_ms,
                "max_retries": self.tonapi.max_retries,
            },
            "storage": {
                "data_dir": self.storage.data_dir.display().to_string(),
                "wallets_file": self.wallets_path().display().to_string(),
                "kdf": {
                    "memory_kib": self.storage.kdf.memory_kib,
                    "iterations": self.storage.kdf.iterations,
                    "parallelism": self.storage.kdf.parallelism,
                },
            },
            "monitor": {
                "mode": self.monitor.mode,
                "poll_interval_secs": self.monitor.poll_interval_secs,
                "page_size": self.monitor.page_size,
                "retry_cap_secs": self.monitor.retry_cap_secs,
                "state_file": self.state_path().display().to_string(),
                "events_file": self.events_path().display().to_string(),
                "log_file": self.monitor_log_path().display().to_string(),
            },
        })
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
