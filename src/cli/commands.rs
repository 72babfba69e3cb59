//! CLI command implementations
//!
//! Each handler returns the `data` part of the JSON envelope; `main` renders
//! it and picks the exit code.

use std::io::IsTerminal;
use std::sync::Arc;

use dialoguer::{Confirm, Password};
use serde_json::{json, Value};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::chain::{ChainQuery, TonApiClient};
use crate::config::{Config, MonitorMode};
use crate::error::{Error, Result};
use crate::monitor::daemon::{self, PidGuard};
use crate::monitor::{
    resolve_wallets, Monitor, MonitorSettings, StreamConnector, TonApiStreamConnector,
};
use crate::ton::{Address, Amount, FriendlyFlags, SecretPhrase, TonWalletKit, WalletVersion};
use crate::wallet::{self, BalanceTarget, WalletStore};

const MNEMONIC_WARNING: &str =
    "Anyone with these words controls the wallet. Write them down offline and never share them.";

/// Everything a command needs: configuration and the password source
pub struct Context {
    pub config: Config,
    password: Option<Zeroizing<String>>,
}

impl Context {
    pub fn new(config: Config, password: Option<String>) -> Self {
        Self {
            config,
            password: password.map(Zeroizing::new),
        }
    }

    pub fn store(&self) -> WalletStore<TonWalletKit> {
        WalletStore::new(
            self.config.wallets_path(),
            self.config.storage.kdf,
            TonWalletKit::new(self.config.network.is_testnet()),
        )
    }

    pub fn chain(&self) -> Result<TonApiClient> {
        TonApiClient::new(&self.config.tonapi, self.config.network)
    }

    /// Password from the flag or environment, else an interactive prompt
    pub fn password(&self) -> Result<Zeroizing<String>> {
        self.password_with(false)
    }

    /// Like [`password`](Self::password), confirming a password that will
    /// create the store
    fn new_password(&self) -> Result<Zeroizing<String>> {
        self.password_with(!self.store().exists())
    }

    fn password_with(&self, confirm: bool) -> Result<Zeroizing<String>> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        if !std::io::stdin().is_terminal() {
            return Err(Error::InvalidInput(
                "No password given: pass --password or set WALLET_PASSWORD".to_string(),
            ));
        }

        let mut prompt = Password::new().with_prompt("Wallet password");
        if confirm {
            prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
        }
        let password = prompt
            .interact()
            .map_err(|e| Error::InvalidInput(format!("Password prompt failed: {}", e)))?;
        Ok(Zeroizing::new(password))
    }
}

fn words(phrase: &SecretPhrase) -> Vec<&str> {
    phrase.words().collect()
}

/// Create a new wallet and show its mnemonic once
pub fn wallet_create(ctx: &Context, label: Option<&str>, version: WalletVersion) -> Result<Value> {
    let password = ctx.new_password()?;
    let created = ctx.store().create(&password, label, version)?;

    Ok(json!({
        "wallet": created.wallet,
        "mnemonic": words(&created.mnemonic),
        "warning": MNEMONIC_WARNING,
    }))
}

pub fn wallet_import(
    ctx: &Context,
    label: Option<&str>,
    mnemonic: Option<String>,
    version: WalletVersion,
) -> Result<Value> {
    let mnemonic = match mnemonic {
        Some(m) => Zeroizing::new(m),
        None if std::io::stdin().is_terminal() => Zeroizing::new(
            Password::new()
                .with_prompt("Mnemonic (24 words)")
                .interact()
                .map_err(|e| Error::InvalidInput(format!("Mnemonic prompt failed: {}", e)))?,
        ),
        None => {
            return Err(Error::InvalidInput(
                "No mnemonic given: pass --mnemonic".to_string(),
            ))
        }
    };
    let phrase = SecretPhrase::parse(&mnemonic);

    let password = ctx.new_password()?;
    let wallet = ctx.store().import(&password, label, &phrase, version)?;
    Ok(json!({ "wallet": wallet }))
}

pub async fn wallet_list(ctx: &Context, balances: bool) -> Result<Value> {
    let store = ctx.store();
    if !store.exists() {
        return Ok(json!({ "wallets": [], "count": 0 }));
    }

    let password = ctx.password()?;
    let wallets = store.list(&password)?;
    let count = wallets.len();

    if balances {
        let chain = ctx.chain()?;
        let entries = wallet::with_balances(&chain, wallets).await;
        return Ok(json!({ "wallets": entries, "count": count }));
    }
    Ok(json!({ "wallets": wallets, "count": count }))
}

pub async fn wallet_balance(ctx: &Context, wallet: &str, full: bool) -> Result<Value> {
    let store = ctx.store();
    let target = BalanceTarget::parse(wallet);
    let password = if target.needs_password() && store.exists() {
        Some(ctx.password()?)
    } else {
        None
    };

    let chain = ctx.chain()?;
    let snapshot = wallet::balance(
        &store,
        &chain,
        &target,
        password.as_ref().map(|p| p.as_str()),
        full,
    )
    .await?;
    Ok(serde_json::to_value(snapshot)?)
}

pub fn wallet_export(ctx: &Context, label: &str) -> Result<Value> {
    let password = ctx.password()?;
    let (wallet, phrase) = ctx.store().export(&password, label)?;
    warn!("Mnemonic of {} exported", wallet.label);

    Ok(json!({
        "wallet": wallet,
        "mnemonic": words(&phrase),
        "warning": MNEMONIC_WARNING,
    }))
}

pub fn wallet_remove(ctx: &Context, label: &str, force: bool) -> Result<Value> {
    let password = ctx.password()?;
    let store = ctx.store();

    if !force {
        if !std::io::stdin().is_terminal() {
            return Err(Error::InvalidInput(
                "Refusing to remove without confirmation: pass --force".to_string(),
            ));
        }
        // Fail on a wrong password or unknown label before asking
        let wallet = store.find(&password, label)?;
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Remove wallet '{}' ({})? Funds are lost without a mnemonic backup",
                wallet.label, wallet.address
            ))
            .default(false)
            .interact()
            .map_err(|e| Error::InvalidInput(format!("Confirmation prompt failed: {}", e)))?;
        if !confirmed {
            return Err(Error::InvalidInput("Removal cancelled".to_string()));
        }
    }

    let removed = store.remove(&password, label)?;
    Ok(json!({ "removed": removed }))
}

pub fn wallet_label(ctx: &Context, old: &str, new: &str) -> Result<Value> {
    let password = ctx.password()?;
    let wallet = ctx.store().relabel(&password, old, new)?;
    Ok(json!({ "wallet": wallet, "previous_label": old }))
}

pub fn wallet_sign(ctx: &Context, label: &str, payload_hex: &str) -> Result<Value> {
    let payload = hex::decode(payload_hex.trim().trim_start_matches("0x"))
        .map_err(|e| Error::InvalidInput(format!("Payload is not valid hex: {}", e)))?;

    let password = ctx.password()?;
    let signed = ctx.store().sign(&password, label, &payload)?;
    Ok(serde_json::to_value(signed)?)
}

/// Dry-run a signed message and report the estimated fee
pub async fn tx_emulate(ctx: &Context, boc: &str) -> Result<Value> {
    let chain = ctx.chain()?;
    let emulation = chain.emulate(boc.trim()).await?;

    Ok(json!({
        "fee": Amount::ton(emulation.fee()),
        "event": emulation.event,
        "risk": emulation.risk,
    }))
}

pub async fn tx_broadcast(ctx: &Context, boc: &str) -> Result<Value> {
    let chain = ctx.chain()?;
    chain.send_message(boc.trim()).await?;
    info!("Message broadcast");
    Ok(json!({ "sent": true }))
}

/// Validate an address and show it in every form
pub fn address_info(input: &str) -> Result<Value> {
    let address = Address::parse(input)?;
    let form = |bounceable, testnet| {
        address.to_friendly(FriendlyFlags {
            bounceable,
            testnet,
        })
    };

    Ok(json!({
        "valid": true,
        "raw": address.to_raw(),
        "workchain": address.workchain,
        "bounceable": form(true, false),
        "non_bounceable": form(false, false),
        "testnet": {
            "bounceable": form(true, true),
            "non_bounceable": form(false, true),
        },
    }))
}

pub fn config_show(ctx: &Context) -> Result<Value> {
    Ok(ctx.config.masked())
}

/// Run the monitor in the foreground, or re-spawn it in the background
pub async fn monitor_start(
    ctx: &Context,
    wallets: &[String],
    polling: bool,
    background: bool,
    detached: bool,
) -> Result<Value> {
    let config = &ctx.config;
    let store = ctx.store();

    // Resolve up front so a bad password or label fails in the terminal
    let password = if store.exists() {
        Some(ctx.password()?)
    } else {
        None
    };
    let password = password.as_ref().map(|p| p.as_str());
    let resolved = resolve_wallets(&store, password, wallets)?;

    if background {
        let pid_path = config.pid_path();
        if let Some(pid) = daemon::read_pid(&pid_path).filter(|p| daemon::is_process_running(*p)) {
            return Err(Error::InvalidInput(format!(
                "Monitor already running (pid {})",
                pid
            )));
        }

        let log_path = config.monitor_log_path();
        let pid = daemon::spawn_detached(
            &log_path,
            daemon::child_args(std::env::args_os().skip(1)),
            password,
        )?;
        return Ok(json!({
            "pid": pid,
            "log": log_path,
            "events": config.events_path(),
            "wallets": resolved,
        }));
    }

    let _pid = PidGuard::acquire(&config.pid_path())?;

    let mut settings = MonitorSettings::from_config(config);
    if polling {
        settings.mode = MonitorMode::Polling;
    }
    settings.echo = !detached;

    let chain: Arc<dyn ChainQuery> = Arc::new(ctx.chain()?);
    let connector: Arc<dyn StreamConnector> = Arc::new(TonApiStreamConnector::from_config(config));
    let monitor = Monitor::new(chain, Some(connector), settings, resolved);

    let summary = monitor.run(daemon::cancel_on_shutdown()).await?;
    Ok(json!({ "stopped": true, "summary": summary }))
}

pub fn monitor_status(ctx: &Context) -> Result<Value> {
    let status = daemon::status(&ctx.config.pid_path(), &ctx.config.state_path())?;
    Ok(serde_json::to_value(status)?)
}

pub async fn monitor_stop(ctx: &Context) -> Result<Value> {
    match daemon::stop(&ctx.config.pid_path()).await? {
        Some(pid) => Ok(json!({ "stopped": true, "pid": pid })),
        None => Ok(json!({ "stopped": false, "message": "Monitor is not running" })),
    }
}
