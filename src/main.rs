//! ton-skill - encrypted TON wallet store and transaction monitor
//!
//! Every command prints one JSON envelope on stdout and exits 0 on success,
//! 1 on failure. Diagnostics go to stderr.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ton_skill::cli::{commands, Context};
use ton_skill::config::Config;
use ton_skill::error::Error;
use ton_skill::output::Envelope;
use ton_skill::ton::WalletVersion;

/// TON wallet store and transaction monitor
#[derive(Parser)]
#[command(name = "ton-skill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: <data_dir>/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Wallet store password
    #[arg(
        short,
        long,
        global = true,
        env = "WALLET_PASSWORD",
        hide_env_values = true
    )]
    password: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet management commands
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Prepared message tools
    Tx {
        #[command(subcommand)]
        action: TxAction,
    },

    /// Transaction monitor
    Monitor {
        #[command(subcommand)]
        action: MonitorAction,
    },

    /// Validate an address and show all its forms
    Address {
        /// Raw (0:<hex>) or user-friendly address
        address: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Generate a new wallet
    Create {
        /// Wallet label (default: wallet_<n>)
        #[arg(long)]
        label: Option<String>,

        /// Wallet contract version: v3r2, v4r2
        #[arg(long, default_value = "v4r2")]
        version: WalletVersion,
    },

    /// Import a wallet from its 24-word mnemonic
    Import {
        /// Wallet label (default: imported_<n>)
        #[arg(long)]
        label: Option<String>,

        /// Space-separated mnemonic (prompted for when omitted)
        #[arg(long)]
        mnemonic: Option<String>,

        /// Wallet contract version: v3r2, v4r2
        #[arg(long, default_value = "v4r2")]
        version: WalletVersion,
    },

    /// List stored wallets
    List {
        /// Fetch the TON balance of each wallet
        #[arg(long)]
        balances: bool,
    },

    /// Show the balance of a wallet label or any address
    Balance {
        /// Label or address
        wallet: String,

        /// Include jettons and USD values
        #[arg(long)]
        full: bool,
    },

    /// Reveal the mnemonic of a wallet
    Export { label: String },

    /// Remove a wallet from the store
    Remove {
        label: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Rename a wallet
    Label { old: String, new: String },

    /// Sign a hex payload with a wallet key
    Sign {
        label: String,

        /// Hex-encoded bytes to sign
        #[arg(long)]
        payload: String,
    },
}

#[derive(Subcommand)]
enum TxAction {
    /// Estimate fees of a signed message without sending it
    Emulate {
        /// Base64 message BOC
        #[arg(long)]
        boc: String,
    },

    /// Send a signed message to the network
    Broadcast {
        /// Base64 message BOC
        #[arg(long)]
        boc: String,
    },
}

#[derive(Subcommand)]
enum MonitorAction {
    /// Start watching wallets
    Start {
        /// Wallet label or address (repeatable; default: all stored wallets)
        #[arg(long = "wallet")]
        wallets: Vec<String>,

        /// Poll instead of streaming
        #[arg(long)]
        polling: bool,

        /// Run in the background
        #[arg(long)]
        daemon: bool,

        #[arg(long, hide = true)]
        detached: bool,
    },

    /// Show monitor state
    Status,

    /// Stop the background monitor
    Stop,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (secrets masked)
    Show,
}

/// Where diagnostics go
enum LogTarget<'a> {
    Stderr,
    /// Foreground monitor: stderr plus the monitor log file
    StderrAndFile(&'a Path),
    /// Background child: its stderr already is the monitor log
    Detached,
}

fn init_logging(verbose: bool, target: LogTarget<'_>) {
    let directive = if verbose { "ton_skill=debug" } else { "ton_skill=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let ansi = !matches!(target, LogTarget::Detached);
    let file = match target {
        LogTarget::StderrAndFile(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            OpenOptions::new().create(true).append(true).open(path).ok()
        }
        LogTarget::Stderr | LogTarget::Detached => None,
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(ansi);
    let file_layer = file.map(|f| {
        fmt::layer()
            .with_writer(Mutex::new(f))
            .with_target(true)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

/// Parse arguments; usage errors become a JSON failure, help and version
/// print as usual
fn parse_cli<I, T>(args: I) -> Result<Cli, Envelope>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
        _ => {
            let rendered = e.render().to_string();
            let reason = rendered
                .lines()
                .take_while(|l| !l.starts_with("Usage:"))
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            let reason = reason.trim_start_matches("error:").trim();
            Envelope::failure(&Error::InvalidInput(reason.to_string()))
        }
    })
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(envelope) => {
            println!("{}", envelope.render());
            std::process::exit(envelope.exit_code());
        }
    };

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging(cli.verbose, LogTarget::Stderr);
            error!("Failed to load configuration: {:#}", e);
            let envelope = Envelope::message(format!("Failed to load configuration: {:#}", e));
            println!("{}", envelope.render());
            std::process::exit(envelope.exit_code());
        }
    };

    let monitor_log = config.monitor_log_path();
    let target = match &cli.command {
        Commands::Monitor {
            action: MonitorAction::Start { detached: true, .. },
        } => LogTarget::Detached,
        Commands::Monitor {
            action: MonitorAction::Start { daemon: false, .. },
        } => LogTarget::StderrAndFile(&monitor_log),
        _ => LogTarget::Stderr,
    };
    init_logging(cli.verbose, target);

    let ctx = Context::new(config, cli.password);

    // Execute command
    let result = match cli.command {
        Commands::Wallet { action } => match action {
            WalletAction::Create { label, version } => {
                commands::wallet_create(&ctx, label.as_deref(), version)
            }
            WalletAction::Import {
                label,
                mnemonic,
                version,
            } => commands::wallet_import(&ctx, label.as_deref(), mnemonic, version),
            WalletAction::List { balances } => commands::wallet_list(&ctx, balances).await,
            WalletAction::Balance { wallet, full } => {
                commands::wallet_balance(&ctx, &wallet, full).await
            }
            WalletAction::Export { label } => commands::wallet_export(&ctx, &label),
            WalletAction::Remove { label, force } => commands::wallet_remove(&ctx, &label, force),
            WalletAction::Label { old, new } => commands::wallet_label(&ctx, &old, &new),
            WalletAction::Sign { label, payload } => {
                commands::wallet_sign(&ctx, &label, &payload)
            }
        },
        Commands::Tx { action } => match action {
            TxAction::Emulate { boc } => commands::tx_emulate(&ctx, &boc).await,
            TxAction::Broadcast { boc } => commands::tx_broadcast(&ctx, &boc).await,
        },
        Commands::Monitor { action } => match action {
            MonitorAction::Start {
                wallets,
                polling,
                daemon,
                detached,
            } => commands::monitor_start(&ctx, &wallets, polling, daemon, detached).await,
            MonitorAction::Status => commands::monitor_status(&ctx),
            MonitorAction::Stop => commands::monitor_stop(&ctx).await,
        },
        Commands::Address { address } => commands::address_info(&address),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&ctx),
        },
    };

    let envelope = Envelope::from(result);
    if let Some(err) = &envelope.error {
        error!("Command failed: {}", err);
    }
    println!("{}", envelope.render());
    std::process::exit(envelope.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_become_envelopes() {
        let envelope = parse_cli(["ton-skill", "wallet", "frobnicate"]).err().unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.exit_code(), 1);
        assert_eq!(envelope.code, Some("invalid_input"));
        assert!(envelope.error.unwrap().contains("frobnicate"));

        let envelope = parse_cli(["ton-skill", "wallet", "sign", "main"]).err().unwrap();
        assert!(envelope.error.unwrap().contains("--payload"));
    }

    #[test]
    fn test_valid_arguments_parse() {
        let cli = parse_cli(["ton-skill", "monitor", "start", "--wallet", "main", "--polling"])
            .ok()
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Monitor {
                action: MonitorAction::Start { polling: true, .. }
            }
        ));
    }
}
