//! Background monitor process: pid file, detached spawn, status and stop

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fsutil::atomic_write;

use super::state::{Marker, MonitorState, WatchedWallet};

/// Environment variable carrying the store password to the detached child
pub const PASSWORD_ENV: &str = "WALLET_PASSWORD";

/// Hidden flag marking the re-spawned background process
pub const DETACHED_FLAG: &str = "--detached";

const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

pub fn read_pid(pid_file: &Path) -> Option<u32> {
    fs::read_to_string(pid_file)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        // Sending signal 0 checks if process exists
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

fn terminate(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|e| Error::Io(format!("Failed to signal pid {}: {}", pid, e)))
    }

    #[cfg(not(unix))]
    {
        Err(Error::Internal(format!(
            "Stopping pid {} is only supported on unix",
            pid
        )))
    }
}

/// Pid file owned by the running monitor; removed on drop
#[derive(Debug)]
pub struct PidGuard {
    path: PathBuf,
}

impl PidGuard {
    /// Claim the pid file. Fails if another live monitor holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let own = std::process::id();
        if let Some(pid) = read_pid(path) {
            if pid != own && is_process_running(pid) {
                return Err(Error::InvalidInput(format!(
                    "Monitor already running (pid {})",
                    pid
                )));
            }
            debug!("Replacing stale pid file {}", path.display());
        }

        atomic_write(path, own.to_string().as_bytes())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        if read_pid(&self.path) == Some(std::process::id()) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Arguments for the background child: same command, minus `--daemon` and any
/// password (passed through the environment instead), plus the detached flag
pub fn child_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut out = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy();
        if text == "--daemon" || text == DETACHED_FLAG {
            continue;
        }
        if text == "--password" || text == "-p" {
            args.next();
            continue;
        }
        if text.starts_with("--password=") {
            continue;
        }
        out.push(arg);
    }
    out.push(OsString::from(DETACHED_FLAG));
    out
}

/// Re-launch the current executable in the background.
///
/// Output of the child is appended to `log_path`. Returns the child pid.
pub fn spawn_detached(
    log_path: &Path,
    args: Vec<OsString>,
    password: Option<&str>,
) -> Result<u32> {
    let exe = std::env::current_exe()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let mut cmd = Command::new(exe);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file));
    if let Some(password) = password {
        cmd.env(PASSWORD_ENV, password);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Leave the terminal's process group so its signals miss the child
        cmd.process_group(0);
    }

    let child = cmd
        .spawn()
        .map_err(|e| Error::Io(format!("Failed to spawn background monitor: {}", e)))?;
    info!("Background monitor started (pid {})", child.id());
    Ok(child.id())
}

/// Stop the background monitor. `None` when none was running.
pub async fn stop(pid_path: &Path) -> Result<Option<u32>> {
    let Some(pid) = read_pid(pid_path) else {
        return Ok(None);
    };
    if !is_process_running(pid) {
        warn!("Removing stale pid file for pid {}", pid);
        let _ = fs::remove_file(pid_path);
        return Ok(None);
    }

    terminate(pid)?;
    let deadline = Instant::now() + STOP_TIMEOUT;
    while Instant::now() < deadline {
        if !is_process_running(pid) {
            let _ = fs::remove_file(pid_path);
            info!("Monitor (pid {}) stopped", pid);
            return Ok(Some(pid));
        }
        tokio::time::sleep(STOP_POLL).await;
    }

    Err(Error::Internal(format!(
        "Monitor (pid {}) did not exit within {}s",
        pid,
        STOP_TIMEOUT.as_secs()
    )))
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub mode: String,
    pub started_at: Option<DateTime<Utc>>,
    pub wallets: Vec<WatchedWallet>,
    pub markers: BTreeMap<String, Marker>,
}

pub fn status(pid_path: &Path, state_path: &Path) -> Result<MonitorStatus> {
    let state = MonitorState::load(state_path)?;
    let pid = read_pid(pid_path).filter(|pid| is_process_running(*pid));
    let running = pid.is_some();

    Ok(MonitorStatus {
        running,
        pid,
        mode: match (&state.mode, running) {
            (Some(mode), true) => mode.clone(),
            _ => "stopped".to_string(),
        },
        started_at: if running { state.started_at } else { None },
        wallets: state.wallets,
        markers: state.last_seen,
    })
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// Token cancelled by the first shutdown signal
pub fn cancel_on_shutdown() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });
    token
}
