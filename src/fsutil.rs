//! Crash-safe file replacement and advisory locking
//!
//! Every persisted file (wallet store, monitor state) is replaced by writing a
//! sibling temp file, syncing it and renaming it over the target, so a crash
//! mid-write leaves either the old or the new content, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Temp file next to `path` so the final rename stays on one filesystem
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

fn open_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Sync the directory entry so the rename itself survives a crash
fn sync_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Atomically replace `path` with `data` (owner-only permissions on unix)
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = open_private(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    sync_dir(path);
    debug!("Replaced {} ({} bytes)", path.display(), data.len());
    Ok(())
}

/// Async variant used by the monitor loop
pub async fn atomic_write_async(path: &Path, data: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write(&path, &data))
        .await
        .map_err(|e| crate::error::Error::Internal(format!("Write task failed: {}", e)))?
}

/// Advisory lock held on a sidecar `.lock` file; released on drop
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn open(target: &Path) -> Result<(File, PathBuf)> {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        let path = target.with_file_name(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok((file, path))
    }

    /// Block until no other process holds any lock on `target`
    pub fn exclusive(target: &Path) -> Result<Self> {
        let (file, path) = Self::open(target)?;
        file.lock_exclusive()?;
        Ok(Self { file, path })
    }

    /// Block until no other process holds an exclusive lock on `target`
    pub fn shared(target: &Path) -> Result<Self> {
        let (file, path) = Self::open(target)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.enc");
        atomic_write(&path, b"secret").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_lock_sidecar_path() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("wallets.enc");

        let lock = FileLock::exclusive(&target).unwrap();
        assert_eq!(lock.path(), dir.path().join("wallets.enc.lock"));
        drop(lock);

        // Re-acquirable after release
        let _shared = FileLock::shared(&target).unwrap();
        let _shared_again = FileLock::shared(&target).unwrap();
    }
}
