//! Durable copy of the previous poll cycle.
//!
//! The snapshot lives in a JSON file. Writes go to a temporary sibling
//! that is fsynced and renamed over the target, so a crash mid-write leaves
//! the old snapshot readable. An advisory lock on `<file>.lock` keeps two
//! cycles from writing at the same time.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;

use crate::models::Snapshot;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("cannot read snapshot '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write snapshot '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot '{path}' has unsupported format version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("snapshot '{0}' is locked by another poll cycle (remove the lock file if no cycle is running)")]
    Locked(PathBuf),
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
    printers: Snapshot,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous snapshot, `None` when no cycle has saved one yet.
    pub fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no previous snapshot");
                return Ok(None);
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: SnapshotFile = serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        if file.version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                path: self.path.clone(),
                version: file.version,
            });
        }

        debug!(path = %self.path.display(), saved_at = %file.saved_at, printers = file.printers.len(),
               "loaded previous snapshot");
        Ok(Some(file.printers))
    }

    /// Replaces the stored snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let write_err = |source: std::io::Error| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        let file = SnapshotFile {
            version: FORMAT_VERSION,
            saved_at: OffsetDateTime::now_utc(),
            printers: snapshot.clone(),
        };
        let content = serde_json::to_vec_pretty(&file).map_err(|e| write_err(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp = self.sibling("tmp");
        let mut out = File::create(&tmp).map_err(write_err)?;
        out.write_all(&content).map_err(write_err)?;
        out.sync_all().map_err(write_err)?;
        drop(out);

        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            write_err(e)
        })?;

        debug!(path = %self.path.display(), printers = snapshot.len(), "snapshot saved");
        Ok(())
    }

    /// Exclusive right to run a cycle against this snapshot.
    ///
    /// Advisory OS lock on `<file>.lock`, released on drop or when the
    /// process dies. The file itself stays behind and only records the
    /// holder's pid.
    pub fn lock(&self) -> Result<StoreLock, PersistenceError> {
        let path = self.sibling("lock");
        let write_err = |source: std::io::Error| PersistenceError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(write_err)?;

        if !try_lock_exclusive(&file).map_err(write_err)? {
            return Err(PersistenceError::Locked(path.clone()));
        }

        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(write_err)?;
        debug!(path = %path.display(), "snapshot lock taken");
        Ok(StoreLock { _file: file })
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}

#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

/// `Ok(false)` when another holder has the lock.
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(fs::TryLockError::WouldBlock) => Ok(false),
        Err(fs::TryLockError::Error(e)) => Err(e),
    }
}
