use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Exclusive hold on the processed history for one read-merge-write cycle.
///
/// The lock file holds the owner's PID and is put in place with no-clobber
/// semantics, so it never exists without one. It is removed when the guard
/// drops. A lock whose owner is no longer running (a killed or crashed run)
/// is reclaimed on the next acquire.
#[derive(Debug)]
pub struct HistoryLock {
    path: PathBuf,
}

/// Who, if anyone, still holds an existing lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holder {
    Alive(u32),
    Dead(u32),
    Unknown,
}

impl HistoryLock {
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        let write_failure = |path: &Path, e: std::io::Error| PipelineError::WriteFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let dir = match lock_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| write_failure(dir, e))?;

        let pid = std::process::id();
        // one reclaim of a stale lock, then a second attempt
        for attempt in 0..2 {
            let mut tmp = Builder::new()
                .prefix(".lock")
                .tempfile_in(dir)
                .map_err(|e| write_failure(lock_path, e))?;
            writeln!(tmp, "{}", pid)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| write_failure(lock_path, e))?;

            match tmp.persist_noclobber(lock_path) {
                Ok(_) => {
                    debug!(lock = %lock_path.display(), pid, "acquired history lock");
                    return Ok(Self {
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    let holder = read_holder(lock_path);
                    match holder {
                        Holder::Alive(owner) => {
                            warn!(lock = %lock_path.display(), owner, "history is locked by another run");
                            return Err(PipelineError::HistoryLocked {
                                path: lock_path.to_path_buf(),
                            });
                        }
                        Holder::Dead(_) | Holder::Unknown if attempt == 0 => {
                            warn!(lock = %lock_path.display(), ?holder, "reclaiming stale history lock");
                            match fs::remove_file(lock_path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == ErrorKind::NotFound => {}
                                Err(e) => return Err(write_failure(lock_path, e)),
                            }
                        }
                        _ => {
                            return Err(PipelineError::HistoryLocked {
                                path: lock_path.to_path_buf(),
                            })
                        }
                    }
                }
                Err(e) => return Err(write_failure(lock_path, e.error)),
            }
        }
        Err(PipelineError::HistoryLocked {
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), "failed to release history lock: {}", e);
        }
    }
}

fn read_holder(lock_path: &Path) -> Holder {
    let owner = match fs::read_to_string(lock_path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        Some(pid) => pid,
        None => return Holder::Unknown,
    };
    if owner == std::process::id() || process_is_running(owner) {
        Holder::Alive(owner)
    } else {
        Holder::Dead(owner)
    }
}

fn process_is_running(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // above the kernel's PID_MAX_LIMIT, so never a live process
    const DEAD_PID: u32 = 1 << 30;

    #[test]
    fn second_holder_is_refused_until_release() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let lock_path = tmp.path().join("processed").join("processed_data.csv.lock");

        let first = HistoryLock::acquire(&lock_path)?;
        assert!(lock_path.exists());
        assert_eq!(
            fs::read_to_string(&lock_path)?.trim(),
            std::process::id().to_string()
        );
        assert!(matches!(
            HistoryLock::acquire(&lock_path),
            Err(PipelineError::HistoryLocked { .. })
        ));

        drop(first);
        assert!(!lock_path.exists());
        let again = HistoryLock::acquire(&lock_path)?;
        assert_eq!(again.path(), lock_path.as_path());
        Ok(())
    }

    #[test]
    fn lock_left_by_a_dead_run_is_reclaimed() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let lock_path = tmp.path().join("processed_data.csv.lock");
        fs::write(&lock_path, format!("{}\n", DEAD_PID))?;
        assert_eq!(read_holder(&lock_path), Holder::Dead(DEAD_PID));

        let lock = HistoryLock::acquire(&lock_path)?;
        assert_eq!(
            fs::read_to_string(lock.path())?.trim(),
            std::process::id().to_string()
        );
        drop(lock);
        assert!(!lock_path.exists());
        Ok(())
    }

    #[test]
    fn lock_without_an_owner_is_reclaimed() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let lock_path = tmp.path().join("processed_data.csv.lock");
        fs::write(&lock_path, "")?;
        assert_eq!(read_holder(&lock_path), Holder::Unknown);

        let _lock = HistoryLock::acquire(&lock_path)?;
        assert!(lock_path.exists());
        Ok(())
    }
}
