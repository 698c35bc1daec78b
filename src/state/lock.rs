//! Advisory per-run lock.
//!
//! A run directory is exclusive per run_id: two processes must never advance
//! or resume the same run concurrently. The lock is a pid file created with
//! `create_new`; contention against a live process is a reported error, while
//! a lock left behind by a dead process is reclaimed.
use super::RunPaths;
use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Guard that removes the lock file when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the advisory lock for a run, reclaiming stale locks once.
pub fn acquire(paths: &RunPaths) -> Result<RunLock> {
    let lock_path = paths.lock_path();
    match try_acquire(&lock_path)? {
        Acquired::Lock(lock) => Ok(lock),
        Acquired::HeldBy(pid) => Err(anyhow!(
            "another process (pid {pid}) holds the lock at {}; retry after it finishes",
            lock_path.display()
        )),
        Acquired::Stale => {
            tracing::warn!(path = %lock_path.display(), "reclaiming stale run lock");
            fs::remove_file(&lock_path)
                .with_context(|| format!("remove stale lock {}", lock_path.display()))?;
            match try_acquire(&lock_path)? {
                Acquired::Lock(lock) => Ok(lock),
                Acquired::HeldBy(pid) => Err(anyhow!(
                    "another process (pid {pid}) holds the lock at {}; retry after it finishes",
                    lock_path.display()
                )),
                Acquired::Stale => Err(anyhow!(
                    "could not reclaim lock at {}; remove it if no wrep process is running",
                    lock_path.display()
                )),
            }
        }
    }
}

enum Acquired {
    Lock(RunLock),
    HeldBy(u32),
    Stale,
}

fn try_acquire(lock_path: &Path) -> Result<Acquired> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())
                .with_context(|| format!("write {}", lock_path.display()))?;
            Ok(Acquired::Lock(RunLock {
                path: lock_path.to_path_buf(),
            }))
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let contents = fs::read_to_string(lock_path)
                .with_context(|| format!("read lock {}", lock_path.display()))?;
            match contents.trim().parse::<u32>() {
                Ok(pid) if is_process_running(pid) => Ok(Acquired::HeldBy(pid)),
                Ok(_) => Ok(Acquired::Stale),
                Err(_) => Ok(Acquired::Stale),
            }
        }
        Err(err) => {
            Err(anyhow::Error::new(err).context(format!("create lock {}", lock_path.display())))
        }
    }
}

fn is_process_running(pid: u32) -> bool {
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
