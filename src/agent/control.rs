//! Process control: PID file, single-instance lock, status/stop/restart.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running(i32),
    /// PID file left behind by a process that is gone.
    Stale(i32),
    Stopped,
}

/// PID file plus the advisory lock that makes `start` single-instance.
pub struct PidFile {
    path: PathBuf,
    lock: RwLock<File>,
}

/// Held for the lifetime of the running instance; removes the PID file on drop.
pub struct InstanceLock<'a> {
    _guard: RwLockWriteGuard<'a, File>,
    pid_path: &'a Path,
}

impl Drop for InstanceLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(self.pid_path) {
            warn!(path = %self.pid_path.display(), error = %e, "Failed to remove PID file");
        }
    }
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let lock_path = path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Take the instance lock and record our PID. Fails if another instance
    /// holds the lock.
    pub fn acquire(&mut self) -> Result<InstanceLock<'_>> {
        let guard = match self.lock.try_write() {
            Ok(guard) => guard,
            Err(_) => bail!("another instance is already running ({})", self.path.display()),
        };

        let pid = std::process::id();
        fs::write(&self.path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write PID file {}", self.path.display()))?;
        info!(pid, path = %self.path.display(), "Acquired single-instance lock");

        Ok(InstanceLock {
            _guard: guard,
            pid_path: &self.path,
        })
    }
}

pub fn read_pid(path: &Path) -> Result<Option<i32>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read PID file {}", path.display()))?;
    let pid = raw
        .trim()
        .parse::<i32>()
        .with_context(|| format!("Invalid PID file {}", path.display()))?;
    Ok(Some(pid))
}

#[cfg(unix)]
fn is_alive(pid: i32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None::<Signal>).is_ok()
}

#[cfg(not(unix))]
fn is_alive(_pid: i32) -> bool {
    true
}

pub fn status(pid_file: &Path) -> Result<ProcessStatus> {
    Ok(match read_pid(pid_file)? {
        None => ProcessStatus::Stopped,
        Some(pid) if is_alive(pid) => ProcessStatus::Running(pid),
        Some(pid) => ProcessStatus::Stale(pid),
    })
}

/// Send SIGTERM and wait up to `grace` for the process to exit.
/// Returns `false` when nothing was running.
pub async fn stop(pid_file: &Path, grace: Duration) -> Result<bool> {
    let pid = match status(pid_file)? {
        ProcessStatus::Stopped => return Ok(false),
        ProcessStatus::Stale(pid) => {
            warn!(pid, "Removing stale PID file");
            let _ = fs::remove_file(pid_file);
            return Ok(false);
        }
        ProcessStatus::Running(pid) => pid,
    };

    terminate(pid)?;
    info!(pid, "SIGTERM sent");

    let deadline = tokio::time::Instant::now() + grace;
    while is_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            bail!("process {pid} did not exit within {grace:?}");
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    info!(pid, "Process stopped");
    Ok(true)
}

#[cfg(unix)]
fn terminate(pid: i32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), Signal::SIGTERM).with_context(|| format!("Failed to signal process {pid}"))
}

#[cfg(not(unix))]
fn terminate(pid: i32) -> Result<()> {
    bail!("signals are not supported on this platform; stop process {pid} manually")
}

/// Stop the running instance, then spawn `start` detached with the same config.
pub async fn restart(pid_file: &Path, config_path: &Path, grace: Duration) -> Result<u32> {
    stop(pid_file, grace).await?;

    let exe = std::env::current_exe().context("Cannot locate current executable")?;
    let child = Command::new(exe)
        .arg("--config")
        .arg(config_path)
        .arg("start")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn new instance")?;

    info!(pid = child.id(), "New instance spawned");
    Ok(child.id())
}
