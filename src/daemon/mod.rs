// src/daemon/mod.rs
// Daemon lifecycle (§4.8): PID-file single-instance check, no-accounts
// exit, startup sequencing, graceful signal-driven shutdown, reconnect
// backoff. Grounded in the teacher's `watcher::mod` shutdown-channel
// idiom (a oneshot the signal handler fires and the run loop awaits),
// generalized from one file-watcher task to N per-account tasks plus
// the shared executor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::errors::{CoreError, CoreResult};

/// Reads the PID file and decides whether another instance already owns
/// it. A stale file (recorded PID no longer alive) is treated as free.
pub fn check_single_instance(pid_file: &Path) -> CoreResult<()> {
    if !pid_file.exists() {
        return Ok(());
    }

    let raw = std::fs::read_to_string(pid_file).map_err(|e| CoreError::General(e.to_string()))?;
    let Ok(recorded_pid) = raw.trim().parse::<u32>() else {
        return Ok(()); // corrupt file, treat as free
    };

    if pid_is_alive(recorded_pid) {
        return Err(CoreError::DaemonAlreadyRunning(recorded_pid));
    }
    Ok(())
}

pub fn write_pid_file(pid_file: &Path) -> CoreResult<()> {
    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::General(e.to_string()))?;
    }
    std::fs::write(pid_file, std::process::id().to_string()).map_err(|e| CoreError::General(e.to_string()))?;
    Ok(())
}

pub fn remove_pid_file(pid_file: &Path) {
    let _ = std::fs::remove_file(pid_file);
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still validates the pid exists and
    // is reachable by us - the standard liveness probe on Unix.
    unsafe { raw_kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(unix)]
const SIGTERM: i32 = 15;
#[cfg(unix)]
const SIGKILL: i32 = 9;

#[cfg(unix)]
unsafe fn raw_kill(pid: u32, sig: i32) -> i32 {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    kill(pid as i32, sig)
}

/// Reads and parses the pid file; `None` if missing or corrupt.
pub fn read_pid_file(pid_file: &Path) -> CoreResult<Option<u32>> {
    if !pid_file.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(pid_file).map_err(|e| CoreError::General(e.to_string()))?;
    Ok(raw.trim().parse::<u32>().ok())
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> CoreResult<()> {
    if unsafe { raw_kill(pid, SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(CoreError::DaemonSignalFailed(format!("SIGTERM to pid {pid} failed")))
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> CoreResult<()> {
    Err(CoreError::DaemonSignalFailed("signaling is only supported on unix".to_string()))
}

#[cfg(unix)]
fn send_kill(pid: u32) -> CoreResult<()> {
    if unsafe { raw_kill(pid, SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(CoreError::DaemonForceKillFailed(format!("SIGKILL to pid {pid} failed")))
    }
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) -> CoreResult<()> {
    Err(CoreError::DaemonForceKillFailed("signaling is only supported on unix".to_string()))
}

/// Drives the `daemon stop` verb (§4.8, §12): signal SIGTERM, poll
/// liveness up to `timeout`, escalate to SIGKILL once and poll a short
/// grace period, then report whichever terminal state was reached.
pub async fn stop_daemon(pid_file: &Path, timeout: Duration) -> CoreResult<()> {
    let Some(pid) = read_pid_file(pid_file)? else {
        return Err(CoreError::DaemonNotRunning);
    };
    if !pid_is_alive(pid) {
        remove_pid_file(pid_file);
        return Err(CoreError::DaemonNotRunning);
    }

    send_terminate(pid)?;

    let poll_interval = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if !pid_is_alive(pid) {
            return Ok(());
        }
        tokio::time::sleep(poll_interval).await;
        waited += poll_interval;
    }

    warn!(pid, "daemon did not exit before the shutdown timeout, sending SIGKILL");
    send_kill(pid)?;

    let grace = Duration::from_secs(2);
    let mut waited = Duration::ZERO;
    while waited < grace {
        if !pid_is_alive(pid) {
            // Graceful SIGTERM still timed out; SIGKILL is what actually
            // ended it, so the caller should see that escalation happened.
            remove_pid_file(pid_file);
            return Err(CoreError::DaemonShutdownTimeout);
        }
        tokio::time::sleep(poll_interval).await;
        waited += poll_interval;
    }

    Err(CoreError::DaemonForceKillFailed(format!("pid {pid} still alive after SIGKILL")))
}

/// Exponential backoff with a hard cap, used for remote-transport
/// reconnect attempts (§4.8). `attempt` is 1-based.
pub fn reconnect_delay(initial_delay_ms: u64, backoff_multiplier: f64, max_delay_ms: u64, attempt: u32) -> Duration {
    let scaled = (initial_delay_ms as f64) * backoff_multiplier.powi((attempt.max(1) - 1) as i32);
    let capped = scaled.min(max_delay_ms as f64);
    Duration::from_millis(capped.round() as u64)
}

/// Shared runtime context: the pieces a daemon process wires together at
/// startup and tears down at shutdown (§9 "global mutable state" becomes
/// a process-lifetime context struct rather than module globals).
pub struct DaemonRuntime {
    pub data_dir: PathBuf,
    pub store: crate::store::Store,
    pub executor: std::sync::Arc<crate::sync::JobExecutor>,
    pub shutdown_timeout: Duration,
}

impl DaemonRuntime {
    /// Runs `scheduler.initialize_for_startup()` for every enabled
    /// account up front, then drives the executor loop until a shutdown
    /// signal arrives, giving in-flight work up to `shutdown_timeout` to
    /// finish its current batch.
    pub async fn run(&self) -> Result<()> {
        let executor = self.executor.clone();
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();

        let signal_executor = executor.clone();
        ctrlc::set_handler(move || {
            info!("shutdown signal received");
            signal_executor.request_stop();
        })
        .map_err(|e| CoreError::DaemonSignalFailed(e.to_string()))?;

        let run_handle = tokio::spawn(async move {
            executor.run().await;
            let _ = stop_tx.send(());
        });

        tokio::select! {
            _ = &mut stop_rx => {}
            _ = tokio::time::sleep(self.shutdown_timeout) => {
                warn!("shutdown timed out waiting for executor to drain");
            }
        }

        if !run_handle.is_finished() {
            run_handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_caps_at_max() {
        let d1 = reconnect_delay(100, 2.0, 5000, 1);
        let d4 = reconnect_delay(100, 2.0, 5000, 4);
        let d10 = reconnect_delay(100, 2.0, 5000, 10);
        assert_eq!(d1, Duration::from_millis(100));
        assert_eq!(d4, Duration::from_millis(800));
        assert_eq!(d10, Duration::from_millis(5000));
    }

    #[test]
    fn single_instance_check_passes_when_no_pid_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        assert!(check_single_instance(&pid_file).is_ok());
    }

    #[test]
    fn stale_pid_file_is_treated_as_free() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        // PID 2^31-1-ish is exceedingly unlikely to be a live process.
        std::fs::write(&pid_file, "2147483647").unwrap();
        assert!(check_single_instance(&pid_file).is_ok());
    }

    #[test]
    fn own_pid_in_file_is_reported_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        std::fs::write(&pid_file, std::process::id().to_string()).unwrap();
        assert!(matches!(check_single_instance(&pid_file), Err(CoreError::DaemonAlreadyRunning(_))));
    }

    #[tokio::test]
    async fn stop_daemon_with_no_pid_file_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        let err = stop_daemon(&pid_file, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CoreError::DaemonNotRunning));
    }

    #[tokio::test]
    async fn stop_daemon_with_stale_pid_reports_not_running_and_clears_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        std::fs::write(&pid_file, "2147483647").unwrap();
        let err = stop_daemon(&pid_file, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CoreError::DaemonNotRunning));
        assert!(!pid_file.exists());
    }
}
