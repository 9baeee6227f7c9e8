#![allow(unsafe_code)]
//! Process-based backend: containers are host processes tracked by PID,
//! with their resources laid out under [`CorralPaths`].

use std::io::{self, ErrorKind};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use corral_common::error::ResultExt;
use corral_common::{CorralError, CorralPaths, CorralResult};

use super::OciRuntime;
use crate::container::{ContainerConfig, ContainerState, ContainerStatus};

/// How often to re-check a process that was asked to stop.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for a process after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Whether `pid` names a live (non-zombie) process.
fn process_alive(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };

    // The state field follows the parenthesised command name, which may
    // itself contain parentheses.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| !matches!(state, 'Z' | 'X' | 'x'))
}

/// Send `signal` to `pid`. A process that is already gone is not an error.
fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;

    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(raw, signal) } == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM, wait up to `timeout`, then SIGKILL.
fn terminate(pid: u32, timeout: Duration) -> CorralResult<()> {
    if !timeout.is_zero() {
        send_signal(pid, libc::SIGTERM)?;
        if wait_for_exit(pid, timeout) {
            return Ok(());
        }
        tracing::warn!(
            pid,
            timeout_secs = timeout.as_secs(),
            "Process ignored SIGTERM, sending SIGKILL"
        );
    }

    send_signal(pid, libc::SIGKILL)?;
    if wait_for_exit(pid, KILL_GRACE) {
        Ok(())
    } else {
        Err(CorralError::Internal {
            message: format!("process {pid} did not exit after SIGKILL"),
        })
    }
}

/// Remove a directory tree, treating absence as success.
fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Backend driving containers as host processes.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    paths: CorralPaths,
}

impl ProcessRuntime {
    /// Create a backend rooted at `paths`.
    pub const fn new(paths: CorralPaths) -> Self {
        Self { paths }
    }

    /// Paths used for container resources.
    #[must_use]
    pub const fn paths(&self) -> &CorralPaths {
        &self.paths
    }
}

impl OciRuntime for ProcessRuntime {
    fn name(&self) -> &str {
        "process"
    }

    fn sync(&self, ctr: &ContainerConfig, state: &mut ContainerState) -> CorralResult<()> {
        match (state.status, state.pid) {
            (
                ContainerStatus::Running | ContainerStatus::Paused | ContainerStatus::Created,
                Some(pid),
            ) => {
                if !process_alive(pid) {
                    tracing::debug!(container_id = %ctr.id, pid, "Main process has exited");
                    state.set_exited(None);
                }
            }
            (ContainerStatus::Running | ContainerStatus::Paused, None) => {
                tracing::warn!(
                    container_id = %ctr.id,
                    status = %state.status,
                    "Container has no main process, marking state unknown"
                );
                state.set_unknown();
            }
            _ => {}
        }

        state.exec_sessions.retain(|_, pid| process_alive(*pid));
        Ok(())
    }

    fn stop(
        &self,
        ctr: &ContainerConfig,
        state: &mut ContainerState,
        timeout: Duration,
    ) -> CorralResult<()> {
        if let Some(pid) = state.pid {
            terminate(pid, timeout)?;
        }

        state.set_stopped();
        let pid_file = self.paths.container_pid(ctr.id.as_str());
        if let Err(e) = std::fs::remove_file(&pid_file) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %pid_file.display(), error = %e, "Failed to remove PID file");
            }
        }
        Ok(())
    }

    fn stop_exec_sessions(
        &self,
        ctr: &ContainerConfig,
        state: &mut ContainerState,
        timeout: Duration,
    ) -> CorralResult<()> {
        let sessions: Vec<(String, u32)> = state
            .exec_sessions
            .iter()
            .map(|(id, pid)| (id.clone(), *pid))
            .collect();

        for (session, pid) in sessions {
            terminate(pid, timeout)
                .with_context(|| format!("error stopping exec session {session}"))?;
            state.exec_sessions.remove(&session);
            tracing::debug!(container_id = %ctr.id, session = %session, pid, "Stopped exec session");
        }
        Ok(())
    }

    fn cleanup(&self, ctr: &ContainerConfig, _state: &mut ContainerState) -> CorralResult<()> {
        let run_dir = self.paths.container_run(ctr.id.as_str());
        if remove_dir_if_exists(&run_dir)? {
            tracing::debug!(container_id = %ctr.id, path = %run_dir.display(), "Cleaned up runtime directory");
        }
        Ok(())
    }

    fn teardown_storage(
        &self,
        ctr: &ContainerConfig,
        _state: &mut ContainerState,
    ) -> CorralResult<()> {
        let storage = self.paths.container_storage(ctr.id.as_str());
        if remove_dir_if_exists(&storage)? {
            tracing::debug!(container_id = %ctr.id, path = %storage.display(), "Removed container storage");
        }
        Ok(())
    }

    fn delete(&self, ctr: &ContainerConfig, state: &mut ContainerState) -> CorralResult<()> {
        if let Some(pid) = state.pid.filter(|pid| process_alive(*pid)) {
            return Err(CorralError::ContainerStateInvalid {
                pod: ctr.pod.as_ref().map(ToString::to_string).unwrap_or_default(),
                container: ctr.id.to_string(),
                reason: format!("still has a live main process ({pid})"),
            });
        }

        let dir = self.paths.container(ctr.id.as_str());
        remove_dir_if_exists(&dir)?;
        tracing::debug!(container_id = %ctr.id, path = %dir.display(), "Deleted container directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn runtime(root: &Path) -> ProcessRuntime {
        ProcessRuntime::new(CorralPaths::with_root(root))
    }

    #[test]
    fn own_process_is_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(u32::MAX));
    }

    #[test]
    fn invalid_pid_is_rejected() {
        assert!(send_signal(0, 0).is_err());
    }

    #[test]
    fn sync_marks_dead_process_exited() {
        let temp = tempdir().unwrap();
        let oci = runtime(temp.path());
        let config = ContainerConfig::new("web");

        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let mut state = ContainerState::default();
        state.set_running(pid);
        oci.sync(&config, &mut state).unwrap();
        assert_eq!(state.status, ContainerStatus::Exited);
    }

    #[test]
    fn sync_without_pid_is_unknown() {
        let temp = tempdir().unwrap();
        let oci = runtime(temp.path());
        let mut state = ContainerState {
            status: ContainerStatus::Running,
            ..ContainerState::default()
        };
        oci.sync(&ContainerConfig::new("web"), &mut state).unwrap();
        assert_eq!(state.status, ContainerStatus::Unknown);
    }

    #[test]
    fn stop_terminates_process() {
        let temp = tempdir().unwrap();
        let oci = runtime(temp.path());
        let config = ContainerConfig::new("web");

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let mut state = ContainerState::default();
        state.set_running(child.id());

        oci.stop(&config, &mut state, Duration::from_secs(5)).unwrap();
        assert_eq!(state.status, ContainerStatus::Stopped);
        assert!(!child.wait().unwrap().success());
    }

    #[test]
    fn stop_exec_sessions_clears_sessions() {
        let temp = tempdir().unwrap();
        let oci = runtime(temp.path());
        let config = ContainerConfig::new("web");

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let mut state = ContainerState::default();
        state.exec_sessions.insert("exec-1".to_string(), child.id());

        oci.stop_exec_sessions(&config, &mut state, Duration::from_secs(5))
            .unwrap();
        assert!(!state.has_exec_sessions());
        child.wait().unwrap();
    }

    #[test]
    fn teardown_and_delete_remove_directories() {
        let temp = tempdir().unwrap();
        let oci = runtime(temp.path());
        let config = ContainerConfig::new("web");
        let paths = oci.paths().clone();
        let id = config.id.as_str();

        std::fs::create_dir_all(paths.container_storage(id)).unwrap();
        std::fs::create_dir_all(paths.container_run(id)).unwrap();
        std::fs::write(paths.container_pid(id), "1").unwrap();

        let mut state = ContainerState::default();
        state.set_created();

        oci.cleanup(&config, &mut state).unwrap();
        assert!(!paths.container_run(id).exists());

        oci.teardown_storage(&config, &mut state).unwrap();
        assert!(!paths.container_storage(id).exists());
        assert!(paths.container(id).exists());

        oci.delete(&config, &mut state).unwrap();
        assert!(!paths.container(id).exists());

        // Everything is idempotent.
        oci.cleanup(&config, &mut state).unwrap();
        oci.teardown_storage(&config, &mut state).unwrap();
        oci.delete(&config, &mut state).unwrap();
    }
}
