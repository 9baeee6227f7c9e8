//! Container state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// State is inconsistent or could not be recovered.
    Unknown,
    /// The record exists but no backend instance was ever created, or it
    /// has already been torn down.
    #[default]
    Configured,
    /// The backend instance exists but was never started.
    Created,
    /// The main process is running.
    Running,
    /// The main process is frozen.
    Paused,
    /// The main process was stopped by the runtime.
    Stopped,
    /// The main process exited on its own.
    Exited,
}

impl ContainerStatus {
    /// Returns true if the container is in a running state.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if a container in this state blocks its pod's removal
    /// even when forced.
    #[must_use]
    pub const fn blocks_removal(&self) -> bool {
        matches!(self, Self::Paused | Self::Unknown)
    }

    /// Returns true if removing the container must delete a backend
    /// instance. `Configured` containers have nothing to delete.
    #[must_use]
    pub const fn needs_backend_delete(&self) -> bool {
        !matches!(self, Self::Configured)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Configured => write!(f, "configured"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Mutable runtime state of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    /// Current status.
    pub status: ContainerStatus,
    /// Process ID of the main process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Active exec sessions, session ID to process ID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exec_sessions: BTreeMap<String, u32>,
    /// Exit code of the main process, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// When the main process finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ContainerState {
    /// Transition to the "created" status.
    pub fn set_created(&mut self) {
        self.status = ContainerStatus::Created;
    }

    /// Transition to the "running" status.
    pub fn set_running(&mut self, pid: u32) {
        self.status = ContainerStatus::Running;
        self.pid = Some(pid);
        self.exit_code = None;
        self.finished_at = None;
    }

    /// Transition to the "paused" status.
    pub fn set_paused(&mut self) {
        self.status = ContainerStatus::Paused;
    }

    /// Transition to the "stopped" status after the runtime stopped the
    /// main process.
    pub fn set_stopped(&mut self) {
        self.status = ContainerStatus::Stopped;
        self.pid = None;
        self.finished_at = Some(Utc::now());
    }

    /// Transition to the "exited" status after the main process ended on
    /// its own.
    pub fn set_exited(&mut self, exit_code: Option<i32>) {
        self.status = ContainerStatus::Exited;
        self.pid = None;
        self.exit_code = exit_code;
        self.finished_at = Some(Utc::now());
    }

    /// Transition back to "configured" once the backend instance is gone.
    pub fn set_configured(&mut self) {
        self.status = ContainerStatus::Configured;
        self.pid = None;
        self.exec_sessions.clear();
    }

    /// Mark the state as unrecoverable.
    pub fn set_unknown(&mut self) {
        self.status = ContainerStatus::Unknown;
    }

    /// Returns true if exec sessions are active.
    #[must_use]
    pub fn has_exec_sessions(&self) -> bool {
        !self.exec_sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions() {
        let mut state = ContainerState::default();
        assert_eq!(state.status, ContainerStatus::Configured);
        assert!(!state.status.needs_backend_delete());

        state.set_created();
        assert!(state.status.needs_backend_delete());

        state.set_running(4242);
        assert!(state.status.is_running());
        assert_eq!(state.pid, Some(4242));

        state.set_paused();
        assert!(state.status.blocks_removal());

        state.set_running(4242);
        state.set_stopped();
        assert_eq!(state.status, ContainerStatus::Stopped);
        assert!(state.pid.is_none());
        assert!(state.finished_at.is_some());

        state.set_configured();
        assert_eq!(state.status, ContainerStatus::Configured);
    }

    #[test]
    fn unknown_blocks_removal() {
        let mut state = ContainerState::default();
        state.set_unknown();
        assert!(state.status.blocks_removal());
        assert!(!ContainerStatus::Running.blocks_removal());
    }

    #[test]
    fn state_serialization() {
        let mut state = ContainerState::default();
        state.set_running(12345);
        state.exec_sessions.insert("exec-1".to_string(), 12400);

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"pid\":12345"));
        assert!(json.contains("\"execSessions\":{\"exec-1\":12400}"));

        let back: ContainerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn status_display() {
        assert_eq!(ContainerStatus::Configured.to_string(), "configured");
        assert_eq!(ContainerStatus::Running.to_string(), "running");
        assert_eq!(ContainerStatus::Exited.to_string(), "exited");
    }
}
