//! Containers: the member entities of a pod.
//!
//! A [`Container`] pairs an immutable [`ContainerConfig`] with mutable
//! [`ContainerState`] behind its own [`EntityLock`]. All state transitions
//! go through a [`LockedContainer`], which drives the OCI runtime backend.

mod state;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use corral_common::error::ResultExt;
use corral_common::{ContainerId, CorralError, CorralResult, PodId};
use serde::{Deserialize, Serialize};

use crate::lock::{EntityGuard, EntityLock};
use crate::oci::OciRuntime;

pub use state::{ContainerState, ContainerStatus};

/// Stop timeout applied when a container does not set its own (seconds).
pub const DEFAULT_STOP_TIMEOUT: u32 = 10;

/// Immutable container configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    /// Container ID.
    pub id: ContainerId,
    /// Human-readable name.
    pub name: String,
    /// Pod the container belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodId>,
    /// Containers this one depends on (shared namespaces and the like).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ContainerId>,
    /// Seconds to wait for the main process after asking it to stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout: Option<u32>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ContainerConfig {
    /// Configuration for a new container with a generated ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ContainerId::generate(),
            name: name.into(),
            pod: None,
            dependencies: Vec::new(),
            stop_timeout: None,
            created_at: Utc::now(),
        }
    }

    /// Use a specific ID.
    #[must_use]
    pub fn with_id(mut self, id: ContainerId) -> Self {
        self.id = id;
        self
    }

    /// Place the container in a pod.
    #[must_use]
    pub fn in_pod(mut self, pod: &PodId) -> Self {
        self.pod = Some(pod.clone());
        self
    }

    /// Add a dependency on another container.
    #[must_use]
    pub fn depends_on(mut self, id: &ContainerId) -> Self {
        self.dependencies.push(id.clone());
        self
    }

    /// Set the stop timeout in seconds.
    #[must_use]
    pub const fn with_stop_timeout(mut self, seconds: u32) -> Self {
        self.stop_timeout = Some(seconds);
        self
    }
}

/// Lock-protected part of a container.
#[derive(Debug)]
pub struct ContainerInner {
    valid: bool,
    state: ContainerState,
}

/// A container known to the runtime.
#[derive(Debug)]
pub struct Container {
    config: ContainerConfig,
    inner: EntityLock<ContainerInner>,
}

impl Container {
    /// Allocate a container in the `Configured` state.
    ///
    /// The container is not valid until the runtime registers it.
    pub fn new(config: ContainerConfig, lock_file: Option<PathBuf>) -> Self {
        Self::from_parts(config, ContainerState::default(), lock_file, false)
    }

    /// Rebuild a registered container from a persisted record.
    pub fn restore(config: ContainerConfig, state: ContainerState, lock_file: Option<PathBuf>) -> Self {
        Self::from_parts(config, state, lock_file, true)
    }

    fn from_parts(
        config: ContainerConfig,
        state: ContainerState,
        lock_file: Option<PathBuf>,
        valid: bool,
    ) -> Self {
        Self {
            config,
            inner: EntityLock::new(ContainerInner { valid, state }, lock_file),
        }
    }

    /// ID accessor.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.config.id
    }

    /// Name accessor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Pod the container belongs to.
    #[must_use]
    pub fn pod(&self) -> Option<&PodId> {
        self.config.pod.as_ref()
    }

    /// Containers this one depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[ContainerId] {
        &self.config.dependencies
    }

    /// Full configuration.
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// How long to wait for the main process to stop.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.config.stop_timeout.unwrap_or(DEFAULT_STOP_TIMEOUT),
        ))
    }

    /// Lock file used for inter-process coordination.
    #[must_use]
    pub fn lock_file(&self) -> Option<&Path> {
        self.inner.lock_file()
    }

    /// Acquire the container lock.
    pub fn lock(&self) -> CorralResult<LockedContainer<'_>> {
        Ok(LockedContainer {
            container: self,
            guard: self.inner.lock()?,
        })
    }

    /// Snapshot of the current state.
    ///
    /// Must not be called while holding this container's lock.
    #[must_use]
    pub fn state(&self) -> ContainerState {
        self.inner.peek(|inner| inner.state.clone())
    }

    /// Current status. Same locking caveat as [`Container::state`].
    #[must_use]
    pub fn status(&self) -> ContainerStatus {
        self.inner.peek(|inner| inner.state.status)
    }

    /// Whether the container is still usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.peek(|inner| inner.valid)
    }
}

/// A container whose lock is held.
#[derive(Debug)]
pub struct LockedContainer<'a> {
    container: &'a Container,
    guard: EntityGuard<'a, ContainerInner>,
}

impl<'a> LockedContainer<'a> {
    /// The locked container.
    #[must_use]
    pub const fn container(&self) -> &'a Container {
        self.container
    }

    /// ID accessor.
    #[must_use]
    pub fn id(&self) -> &'a ContainerId {
        self.container.id()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &ContainerState {
        &self.guard.state
    }

    /// Mutable access to the state.
    pub fn state_mut(&mut self) -> &mut ContainerState {
        &mut self.guard.state
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ContainerStatus {
        self.guard.state.status
    }

    /// Whether the container is still usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.guard.valid
    }

    pub(crate) fn mark_valid(&mut self) {
        self.guard.valid = true;
    }

    /// Permanently retire the container object and drop its lock file.
    pub fn invalidate(&mut self) {
        self.guard.valid = false;
        self.guard.discard_lock_file();
    }

    fn ensure_valid(&self) -> CorralResult<()> {
        if self.guard.valid {
            Ok(())
        } else {
            Err(CorralError::ContainerRemoved {
                id: self.id().to_string(),
            })
        }
    }

    /// Refresh the state from the backend.
    pub fn sync(&mut self, oci: &dyn OciRuntime) -> CorralResult<()> {
        self.ensure_valid()?;
        let id = self.id();
        oci.sync(&self.container.config, &mut self.guard.state)
            .with_context(|| format!("error syncing container {id}"))?;
        tracing::debug!(container_id = %id, status = %self.guard.state.status, "Synced container");
        Ok(())
    }

    /// Stop the main process, waiting at most `timeout` before killing it.
    pub fn stop(&mut self, oci: &dyn OciRuntime, timeout: Duration) -> CorralResult<()> {
        self.ensure_valid()?;
        let id = self.id();
        tracing::info!(container_id = %id, timeout_secs = timeout.as_secs(), "Stopping container");
        oci.stop(&self.container.config, &mut self.guard.state, timeout)
            .with_context(|| format!("error stopping container {id}"))
    }

    /// Stop every active exec session.
    pub fn stop_exec_sessions(&mut self, oci: &dyn OciRuntime, timeout: Duration) -> CorralResult<()> {
        self.ensure_valid()?;
        let id = self.id();
        tracing::debug!(
            container_id = %id,
            sessions = self.guard.state.exec_sessions.len(),
            "Stopping exec sessions"
        );
        oci.stop_exec_sessions(&self.container.config, &mut self.guard.state, timeout)
            .with_context(|| format!("error stopping exec sessions of container {id}"))
    }

    /// Release network namespace, mounts and cgroup of the container.
    pub fn cleanup(&mut self, oci: &dyn OciRuntime) -> CorralResult<()> {
        self.ensure_valid()?;
        let id = self.id();
        oci.cleanup(&self.container.config, &mut self.guard.state)
            .with_context(|| format!("error cleaning up container {id}"))
    }

    /// Tear down the container's dedicated storage.
    pub fn teardown_storage(&mut self, oci: &dyn OciRuntime) -> CorralResult<()> {
        self.ensure_valid()?;
        let id = self.id();
        oci.teardown_storage(&self.container.config, &mut self.guard.state)
            .with_context(|| format!("error tearing down storage of container {id}"))
    }

    /// Delete the backend instance. The container returns to `Configured`.
    pub fn delete(&mut self, oci: &dyn OciRuntime) -> CorralResult<()> {
        self.ensure_valid()?;
        let id = self.id();
        oci.delete(&self.container.config, &mut self.guard.state)
            .with_context(|| format!("error deleting container {id}"))?;
        self.guard.state.set_configured();
        tracing::debug!(container_id = %id, "Deleted container from backend");
        Ok(())
    }
}
