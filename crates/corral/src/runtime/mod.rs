//! Pod lifecycle runtime.
//!
//! [`Runtime`] is the entry point: it owns the state store and the OCI and
//! cgroup backends, and serialises structural changes behind a
//! shared/exclusive lock.
//!
//! Locks are always taken in the order Runtime → Pod → Container(s) and
//! released in reverse.

mod config;
pub mod events;
mod locking;
mod pod;
mod removal;

use std::sync::Arc;

use chrono::Utc;
use corral_common::{CorralError, CorralResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cgroup::{CgroupBackend, FsCgroups};
use crate::container::{Container, ContainerConfig};
use crate::oci::{OciRuntime, ProcessRuntime};
use crate::state::{InMemoryState, StateStore};

pub use config::RuntimeConfig;
pub use events::{EventBus, RuntimeEvent};

/// Data guarded by the runtime lock.
#[derive(Debug)]
pub struct RuntimeStatus {
    valid: bool,
}

impl RuntimeStatus {
    /// Whether the runtime still accepts operations.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Runtime lock held shared.
pub type SharedGuard<'a> = RwLockReadGuard<'a, RuntimeStatus>;

/// Runtime lock held exclusively.
pub type ExclusiveGuard<'a> = RwLockWriteGuard<'a, RuntimeStatus>;

/// Handle to the pod lifecycle manager.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    state: Arc<dyn StateStore>,
    oci: Arc<dyn OciRuntime>,
    cgroups: Arc<dyn CgroupBackend>,
    lock: RwLock<RuntimeStatus>,
    events: EventBus,
}

impl Runtime {
    /// Open a runtime with the default backends.
    ///
    /// Creates the directories under `config.paths` and reloads any pod and
    /// container records found there.
    pub fn new(config: RuntimeConfig) -> CorralResult<Self> {
        config.paths.create_dirs()?;
        let state = InMemoryState::open(config.paths.records())?;
        let oci = ProcessRuntime::new(config.paths.clone());
        let cgroups = FsCgroups::new(config.cgroup_root.clone());
        Ok(Self::with_backends(
            config,
            Arc::new(state),
            Arc::new(oci),
            Arc::new(cgroups),
        ))
    }

    /// Assemble a runtime from explicit backends.
    pub fn with_backends(
        config: RuntimeConfig,
        state: Arc<dyn StateStore>,
        oci: Arc<dyn OciRuntime>,
        cgroups: Arc<dyn CgroupBackend>,
    ) -> Self {
        tracing::info!(
            root = %config.paths.root.display(),
            cgroup_manager = %config.cgroup_manager,
            cgroup_version = %config.cgroup_version,
            oci_runtime = oci.name(),
            "Initialized runtime"
        );
        Self {
            config,
            state,
            oci,
            cgroups,
            lock: RwLock::new(RuntimeStatus { valid: true }),
            events: EventBus::new(),
        }
    }

    /// Take the runtime lock shared. Fails once the runtime is shut down.
    pub fn acquire_shared(&self) -> CorralResult<SharedGuard<'_>> {
        let guard = self.lock.read();
        if guard.valid {
            Ok(guard)
        } else {
            Err(CorralError::RuntimeStopped)
        }
    }

    /// Take the runtime lock exclusively. Fails once the runtime is shut down.
    pub fn acquire_exclusive(&self) -> CorralResult<ExclusiveGuard<'_>> {
        let guard = self.lock.write();
        if guard.valid {
            Ok(guard)
        } else {
            Err(CorralError::RuntimeStopped)
        }
    }

    /// Stop accepting operations. Later calls fail with `RuntimeStopped`.
    pub fn shutdown(&self) -> CorralResult<()> {
        let mut status = self.acquire_exclusive()?;
        status.valid = false;
        tracing::info!("Runtime shut down");
        Ok(())
    }

    /// Whether the runtime still accepts operations.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lock.read().valid
    }

    /// Configuration accessor.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// State store accessor.
    #[must_use]
    pub fn state(&self) -> &dyn StateStore {
        self.state.as_ref()
    }

    /// Event bus accessor.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to runtime events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    /// Register a container, placing it in its pod if it names one.
    ///
    /// The container starts out `Configured`; the default stop timeout
    /// applies when the configuration does not set one.
    pub fn add_container(&self, mut config: ContainerConfig) -> CorralResult<Arc<Container>> {
        let _runtime = self.acquire_exclusive()?;

        let pod = config
            .pod
            .as_ref()
            .map(|id| self.state.pod(id.as_str()))
            .transpose()?;
        let pod_lock = pod.as_deref().map(crate::pod::Pod::lock).transpose()?;
        if let Some(locked) = &pod_lock {
            locked.ensure_valid()?;
        }

        config.stop_timeout.get_or_insert(self.config.stop_timeout);
        let lock_file = self.config.paths.container_lock(config.id.as_str());
        let ctr = Arc::new(Container::new(config, Some(lock_file)));

        self.state.add_container(Arc::clone(&ctr))?;
        ctr.lock()?.mark_valid();

        tracing::info!(
            container_id = %ctr.id(),
            name = ctr.name(),
            pod_id = ?ctr.pod(),
            "Added container"
        );
        self.events.publish(RuntimeEvent::ContainerAdded {
            id: ctr.id().to_string(),
            pod: ctr.pod().map(ToString::to_string),
            timestamp: Utc::now(),
        });
        Ok(ctr)
    }

    /// Container by full ID.
    pub fn get_container(&self, id: &str) -> CorralResult<Arc<Container>> {
        let _runtime = self.acquire_shared()?;
        self.state.container(id)
    }
}
