//! OCI runtime backend.
//!
//! The backend owns everything that touches a container's processes and
//! on-disk resources. Each call receives the container's configuration and
//! its state, which the caller holds locked.

mod process;

use std::fmt;
use std::time::Duration;

use corral_common::CorralResult;

use crate::container::{ContainerConfig, ContainerState};

pub use process::ProcessRuntime;

/// Operations the lifecycle manager needs from a container backend.
pub trait OciRuntime: fmt::Debug + Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Refresh `state` from the live system.
    fn sync(&self, ctr: &ContainerConfig, state: &mut ContainerState) -> CorralResult<()>;

    /// Stop the main process, escalating to a kill after `timeout`.
    fn stop(
        &self,
        ctr: &ContainerConfig,
        state: &mut ContainerState,
        timeout: Duration,
    ) -> CorralResult<()>;

    /// Stop all exec sessions of the container.
    fn stop_exec_sessions(
        &self,
        ctr: &ContainerConfig,
        state: &mut ContainerState,
        timeout: Duration,
    ) -> CorralResult<()>;

    /// Release network namespace, mounts and the container cgroup.
    fn cleanup(&self, ctr: &ContainerConfig, state: &mut ContainerState) -> CorralResult<()>;

    /// Remove the container's dedicated storage.
    fn teardown_storage(&self, ctr: &ContainerConfig, state: &mut ContainerState)
    -> CorralResult<()>;

    /// Delete the backend instance of the container.
    fn delete(&self, ctr: &ContainerConfig, state: &mut ContainerState) -> CorralResult<()>;
}
