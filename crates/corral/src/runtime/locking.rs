//! Multi-entity locking for pod-wide operations.

use std::sync::Arc;

use corral_common::CorralResult;

use super::{ExclusiveGuard, Runtime};
use crate::container::{Container, LockedContainer};
use crate::pod::{LockedPod, Pod};

/// Every lock a pod-wide mutation needs.
///
/// Fields drop in declaration order, so containers unlock first, then the
/// pod, then the runtime.
#[derive(Debug)]
pub(crate) struct PodLockSet<'a> {
    /// Member containers, locked in ID order.
    pub containers: Vec<LockedContainer<'a>>,
    /// The pod itself.
    pub pod: LockedPod<'a>,
    _runtime: ExclusiveGuard<'a>,
}

impl Runtime {
    /// Run `f` with the runtime held exclusively, `pod` locked and valid, and
    /// every member container locked.
    ///
    /// All locks are taken before `f` runs and released when it returns,
    /// whatever the outcome.
    pub(crate) fn with_pod_locked<R>(
        &self,
        pod: &Pod,
        f: impl FnOnce(&mut PodLockSet<'_>) -> CorralResult<R>,
    ) -> CorralResult<R> {
        let runtime = self.acquire_exclusive()?;
        let mut locked_pod = pod.lock()?;
        if let Err(e) = locked_pod.ensure_valid() {
            // Locking a removed pod recreates its lock file.
            locked_pod.invalidate();
            return Err(e);
        }

        let mut members: Vec<Arc<Container>> = self.state.pod_containers(pod)?;
        members.sort_by(|a, b| a.id().cmp(b.id()));

        let containers = members
            .iter()
            .map(|ctr| ctr.lock())
            .collect::<CorralResult<Vec<_>>>()?;
        tracing::debug!(pod_id = %pod.id(), containers = containers.len(), "Locked pod for mutation");

        let mut locks = PodLockSet {
            containers,
            pod: locked_pod,
            _runtime: runtime,
        };
        f(&mut locks)
    }
}
