//! Pod removal.
//!
//! Removal runs with the runtime, the pod and every member container locked.
//! Every check happens before the first mutation. Once mutation starts, the
//! first failure aborts the operation and nothing is rolled back; running the
//! removal again picks up where it stopped.

use std::collections::BTreeSet;

use chrono::Utc;
use corral_common::{ContainerId, CorralError, CorralResult, PodId};

use super::locking::PodLockSet;
use super::{Runtime, RuntimeEvent};
use crate::cgroup::CgroupManager;
use crate::container::{ContainerStatus, LockedContainer};
use crate::pod::Pod;

fn state_invalid(pod: &PodId, ctr: &LockedContainer<'_>, reason: &str) -> CorralError {
    CorralError::ContainerStateInvalid {
        pod: pod.to_string(),
        container: ctr.id().to_string(),
        reason: reason.to_string(),
    }
}

impl Runtime {
    /// Remove a pod.
    ///
    /// A pod with members is only removed when `remove_containers` is set.
    /// Running members and open exec sessions require `force`, which stops
    /// them first. Paused members, members in an unknown state and members
    /// that containers outside the pod depend on always block removal.
    pub fn remove_pod(&self, pod: &Pod, remove_containers: bool, force: bool) -> CorralResult<()> {
        self.with_pod_locked(pod, |locks| {
            self.remove_locked_pod(locks, remove_containers, force)
        })
    }

    fn remove_locked_pod(
        &self,
        locks: &mut PodLockSet<'_>,
        remove_containers: bool,
        force: bool,
    ) -> CorralResult<()> {
        let pod_id = locks.pod.id();

        if !locks.containers.is_empty() && !remove_containers {
            return Err(CorralError::PodNotEmpty {
                id: pod_id.to_string(),
                count: locks.containers.len(),
            });
        }

        tracing::info!(
            pod_id = %pod_id,
            containers = locks.containers.len(),
            force,
            "Removing pod"
        );

        for ctr in &mut locks.containers {
            ctr.sync(self.oci.as_ref())?;
            self.state.save_container(ctr)?;
        }

        self.check_removable(locks, force)?;

        if force {
            self.stop_members(&mut locks.containers)?;
        }

        for ctr in &mut locks.containers {
            self.teardown_member(ctr)?;
        }

        self.state.remove_pod_containers(locks.pod.pod())?;
        for ctr in &mut locks.containers {
            ctr.invalidate();
            self.events.publish(RuntimeEvent::ContainerRemoved {
                id: ctr.id().to_string(),
                pod: Some(pod_id.to_string()),
                timestamp: Utc::now(),
            });
        }

        if let Some(path) = locks.pod.state().cgroup_path.clone() {
            self.remove_pod_cgroup(pod_id, &path)?;
        }

        self.state.remove_pod(locks.pod.pod())?;
        locks.pod.invalidate();

        tracing::info!(pod_id = %pod_id, "Removed pod");
        self.events.publish(RuntimeEvent::PodRemoved {
            id: pod_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Reject removal before anything is touched.
    fn check_removable(&self, locks: &PodLockSet<'_>, force: bool) -> CorralResult<()> {
        let pod_id = locks.pod.id();

        for ctr in &locks.containers {
            let status = ctr.status();
            if status.blocks_removal() {
                let reason = if status == ContainerStatus::Paused {
                    "is paused; unpause it before removing the pod"
                } else {
                    "is in an unknown state"
                };
                return Err(state_invalid(pod_id, ctr, reason));
            }
            if status.is_running() && !force {
                return Err(state_invalid(pod_id, ctr, "is running; stop it or use force"));
            }
            if !force && ctr.state().has_exec_sessions() {
                return Err(state_invalid(pod_id, ctr, "has active exec sessions; stop them or use force"));
            }
        }

        let members: BTreeSet<&ContainerId> = locks.containers.iter().map(|ctr| ctr.id()).collect();
        for ctr in &locks.containers {
            let dependents = self.state.container_in_use(ctr.container())?;
            if let Some(outside) = dependents.iter().find(|dep| !members.contains(dep)) {
                return Err(CorralError::DependencyViolation {
                    container: ctr.id().to_string(),
                    dependent: outside.to_string(),
                    pod: pod_id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Stop running members and their exec sessions.
    fn stop_members(&self, containers: &mut [LockedContainer<'_>]) -> CorralResult<()> {
        let oci = self.oci.as_ref();
        for ctr in containers {
            let timeout = ctr.container().stop_timeout();
            if ctr.status().is_running() {
                ctr.stop(oci, timeout)?;
                ctr.sync(oci)?;
                self.events.publish(RuntimeEvent::ContainerStopped {
                    id: ctr.id().to_string(),
                    timestamp: Utc::now(),
                });
            }
            if ctr.state().has_exec_sessions() {
                ctr.stop_exec_sessions(oci, timeout)?;
            }
            self.state.save_container(ctr)?;
        }
        Ok(())
    }

    /// Release a member's resources and delete its backend instance.
    fn teardown_member(&self, ctr: &mut LockedContainer<'_>) -> CorralResult<()> {
        let oci = self.oci.as_ref();
        ctr.cleanup(oci)?;
        ctr.teardown_storage(oci)?;
        if ctr.status().needs_backend_delete() {
            ctr.delete(oci)?;
        } else {
            tracing::debug!(container_id = %ctr.id(), "Container was never created, skipping delete");
        }
        self.state.save_container(ctr)
    }

    fn remove_pod_cgroup(&self, pod_id: &PodId, path: &str) -> CorralResult<()> {
        match self.config.cgroup_manager {
            CgroupManager::Systemd => {
                // The slice goes away with its last unit.
                tracing::debug!(pod_id = %pod_id, cgroup = path, "Leaving pod cgroup to systemd");
                Ok(())
            }
            CgroupManager::Cgroupfs => {
                let cgroup = match self.cgroups.load(self.config.cgroup_version, path) {
                    Ok(cgroup) => cgroup,
                    Err(e) if e.is_deleted() => {
                        tracing::debug!(pod_id = %pod_id, cgroup = path, "Pod cgroup already deleted");
                        return Ok(());
                    }
                    Err(e) => {
                        return Err(CorralError::backend(
                            format!("error retrieving pod {pod_id} cgroup {path}"),
                            e,
                        ));
                    }
                };

                match cgroup.delete() {
                    Ok(()) => {
                        tracing::debug!(pod_id = %pod_id, cgroup = path, "Deleted pod cgroup");
                        Ok(())
                    }
                    Err(e) if e.is_deleted() => Ok(()),
                    Err(e) => Err(CorralError::backend(
                        format!("error removing pod {pod_id} cgroup {path}"),
                        e,
                    )),
                }
            }
        }
    }
}
