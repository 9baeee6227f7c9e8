//! Authoritative registry of pods and containers.
//!
//! The store keeps its own lock over structural mutations. Apart from
//! `add_pod` and `add_container`, which read the state of the entity being
//! added, its methods never touch entity locks, so callers may invoke them
//! while holding pod and container guards. `save_container` takes the
//! caller's guard instead of locking.

mod memory;
mod records;

use std::fmt;
use std::sync::Arc;

use corral_common::{ContainerId, CorralResult};

use crate::container::{Container, LockedContainer};
use crate::pod::Pod;

pub use memory::InMemoryState;
pub use records::{ContainerRecord, PodRecord, RecordStore};

/// Storage of pods, containers and their relationships.
pub trait StateStore: fmt::Debug + Send + Sync {
    /// Register a pod.
    ///
    /// Fails with `PodExists` or `NameInUse` on conflicts.
    fn add_pod(&self, pod: Arc<Pod>) -> CorralResult<()>;

    /// Unregister a pod. The pod must have no containers left.
    fn remove_pod(&self, pod: &Pod) -> CorralResult<()>;

    /// Pod by full ID.
    fn pod(&self, id: &str) -> CorralResult<Arc<Pod>>;

    /// Whether a pod with this full ID exists.
    fn has_pod(&self, id: &str) -> CorralResult<bool>;

    /// Pod by full ID, name, or unique ID prefix, in that order.
    fn lookup_pod(&self, id_or_name: &str) -> CorralResult<Arc<Pod>>;

    /// Every registered pod, ordered by creation time then ID.
    fn all_pods(&self) -> CorralResult<Vec<Arc<Pod>>>;

    /// Register a container, and its pod membership if it has a pod.
    fn add_container(&self, ctr: Arc<Container>) -> CorralResult<()>;

    /// Container by full ID.
    fn container(&self, id: &str) -> CorralResult<Arc<Container>>;

    /// Persist the current state of a registered container.
    ///
    /// Fails with `ContainerNotFound` if the container is not registered.
    fn save_container(&self, ctr: &LockedContainer<'_>) -> CorralResult<()>;

    /// Whether a container with this full ID exists.
    fn has_container(&self, id: &str) -> CorralResult<bool>;

    /// Members of a pod, ordered by ID.
    fn pod_containers(&self, pod: &Pod) -> CorralResult<Vec<Arc<Container>>>;

    /// Unregister every member of a pod in one step.
    ///
    /// Fails with `DependencyViolation`, changing nothing, if a container
    /// outside the pod depends on a member.
    fn remove_pod_containers(&self, pod: &Pod) -> CorralResult<()>;

    /// IDs of the containers that depend on `ctr`, ordered by ID.
    fn container_in_use(&self, ctr: &Container) -> CorralResult<Vec<ContainerId>>;
}
