//! In-memory state store with optional JSON records on disk.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use corral_common::{ContainerId, CorralError, CorralResult, PodId};
use parking_lot::RwLock;

use super::StateStore;
use super::records::{ContainerRecord, PodRecord, RecordStore};
use crate::container::{Container, LockedContainer};
use crate::pod::Pod;

#[derive(Debug, Default)]
struct StateInner {
    pods: HashMap<PodId, Arc<Pod>>,
    pod_names: HashMap<String, PodId>,
    containers: HashMap<ContainerId, Arc<Container>>,
    ctr_names: HashMap<String, ContainerId>,
    pod_members: HashMap<PodId, BTreeSet<ContainerId>>,
    // container -> containers that depend on it
    dependents: HashMap<ContainerId, BTreeSet<ContainerId>>,
}

impl StateInner {
    fn check_new_pod(&self, pod: &Pod) -> CorralResult<()> {
        if self.pods.contains_key(pod.id()) {
            return Err(CorralError::PodExists {
                id: pod.id().to_string(),
            });
        }
        if self.pod_names.contains_key(pod.name()) {
            return Err(CorralError::NameInUse {
                name: pod.name().to_string(),
            });
        }
        Ok(())
    }

    fn link_pod(&mut self, pod: Arc<Pod>) {
        let id = pod.id().clone();
        self.pod_names.insert(pod.name().to_string(), id.clone());
        self.pod_members.entry(id.clone()).or_default();
        self.pods.insert(id, pod);
    }

    fn check_new_container(&self, ctr: &Container) -> CorralResult<()> {
        if self.containers.contains_key(ctr.id()) {
            return Err(CorralError::ContainerExists {
                id: ctr.id().to_string(),
            });
        }
        if self.ctr_names.contains_key(ctr.name()) {
            return Err(CorralError::NameInUse {
                name: ctr.name().to_string(),
            });
        }
        if let Some(pod) = ctr.pod() {
            if !self.pods.contains_key(pod) {
                return Err(CorralError::PodNotFound {
                    id: pod.to_string(),
                });
            }
        }
        if let Some(missing) = ctr
            .dependencies()
            .iter()
            .find(|dep| !self.containers.contains_key(*dep))
        {
            return Err(CorralError::ContainerNotFound {
                id: missing.to_string(),
            });
        }
        Ok(())
    }

    fn link_container(&mut self, ctr: Arc<Container>) {
        let id = ctr.id().clone();
        self.ctr_names.insert(ctr.name().to_string(), id.clone());
        if let Some(pod) = ctr.pod() {
            self.pod_members
                .entry(pod.clone())
                .or_default()
                .insert(id.clone());
        }
        for dep in ctr.dependencies() {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(id.clone());
        }
        self.containers.insert(id, ctr);
    }

    fn unlink_container(&mut self, id: &ContainerId) {
        let Some(ctr) = self.containers.remove(id) else {
            return;
        };
        self.ctr_names.remove(ctr.name());
        self.dependents.remove(id);
        for dep in ctr.dependencies() {
            if let Some(set) = self.dependents.get_mut(dep) {
                set.remove(id);
                if set.is_empty() {
                    self.dependents.remove(dep);
                }
            }
        }
        if let Some(members) = ctr.pod().and_then(|pod| self.pod_members.get_mut(pod)) {
            members.remove(id);
        }
    }
}

/// State store keeping every entity in memory.
///
/// When created with [`InMemoryState::with_records`] or
/// [`InMemoryState::open`], additions, removals and saved container states
/// are mirrored to JSON records on disk.
#[derive(Debug, Default)]
pub struct InMemoryState {
    inner: RwLock<StateInner>,
    records: Option<RecordStore>,
}

impl InMemoryState {
    /// An empty, purely in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store that persists records below `dir`.
    ///
    /// Existing records are left alone; use [`InMemoryState::open`] to load
    /// them.
    pub fn with_records(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: RwLock::default(),
            records: Some(RecordStore::new(dir)),
        }
    }

    /// Load the records below `dir` and keep persisting to it.
    ///
    /// Reloaded pods and containers are valid. Containers whose pod record
    /// is missing are skipped.
    pub fn open(dir: impl Into<PathBuf>) -> CorralResult<Self> {
        let records = RecordStore::new(dir);
        let mut inner = StateInner::default();

        for id in records.list_pods()? {
            let record = records.load_pod(&id)?;
            let pod = Pod::restore(record.id, record.config, record.state, record.lock_file);
            inner.check_new_pod(&pod)?;
            inner.link_pod(Arc::new(pod));
        }

        // Link containers without dependency checks: records come back in ID
        // order, not creation order.
        for id in records.list_containers()? {
            let record = records.load_container(&id)?;
            if let Some(pod) = record.config.pod.as_ref() {
                if !inner.pods.contains_key(pod) {
                    tracing::warn!(container_id = %id, pod_id = %pod, "Skipping container of unknown pod");
                    continue;
                }
            }
            let ctr = Container::restore(record.config, record.state, record.lock_file);
            inner.link_container(Arc::new(ctr));
        }

        tracing::info!(
            path = %records.dir().display(),
            pods = inner.pods.len(),
            containers = inner.containers.len(),
            "Loaded state records"
        );

        Ok(Self {
            inner: RwLock::new(inner),
            records: Some(records),
        })
    }

    /// Record store backing this state, if any.
    #[must_use]
    pub const fn records(&self) -> Option<&RecordStore> {
        self.records.as_ref()
    }
}

impl StateStore for InMemoryState {
    fn add_pod(&self, pod: Arc<Pod>) -> CorralResult<()> {
        let mut inner = self.inner.write();
        inner.check_new_pod(&pod)?;

        if let Some(records) = &self.records {
            records.save_pod(&PodRecord {
                id: pod.id().clone(),
                config: pod.config().clone(),
                state: pod.state(),
                lock_file: pod.lock_file().map(PathBuf::from),
            })?;
        }

        inner.link_pod(pod);
        Ok(())
    }

    fn remove_pod(&self, pod: &Pod) -> CorralResult<()> {
        let mut inner = self.inner.write();
        let Some(members) = inner.pod_members.get(pod.id()) else {
            return Err(CorralError::PodNotFound {
                id: pod.id().to_string(),
            });
        };
        if !members.is_empty() {
            return Err(CorralError::PodNotEmpty {
                id: pod.id().to_string(),
                count: members.len(),
            });
        }

        if let Some(records) = &self.records {
            records.delete_pod(pod.id().as_str())?;
        }

        inner.pod_members.remove(pod.id());
        inner.pods.remove(pod.id());
        inner.pod_names.remove(pod.name());
        Ok(())
    }

    fn pod(&self, id: &str) -> CorralResult<Arc<Pod>> {
        if id.is_empty() {
            return Err(CorralError::invalid_argument("pod ID must not be empty"));
        }
        self.inner
            .read()
            .pods
            .get(id)
            .cloned()
            .ok_or_else(|| CorralError::PodNotFound { id: id.to_string() })
    }

    fn has_pod(&self, id: &str) -> CorralResult<bool> {
        if id.is_empty() {
            return Err(CorralError::invalid_argument("pod ID must not be empty"));
        }
        Ok(self.inner.read().pods.contains_key(id))
    }

    fn lookup_pod(&self, id_or_name: &str) -> CorralResult<Arc<Pod>> {
        if id_or_name.is_empty() {
            return Err(CorralError::invalid_argument(
                "must provide a non-empty pod name or ID",
            ));
        }

        let inner = self.inner.read();
        if let Some(pod) = inner.pods.get(id_or_name) {
            return Ok(Arc::clone(pod));
        }
        if let Some(pod) = inner
            .pod_names
            .get(id_or_name)
            .and_then(|id| inner.pods.get(id))
        {
            return Ok(Arc::clone(pod));
        }

        let mut matches = inner
            .pods
            .iter()
            .filter(|(id, _)| id.as_str().starts_with(id_or_name))
            .map(|(_, pod)| pod);
        match (matches.next(), matches.next()) {
            (Some(pod), None) => Ok(Arc::clone(pod)),
            (None, _) => Err(CorralError::PodNotFound {
                id: id_or_name.to_string(),
            }),
            (Some(_), Some(_)) => Err(CorralError::AmbiguousId {
                prefix: id_or_name.to_string(),
                matches: 2 + matches.count(),
            }),
        }
    }

    fn all_pods(&self) -> CorralResult<Vec<Arc<Pod>>> {
        let mut pods: Vec<_> = self.inner.read().pods.values().cloned().collect();
        pods.sort_by(|a, b| {
            a.config()
                .created_at
                .cmp(&b.config().created_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(pods)
    }

    fn add_container(&self, ctr: Arc<Container>) -> CorralResult<()> {
        let mut inner = self.inner.write();
        inner.check_new_container(&ctr)?;

        if let Some(records) = &self.records {
            records.save_container(&ContainerRecord {
                config: ctr.config().clone(),
                state: ctr.state(),
                lock_file: ctr.lock_file().map(PathBuf::from),
            })?;
        }

        inner.link_container(ctr);
        Ok(())
    }

    fn container(&self, id: &str) -> CorralResult<Arc<Container>> {
        self.inner
            .read()
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| CorralError::ContainerNotFound { id: id.to_string() })
    }

    fn save_container(&self, ctr: &LockedContainer<'_>) -> CorralResult<()> {
        let inner = self.inner.read();
        if !inner.containers.contains_key(ctr.id().as_str()) {
            return Err(CorralError::ContainerNotFound {
                id: ctr.id().to_string(),
            });
        }

        if let Some(records) = &self.records {
            let container = ctr.container();
            records.save_container(&ContainerRecord {
                config: container.config().clone(),
                state: ctr.state().clone(),
                lock_file: container.lock_file().map(PathBuf::from),
            })?;
        }
        Ok(())
    }

    fn has_container(&self, id: &str) -> CorralResult<bool> {
        Ok(self.inner.read().containers.contains_key(id))
    }

    fn pod_containers(&self, pod: &Pod) -> CorralResult<Vec<Arc<Container>>> {
        let inner = self.inner.read();
        let members = inner
            .pod_members
            .get(pod.id())
            .ok_or_else(|| CorralError::PodNotFound {
                id: pod.id().to_string(),
            })?;
        Ok(members
            .iter()
            .filter_map(|id| inner.containers.get(id).cloned())
            .collect())
    }

    fn remove_pod_containers(&self, pod: &Pod) -> CorralResult<()> {
        let mut inner = self.inner.write();
        let members = inner
            .pod_members
            .get(pod.id())
            .cloned()
            .ok_or_else(|| CorralError::PodNotFound {
                id: pod.id().to_string(),
            })?;

        for id in &members {
            let outside = inner
                .dependents
                .get(id)
                .and_then(|deps| deps.iter().find(|dep| !members.contains(*dep)));
            if let Some(dependent) = outside {
                return Err(CorralError::DependencyViolation {
                    container: id.to_string(),
                    dependent: dependent.to_string(),
                    pod: pod.id().to_string(),
                });
            }
        }

        if let Some(records) = &self.records {
            for id in &members {
                records.delete_container(id.as_str())?;
            }
        }

        for id in &members {
            inner.unlink_container(id);
        }
        tracing::debug!(pod_id = %pod.id(), count = members.len(), "Removed pod containers from state");
        Ok(())
    }

    fn container_in_use(&self, ctr: &Container) -> CorralResult<Vec<ContainerId>> {
        let inner = self.inner.read();
        if !inner.containers.contains_key(ctr.id()) {
            return Err(CorralError::ContainerNotFound {
                id: ctr.id().to_string(),
            });
        }
        Ok(inner
            .dependents
            .get(ctr.id())
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default())
    }
}
