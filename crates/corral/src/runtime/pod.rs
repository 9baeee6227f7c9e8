//! Pod creation and registry queries.

use std::sync::Arc;

use chrono::Utc;
use corral_common::names::random_name;
use corral_common::{CorralError, CorralResult, PodId};

use super::{Runtime, RuntimeEvent};
use crate::cgroup::CgroupManager;
use crate::pod::{Pod, PodConfig, PodCreateOption, PodFilter, PodState};

/// How many random names to try before giving up.
const MAX_NAME_ATTEMPTS: usize = 128;

impl Runtime {
    /// Create a pod from an ordered list of options.
    ///
    /// Options run against a default configuration; the first failure aborts
    /// creation and nothing is stored. A missing name is generated. The cgroup
    /// parent is checked against the configured cgroup manager.
    pub fn new_pod(&self, options: Vec<PodCreateOption>) -> CorralResult<Arc<Pod>> {
        let _runtime = self.acquire_exclusive()?;

        let id = PodId::generate();
        let lock_file = self.config.paths.pod_lock(id.as_str());

        let mut config = PodConfig::default();
        for option in options {
            option(&mut config)
                .map_err(|e| CorralError::backend("error running pod create option", e))?;
        }

        if config.name.is_empty() {
            config.name = self.generate_pod_name()?;
        }

        let manager = self.config.cgroup_manager;
        config.cgroup_parent =
            manager.resolve_parent(&config.cgroup_parent, &self.config.cgroup_parents)?;

        let mut state = PodState::default();
        if config.use_pod_cgroup {
            state.cgroup_path = Some(CgroupManager::pod_cgroup_path(&config.cgroup_parent, &id));
        }

        let pod = Arc::new(Pod::new(id, config, state, Some(lock_file)));
        pod.lock()?.mark_valid();

        if let Err(e) = self.state.add_pod(Arc::clone(&pod)) {
            if let Ok(mut locked) = pod.lock() {
                locked.invalidate();
            }
            return Err(e);
        }

        tracing::info!(
            pod_id = %pod.id(),
            name = pod.name(),
            cgroup_manager = %manager,
            cgroup_parent = %pod.config().cgroup_parent,
            cgroup_path = ?pod.cgroup_path(),
            "Created pod"
        );
        self.events.publish(RuntimeEvent::PodCreated {
            id: pod.id().to_string(),
            name: pod.name().to_string(),
            timestamp: Utc::now(),
        });
        Ok(pod)
    }

    fn generate_pod_name(&self) -> CorralResult<String> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = random_name();
            match self.state.lookup_pod(&name) {
                Err(e) if e.is_not_found() => return Ok(name),
                Ok(_) | Err(CorralError::AmbiguousId { .. }) => {
                    tracing::debug!(name = %name, "Generated pod name already taken");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CorralError::Internal {
            message: format!("could not generate a unique pod name in {MAX_NAME_ATTEMPTS} attempts"),
        })
    }

    /// Pod by full ID.
    pub fn get_pod(&self, id: &str) -> CorralResult<Arc<Pod>> {
        let _runtime = self.acquire_shared()?;
        self.state.pod(id)
    }

    /// Whether a pod with this full ID exists.
    pub fn has_pod(&self, id: &str) -> CorralResult<bool> {
        let _runtime = self.acquire_shared()?;
        self.state.has_pod(id)
    }

    /// Pod by full ID, name, or unique ID prefix.
    pub fn lookup_pod(&self, id_or_name: &str) -> CorralResult<Arc<Pod>> {
        let _runtime = self.acquire_shared()?;
        self.state.lookup_pod(id_or_name)
    }

    /// Every pod accepted by all `filters`, ordered by creation time.
    pub fn pods(&self, filters: &[PodFilter<'_>]) -> CorralResult<Vec<Arc<Pod>>> {
        let _runtime = self.acquire_shared()?;
        let mut pods = self.state.all_pods()?;
        pods.retain(|pod| filters.iter().all(|filter| filter(pod.as_ref())));
        Ok(pods)
    }
}
