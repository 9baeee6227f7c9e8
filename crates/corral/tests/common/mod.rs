//! Shared fixtures: recording backends and a runtime wired to them.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use corral::cgroup::{Cgroup, CgroupBackend, CgroupError, CgroupManager, CgroupVersion};
use corral::container::{ContainerConfig, ContainerState, ContainerStatus};
use corral::oci::OciRuntime;
use corral::state::{InMemoryState, StateStore};
use corral::{Container, Pod, Runtime, RuntimeConfig};
use corral_common::{CorralError, CorralResult};
use parking_lot::Mutex;
use tempfile::TempDir;

/// One backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub container: String,
}

/// OCI backend that records calls and applies trivial state changes.
#[derive(Debug, Default)]
pub struct MockOci {
    calls: Mutex<Vec<Call>>,
    fail_on: Mutex<Option<(&'static str, String)>>,
}

impl MockOci {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls of one kind, as container IDs in call order.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.container.clone())
            .collect()
    }

    /// Whether any call other than `sync` was made.
    pub fn mutated(&self) -> bool {
        self.calls.lock().iter().any(|call| call.op != "sync")
    }

    /// Make `op` fail for `container`.
    pub fn fail_on(&self, op: &'static str, container: &Container) {
        *self.fail_on.lock() = Some((op, container.id().to_string()));
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock() = None;
    }

    fn record(&self, op: &'static str, ctr: &ContainerConfig) -> CorralResult<()> {
        self.calls.lock().push(Call {
            op,
            container: ctr.id.to_string(),
        });
        match &*self.fail_on.lock() {
            Some((fail_op, id)) if *fail_op == op && *id == ctr.id.as_str() => {
                Err(CorralError::Internal {
                    message: format!("injected {op} failure"),
                })
            }
            _ => Ok(()),
        }
    }
}

impl OciRuntime for MockOci {
    fn name(&self) -> &str {
        "mock"
    }

    fn sync(&self, ctr: &ContainerConfig, _state: &mut ContainerState) -> CorralResult<()> {
        self.record("sync", ctr)
    }

    fn stop(
        &self,
        ctr: &ContainerConfig,
        state: &mut ContainerState,
        _timeout: Duration,
    ) -> CorralResult<()> {
        self.record("stop", ctr)?;
        state.set_stopped();
        Ok(())
    }

    fn stop_exec_sessions(
        &self,
        ctr: &ContainerConfig,
        state: &mut ContainerState,
        _timeout: Duration,
    ) -> CorralResult<()> {
        self.record("stop_exec_sessions", ctr)?;
        state.exec_sessions.clear();
        Ok(())
    }

    fn cleanup(&self, ctr: &ContainerConfig, _state: &mut ContainerState) -> CorralResult<()> {
        self.record("cleanup", ctr)
    }

    fn teardown_storage(
        &self,
        ctr: &ContainerConfig,
        _state: &mut ContainerState,
    ) -> CorralResult<()> {
        self.record("teardown_storage", ctr)
    }

    fn delete(&self, ctr: &ContainerConfig, _state: &mut ContainerState) -> CorralResult<()> {
        self.record("delete", ctr)
    }
}

#[derive(Debug, Default)]
struct CgroupTable {
    existing: BTreeSet<String>,
    loads: Vec<String>,
    deleted: Vec<String>,
    fail_delete: bool,
}

/// Cgroup backend over an in-memory set of paths.
#[derive(Debug, Default)]
pub struct MockCgroups {
    table: Arc<Mutex<CgroupTable>>,
}

impl MockCgroups {
    pub fn create(&self, path: &str) {
        self.table.lock().existing.insert(path.to_string());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.table.lock().existing.contains(path)
    }

    pub fn loads(&self) -> Vec<String> {
        self.table.lock().loads.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.table.lock().deleted.clone()
    }

    pub fn fail_deletes(&self) {
        self.table.lock().fail_delete = true;
    }
}

impl CgroupBackend for MockCgroups {
    fn load(&self, _version: CgroupVersion, path: &str) -> Result<Box<dyn Cgroup>, CgroupError> {
        let mut table = self.table.lock();
        table.loads.push(path.to_string());
        if !table.existing.contains(path) {
            return Err(CgroupError::Deleted {
                path: path.to_string(),
            });
        }
        Ok(Box::new(MockCgroup {
            path: path.to_string(),
            table: Arc::clone(&self.table),
        }))
    }
}

#[derive(Debug)]
struct MockCgroup {
    path: String,
    table: Arc<Mutex<CgroupTable>>,
}

impl Cgroup for MockCgroup {
    fn path(&self) -> &str {
        &self.path
    }

    fn delete(&self) -> Result<(), CgroupError> {
        let mut table = self.table.lock();
        if table.fail_delete {
            return Err(CgroupError::Io {
                path: self.path.clone().into(),
                source: std::io::Error::from(std::io::ErrorKind::ResourceBusy),
            });
        }
        if !table.existing.remove(&self.path) {
            return Err(CgroupError::Deleted {
                path: self.path.clone(),
            });
        }
        table.deleted.push(self.path.clone());
        Ok(())
    }
}

/// A runtime over mock backends in a scratch directory.
pub struct Harness {
    pub runtime: Runtime,
    pub oci: Arc<MockOci>,
    pub cgroups: Arc<MockCgroups>,
    pub state: Arc<InMemoryState>,
    pub temp: TempDir,
}

impl Harness {
    /// Members of `pod` according to the store; zero once the pod is gone.
    pub fn state_members(&self, pod: &Pod) -> usize {
        self.state.pod_containers(pod).map_or(0, |members| members.len())
    }
}

pub fn harness(manager: CgroupManager) -> Harness {
    build_harness(manager, |_| InMemoryState::new())
}

/// Like [`harness`], with the store persisting records below the scratch
/// directory's `records/`.
pub fn harness_with_records(manager: CgroupManager) -> Harness {
    build_harness(manager, |dir| InMemoryState::with_records(dir.join("records")))
}

fn build_harness(manager: CgroupManager, store: impl FnOnce(&Path) -> InMemoryState) -> Harness {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = RuntimeConfig::default()
        .with_root(temp.path().join("corral"))
        .with_cgroup_manager(manager)
        .with_cgroup_version(CgroupVersion::V2)
        .with_stop_timeout(1);

    let state = Arc::new(store(temp.path()));
    let oci = Arc::new(MockOci::default());
    let cgroups = Arc::new(MockCgroups::default());
    let runtime = Runtime::with_backends(config, state.clone(), oci.clone(), cgroups.clone());

    Harness {
        runtime,
        oci,
        cgroups,
        state,
        temp,
    }
}

/// Add a container to `pod` and force it into `status`.
pub fn add_member(
    runtime: &Runtime,
    pod: &Pod,
    name: &str,
    status: ContainerStatus,
) -> CorralResult<Arc<Container>> {
    add_container(runtime, ContainerConfig::new(name).in_pod(pod.id()), status)
}

/// Register `config` and force the container into `status`.
pub fn add_container(
    runtime: &Runtime,
    config: ContainerConfig,
    status: ContainerStatus,
) -> CorralResult<Arc<Container>> {
    let ctr = runtime.add_container(config)?;
    {
        let mut locked = ctr.lock()?;
        let state = locked.state_mut();
        match status {
            ContainerStatus::Running => state.set_running(4242),
            ContainerStatus::Paused => {
                state.set_running(4242);
                state.set_paused();
            }
            ContainerStatus::Created => state.set_created(),
            ContainerStatus::Stopped => state.set_stopped(),
            ContainerStatus::Exited => state.set_exited(Some(0)),
            ContainerStatus::Unknown => state.set_unknown(),
            ContainerStatus::Configured => state.set_configured(),
        }
    }
    Ok(ctr)
}
