//! Pods: named groups of containers sharing lifecycle and, optionally, a
//! cgroup.
//!
//! A pod owns no container list. Membership is recorded by the state store
//! and resolved on demand.

pub mod filter;
mod options;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corral_common::{CorralError, CorralResult, PodId};
use serde::{Deserialize, Serialize};

use crate::lock::{EntityGuard, EntityLock};

pub use filter::PodFilter;
pub use options::{PodCreateOption, with_cgroup_parent, with_labels, with_name, with_pod_cgroup};

/// Pod configuration, fixed once the pod is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodConfig {
    /// Human-readable name. Generated when left empty.
    pub name: String,
    /// Cgroup parent of the pod. Empty means the manager's default.
    #[serde(default)]
    pub cgroup_parent: String,
    /// Whether the pod owns a cgroup shared by its containers.
    #[serde(default)]
    pub use_pod_cgroup: bool,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            cgroup_parent: String::new(),
            use_pod_cgroup: false,
            labels: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// Mutable pod state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodState {
    /// Cgroup owned by the pod; set only when `use_pod_cgroup` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgroup_path: Option<String>,
}

/// Lock-protected part of a pod.
#[derive(Debug)]
pub struct PodInner {
    valid: bool,
    state: PodState,
}

/// A pod known to the runtime.
#[derive(Debug)]
pub struct Pod {
    id: PodId,
    config: PodConfig,
    inner: EntityLock<PodInner>,
}

impl Pod {
    /// Allocate a pod. It is not valid until the runtime finishes creating it.
    pub fn new(id: PodId, config: PodConfig, state: PodState, lock_file: Option<PathBuf>) -> Self {
        Self::from_parts(id, config, state, lock_file, false)
    }

    /// Rebuild a registered pod from a persisted record.
    pub fn restore(id: PodId, config: PodConfig, state: PodState, lock_file: Option<PathBuf>) -> Self {
        Self::from_parts(id, config, state, lock_file, true)
    }

    fn from_parts(
        id: PodId,
        config: PodConfig,
        state: PodState,
        lock_file: Option<PathBuf>,
        valid: bool,
    ) -> Self {
        Self {
            id,
            config,
            inner: EntityLock::new(PodInner { valid, state }, lock_file),
        }
    }

    /// ID accessor.
    #[must_use]
    pub fn id(&self) -> &PodId {
        &self.id
    }

    /// Name accessor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Full configuration.
    #[must_use]
    pub fn config(&self) -> &PodConfig {
        &self.config
    }

    /// Label value, if set.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.config.labels.get(key).map(String::as_str)
    }

    /// Lock file used for inter-process coordination.
    #[must_use]
    pub fn lock_file(&self) -> Option<&Path> {
        self.inner.lock_file()
    }

    /// Acquire the pod lock.
    pub fn lock(&self) -> CorralResult<LockedPod<'_>> {
        Ok(LockedPod {
            pod: self,
            guard: self.inner.lock()?,
        })
    }

    /// Snapshot of the mutable state.
    ///
    /// Must not be called while holding this pod's lock.
    #[must_use]
    pub fn state(&self) -> PodState {
        self.inner.peek(|inner| inner.state.clone())
    }

    /// Cgroup owned by the pod. Same locking caveat as [`Pod::state`].
    #[must_use]
    pub fn cgroup_path(&self) -> Option<String> {
        self.inner.peek(|inner| inner.state.cgroup_path.clone())
    }

    /// Whether the pod is still usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.peek(|inner| inner.valid)
    }
}

/// A pod whose lock is held.
#[derive(Debug)]
pub struct LockedPod<'a> {
    pod: &'a Pod,
    guard: EntityGuard<'a, PodInner>,
}

impl<'a> LockedPod<'a> {
    /// The locked pod.
    #[must_use]
    pub const fn pod(&self) -> &'a Pod {
        self.pod
    }

    /// ID accessor.
    #[must_use]
    pub fn id(&self) -> &'a PodId {
        &self.pod.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &PodState {
        &self.guard.state
    }

    /// Whether the pod is still usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.guard.valid
    }

    /// Fail with [`CorralError::PodRemoved`] if the pod has been retired.
    pub fn ensure_valid(&self) -> CorralResult<()> {
        if self.guard.valid {
            Ok(())
        } else {
            Err(CorralError::PodRemoved {
                id: self.pod.id.to_string(),
            })
        }
    }

    pub(crate) fn mark_valid(&mut self) {
        self.guard.valid = true;
    }

    /// Permanently retire the pod object and drop its lock file.
    pub fn invalidate(&mut self) {
        self.guard.valid = false;
        self.guard.discard_lock_file();
    }
}
