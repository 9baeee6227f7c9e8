//! Cgroup manager modes and pod cgroup parent validation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use corral_common::{CorralError, CorralResult, PodId};
use serde::{Deserialize, Serialize};

/// Default cgroup parent for pods under the cgroupfs manager.
pub const CGROUPFS_DEFAULT_PARENT: &str = "/corral_parent";

/// Default cgroup parent for pods under the systemd manager.
pub const SYSTEMD_DEFAULT_PARENT: &str = "machine.slice";

/// Shortest well-formed slice name (`x.slice`).
const MIN_SLICE_LEN: usize = 6;

/// Which subsystem manages cgroups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CgroupManager {
    /// Direct manipulation of the cgroup filesystem.
    #[default]
    Cgroupfs,
    /// Slice units managed by systemd.
    Systemd,
}

/// Default cgroup parents for each manager mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgroupParents {
    /// Parent used by the cgroupfs manager.
    pub cgroupfs: String,
    /// Parent slice used by the systemd manager.
    pub systemd: String,
}

impl Default for CgroupParents {
    fn default() -> Self {
        Self {
            cgroupfs: CGROUPFS_DEFAULT_PARENT.to_string(),
            systemd: SYSTEMD_DEFAULT_PARENT.to_string(),
        }
    }
}

/// Whether the last path component names a systemd slice.
fn is_slice(parent: &str) -> bool {
    Path::new(parent)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".slice"))
}

impl CgroupManager {
    /// Check a requested pod cgroup parent against this manager.
    ///
    /// An empty request resolves to the mode's default parent. A cgroupfs
    /// manager rejects slice parents; a systemd manager accepts nothing but
    /// slices.
    pub fn resolve_parent(self, requested: &str, defaults: &CgroupParents) -> CorralResult<String> {
        match self {
            Self::Cgroupfs => {
                if requested.is_empty() {
                    Ok(defaults.cgroupfs.clone())
                } else if is_slice(requested) {
                    Err(CorralError::invalid_argument(format!(
                        "systemd slice {requested:?} received as cgroup parent when using cgroupfs"
                    )))
                } else {
                    Ok(requested.to_string())
                }
            }
            Self::Systemd => {
                if requested.is_empty() {
                    Ok(defaults.systemd.clone())
                } else if requested.len() < MIN_SLICE_LEN || !is_slice(requested) {
                    Err(CorralError::invalid_argument(format!(
                        "did not receive systemd slice as cgroup parent when using systemd to manage cgroups (got {requested:?})"
                    )))
                } else {
                    Ok(requested.to_string())
                }
            }
        }
    }

    /// Cgroup path owned by a pod: `<parent>/<pod id>`.
    #[must_use]
    pub fn pod_cgroup_path(parent: &str, pod: &PodId) -> String {
        Path::new(parent)
            .join(pod.as_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Name used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cgroupfs => "cgroupfs",
            Self::Systemd => "systemd",
        }
    }
}

impl fmt::Display for CgroupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CgroupManager {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cgroupfs" => Ok(Self::Cgroupfs),
            "systemd" => Ok(Self::Systemd),
            other => Err(CorralError::invalid_argument(format!(
                "unsupported cgroup manager {other:?}: expected \"cgroupfs\" or \"systemd\""
            ))),
        }
    }
}

impl TryFrom<String> for CgroupManager {
    type Error = CorralError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CgroupManager> for String {
    fn from(manager: CgroupManager) -> Self {
        manager.as_str().to_string()
    }
}
