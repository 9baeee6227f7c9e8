//! Cgroup management for pods.
//!
//! The runtime validates pod cgroup parents against the configured
//! [`CgroupManager`] and tears pod cgroups down through a [`CgroupBackend`].

mod fs;
mod manager;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use corral_common::CorralError;
use serde::{Deserialize, Serialize};

pub use fs::{FsCgroup, FsCgroups};
pub use manager::{CgroupManager, CgroupParents};

/// Default cgroup filesystem mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Cgroup hierarchy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupVersion {
    /// Cgroups v1 (legacy, one hierarchy per controller).
    V1,
    /// Cgroups v2 (unified).
    V2,
    /// Hybrid mode (v1 controllers plus a v2 `unified` mount).
    Hybrid,
}

impl CgroupVersion {
    /// Detect the cgroup version of the host.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_at(Path::new(CGROUP_ROOT))
    }

    /// Detect the cgroup version of a hierarchy mounted at `root`.
    #[must_use]
    pub fn detect_at(root: &Path) -> Self {
        let unified = root.join("cgroup.controllers").exists();
        let legacy = root.join("cpu").exists();

        match (unified, legacy) {
            (true, false) => Self::V2,
            (true, true) => Self::Hybrid,
            _ => {
                if root.join("unified").join("cgroup.controllers").exists() {
                    Self::Hybrid
                } else {
                    Self::V1
                }
            }
        }
    }
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for CgroupVersion {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" | "1" => Ok(Self::V1),
            "v2" | "2" => Ok(Self::V2),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(CorralError::invalid_argument(format!(
                "unknown cgroup version {other:?}"
            ))),
        }
    }
}

/// Errors returned by a [`CgroupBackend`].
#[derive(Debug, thiserror::Error)]
pub enum CgroupError {
    /// The cgroup does not exist (any more).
    #[error("cgroup {path} has already been deleted")]
    Deleted {
        /// The cgroup path that was requested.
        path: String,
    },

    /// Filesystem error while operating on the cgroup.
    #[error("cgroup I/O error at {}: {source}", path.display())]
    Io {
        /// The directory being operated on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CgroupError {
    /// Whether this is the recognised "already deleted" outcome.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// A loaded cgroup.
pub trait Cgroup: fmt::Debug + Send {
    /// Path of the cgroup relative to the hierarchy root.
    fn path(&self) -> &str;

    /// Delete the cgroup and any child cgroups.
    fn delete(&self) -> Result<(), CgroupError>;
}

/// Loads cgroups by path.
pub trait CgroupBackend: fmt::Debug + Send + Sync {
    /// Load an existing cgroup.
    ///
    /// Returns [`CgroupError::Deleted`] when no such cgroup exists.
    fn load(&self, version: CgroupVersion, path: &str) -> Result<Box<dyn Cgroup>, CgroupError>;
}
