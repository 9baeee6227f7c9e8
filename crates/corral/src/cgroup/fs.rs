//! Filesystem-backed cgroup access.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{CGROUP_ROOT, Cgroup, CgroupBackend, CgroupError, CgroupVersion};

/// Loads cgroups from a cgroup filesystem mounted at `root`.
#[derive(Debug, Clone)]
pub struct FsCgroups {
    root: PathBuf,
}

impl Default for FsCgroups {
    fn default() -> Self {
        Self::new(CGROUP_ROOT)
    }
}

impl FsCgroups {
    /// Create a backend for the hierarchy mounted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The hierarchy root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Controller hierarchies mounted under the root (v1 layout).
    fn controllers(&self, version: CgroupVersion) -> Result<Vec<PathBuf>, CgroupError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CgroupError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut controllers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CgroupError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // The named systemd hierarchy is not ours to touch; the unified
            // mount only counts in hybrid mode.
            if name == "systemd" || (name == "unified" && version != CgroupVersion::Hybrid) {
                continue;
            }
            controllers.push(path);
        }

        controllers.sort();
        Ok(controllers)
    }
}

impl CgroupBackend for FsCgroups {
    fn load(&self, version: CgroupVersion, path: &str) -> Result<Box<dyn Cgroup>, CgroupError> {
        let relative = path.trim_start_matches('/');

        let candidates = match version {
            CgroupVersion::V2 => vec![self.root.join(relative)],
            CgroupVersion::V1 | CgroupVersion::Hybrid => self
                .controllers(version)?
                .into_iter()
                .map(|controller| controller.join(relative))
                .collect(),
        };

        let dirs: Vec<PathBuf> = candidates.into_iter().filter(|d| d.is_dir()).collect();
        if relative.is_empty() || dirs.is_empty() {
            return Err(CgroupError::Deleted {
                path: path.to_string(),
            });
        }

        tracing::debug!(path, %version, hierarchies = dirs.len(), "Loaded cgroup");

        Ok(Box::new(FsCgroup {
            path: path.to_string(),
            dirs,
        }))
    }
}

/// A cgroup present in one or more hierarchies.
#[derive(Debug)]
pub struct FsCgroup {
    path: String,
    dirs: Vec<PathBuf>,
}

impl FsCgroup {
    /// Directories backing this cgroup, one per hierarchy.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

/// Remove a cgroup directory tree, children first.
///
/// Cgroup directories can only be removed with `rmdir`; their control files
/// disappear with them. Directories that vanish concurrently are ignored.
fn remove_tree(dir: &Path) -> Result<bool, CgroupError> {
    let mut removed_any = false;

    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().is_some_and(|io| io.kind() == ErrorKind::NotFound) => continue,
            Err(e) => {
                let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
                return Err(CgroupError::Io {
                    path,
                    source: e.into(),
                });
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        match fs::remove_dir(entry.path()) {
            Ok(()) => removed_any = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CgroupError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                });
            }
        }
    }

    Ok(removed_any)
}

impl Cgroup for FsCgroup {
    fn path(&self) -> &str {
        &self.path
    }

    fn delete(&self) -> Result<(), CgroupError> {
        let mut removed_any = false;
        for dir in &self.dirs {
            removed_any |= remove_tree(dir)?;
        }

        if !removed_any {
            return Err(CgroupError::Deleted {
                path: self.path.clone(),
            });
        }

        tracing::debug!(path = %self.path, "Deleted cgroup");
        Ok(())
    }
}
