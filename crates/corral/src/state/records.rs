//! On-disk JSON records of pods and containers.

use std::path::{Path, PathBuf};

use corral_common::{CorralError, CorralResult, PodId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::container::{ContainerConfig, ContainerState};
use crate::pod::{PodConfig, PodState};

const POD_FILE: &str = "pod.json";
const CONTAINER_FILE: &str = "container.json";

/// Persisted form of a pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRecord {
    /// Pod ID.
    pub id: PodId,
    /// Pod configuration.
    pub config: PodConfig,
    /// Pod state at the time of writing.
    pub state: PodState,
    /// Lock file of the pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

/// Persisted form of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    /// Container configuration.
    pub config: ContainerConfig,
    /// Container state at the time of writing.
    pub state: ContainerState,
    /// Lock file of the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

/// Which kind of entity a record describes.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Pod,
    Container,
}

impl Kind {
    const fn dir(self) -> &'static str {
        match self {
            Self::Pod => "pods",
            Self::Container => "containers",
        }
    }

    const fn file(self) -> &'static str {
        match self {
            Self::Pod => POD_FILE,
            Self::Container => CONTAINER_FILE,
        }
    }
}

/// Reads and writes entity records below a state directory.
///
/// Layout: `pods/<id>/pod.json` and `containers/<id>/container.json`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Create a record store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entity_dir(&self, kind: Kind, id: &str) -> PathBuf {
        self.dir.join(kind.dir()).join(id)
    }

    fn record_path(&self, kind: Kind, id: &str) -> PathBuf {
        self.entity_dir(kind, id).join(kind.file())
    }

    /// Write a pod record.
    pub fn save_pod(&self, record: &PodRecord) -> CorralResult<()> {
        self.save(Kind::Pod, record.id.as_str(), record)
    }

    /// Write a container record.
    pub fn save_container(&self, record: &ContainerRecord) -> CorralResult<()> {
        self.save(Kind::Container, record.config.id.as_str(), record)
    }

    /// Read a pod record.
    pub fn load_pod(&self, id: &str) -> CorralResult<PodRecord> {
        self.load(Kind::Pod, id)
            .ok_or_else(|| CorralError::PodNotFound { id: id.to_string() })?
    }

    /// Read a container record.
    pub fn load_container(&self, id: &str) -> CorralResult<ContainerRecord> {
        self.load(Kind::Container, id)
            .ok_or_else(|| CorralError::ContainerNotFound { id: id.to_string() })?
    }

    /// Delete a pod record. Missing records are ignored.
    pub fn delete_pod(&self, id: &str) -> CorralResult<()> {
        self.delete(Kind::Pod, id)
    }

    /// Delete a container record. Missing records are ignored.
    pub fn delete_container(&self, id: &str) -> CorralResult<()> {
        self.delete(Kind::Container, id)
    }

    /// IDs of all stored pod records.
    pub fn list_pods(&self) -> CorralResult<Vec<String>> {
        self.list(Kind::Pod)
    }

    /// IDs of all stored container records.
    pub fn list_containers(&self) -> CorralResult<Vec<String>> {
        self.list(Kind::Container)
    }

    fn save<T: Serialize>(&self, kind: Kind, id: &str, value: &T) -> CorralResult<()> {
        let path = self.record_path(kind, id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Records are replaced atomically.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(id, kind = kind.dir(), path = %path.display(), "Saved record");
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, kind: Kind, id: &str) -> Option<CorralResult<T>> {
        let path = self.record_path(kind, id);
        let json = match std::fs::read(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => return Some(Err(e.into())),
        };

        let record = serde_json::from_slice(&json).map_err(|e| {
            CorralError::Serialization(format!("corrupt record {}: {e}", path.display()))
        });
        Some(record)
    }

    fn delete(&self, kind: Kind, id: &str) -> CorralResult<()> {
        let dir = self.entity_dir(kind, id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(id, kind = kind.dir(), path = %dir.display(), "Deleted record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, kind: Kind) -> CorralResult<Vec<String>> {
        let dir = self.dir.join(kind.dir());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().join(kind.file()).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pod_record(id: &str) -> PodRecord {
        PodRecord {
            id: PodId::new(id).unwrap(),
            config: PodConfig {
                name: format!("{id}-name"),
                ..PodConfig::default()
            },
            state: PodState::default(),
            lock_file: None,
        }
    }

    #[test]
    fn save_and_load_pod() {
        let temp = tempdir().unwrap();
        let records = RecordStore::new(temp.path());

        records.save_pod(&pod_record("pod1")).unwrap();
        let loaded = records.load_pod("pod1").unwrap();
        assert_eq!(loaded.config.name, "pod1-name");
        assert!(temp.path().join("pods/pod1/pod.json").is_file());
    }

    #[test]
    fn missing_records_are_not_found() {
        let temp = tempdir().unwrap();
        let records = RecordStore::new(temp.path());

        assert!(matches!(
            records.load_pod("nope"),
            Err(CorralError::PodNotFound { .. })
        ));
        assert!(matches!(
            records.load_container("nope"),
            Err(CorralError::ContainerNotFound { .. })
        ));
        assert!(records.list_pods().unwrap().is_empty());
        records.delete_pod("nope").unwrap();
    }

    #[test]
    fn list_and_delete() {
        let temp = tempdir().unwrap();
        let records = RecordStore::new(temp.path());

        records.save_pod(&pod_record("pod2")).unwrap();
        records.save_pod(&pod_record("pod1")).unwrap();
        let config = ContainerConfig::new("web");
        let id = config.id.to_string();
        records
            .save_container(&ContainerRecord {
                config,
                state: ContainerState::default(),
                lock_file: None,
            })
            .unwrap();

        assert_eq!(records.list_pods().unwrap(), vec!["pod1", "pod2"]);
        assert_eq!(records.list_containers().unwrap(), vec![id.clone()]);

        records.delete_pod("pod1").unwrap();
        records.delete_container(&id).unwrap();
        assert_eq!(records.list_pods().unwrap(), vec!["pod2"]);
        assert!(records.list_containers().unwrap().is_empty());
    }

    #[test]
    fn corrupt_record_is_a_serialization_error() {
        let temp = tempdir().unwrap();
        let records = RecordStore::new(temp.path());
        std::fs::create_dir_all(temp.path().join("pods/bad")).unwrap();
        std::fs::write(temp.path().join("pods/bad/pod.json"), "{").unwrap();

        assert!(matches!(
            records.load_pod("bad"),
            Err(CorralError::Serialization(_))
        ));
    }
}
