//! Persistent container identity: the `ContainerRecord` and the on-disk
//! `RecordStore` that saves/loads/lists/deletes it.
//!
//! Grounded in `libcontainer::container::state::State` (encoding, atomic
//! save) and `libcontainer::container::container::Container` (the in-memory
//! wrapper around it), collapsed into a single record type since this
//! runtime does not need the teacher's separate `YoukiConfig` side-channel.
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

const STATE_FILE_NAME: &str = "state.json";
const STATE_FILE_TMP_NAME: &str = "state.json.tmp";

/// `container | vm`. Fixed at create time and never mutates (§3 invariant 4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Container,
    Vm,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Container => write!(f, "container"),
            Mode::Vm => write!(f, "vm"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(Mode::Container),
            "vm" => Ok(Mode::Vm),
            other => Err(format!("unrecognised runtime mode {other:?}")),
        }
    }
}

/// `created | running | stopped | paused`. `paused` is representable but no
/// transition in this runtime enters it (reserved for forward
/// compatibility per `spec.md` §9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Created,
    Running,
    Stopped,
    Paused,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Created => "created",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

/// Per-container row in the state directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub bundle_path: PathBuf,
    pub mode: Mode,
    pub status: Status,
    /// OS pid of the init process when `status = running`; 0 otherwise (§3
    /// invariant 2).
    pub init_pid: i32,
    pub created: Option<DateTime<Utc>>,
}

impl ContainerRecord {
    pub fn new(id: impl Into<String>, bundle_path: PathBuf, mode: Mode) -> Self {
        ContainerRecord {
            id: id.into(),
            bundle_path,
            mode,
            status: Status::Created,
            init_pid: 0,
            created: Some(Utc::now()),
        }
    }

    pub fn set_running(&mut self, pid: i32) {
        self.status = Status::Running;
        self.init_pid = pid;
    }

    pub fn set_stopped(&mut self) {
        self.status = Status::Stopped;
        self.init_pid = 0;
    }
}

/// Filesystem-backed store: one subdirectory per container under the
/// resolved state directory, holding `state.json`.
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: PathBuf) -> Self {
        RecordStore { root }
    }

    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn state_file(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(STATE_FILE_NAME)
    }

    /// Only filename-safe ids are accepted (§3), since the id becomes a
    /// literal path component.
    pub fn validate_id(id: &str) -> Result<(), StateError> {
        let ok = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && id != "."
            && id != "..";
        if ok {
            Ok(())
        } else {
            Err(StateError::NotFound(format!(
                "{id} is not a filename-safe container id"
            )))
        }
    }

    /// Exclusive-create semantics: `fs::create_dir` (not `create_dir_all`)
    /// fails with `AlreadyExists` if a concurrent `create` already claimed
    /// this id, which is the serialization point the spec's §5 shared
    /// resource guarantee (ii) relies on.
    pub fn create(&self, record: &ContainerRecord) -> Result<(), StateError> {
        Self::validate_id(&record.id)?;
        let dir = self.container_dir(&record.id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StateError::AlreadyExists(record.id.clone()));
            }
            Err(err) => {
                return Err(StateError::Write {
                    path: dir,
                    source: err,
                });
            }
        }
        self.save(record)
    }

    /// Atomic write: write-temp-then-rename, so a concurrent reader never
    /// observes a partial record (§5 ordering guarantee 2).
    pub fn save(&self, record: &ContainerRecord) -> Result<(), StateError> {
        let dir = self.container_dir(&record.id);
        let tmp_path = dir.join(STATE_FILE_TMP_NAME);
        let final_path = dir.join(STATE_FILE_NAME);

        let file = File::create(&tmp_path).map_err(|err| StateError::Write {
            path: tmp_path.clone(),
            source: err,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record).map_err(|err| StateError::Parse {
            path: tmp_path.clone(),
            source: err,
        })?;
        writer.flush().map_err(|err| StateError::Write {
            path: tmp_path.clone(),
            source: err,
        })?;
        drop(writer);

        fs::rename(&tmp_path, &final_path).map_err(|err| StateError::Write {
            path: final_path,
            source: err,
        })?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<ContainerRecord, StateError> {
        let path = self.state_file(id);
        let file = File::open(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StateError::NotFound(id.to_string())
            } else {
                StateError::Open {
                    path: path.clone(),
                    source: err,
                }
            }
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| StateError::Parse {
            path,
            source: err,
        })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state_file(id).is_file()
    }

    /// Idempotent except that a missing record returns `Ok(false)` rather
    /// than an error during `delete` (the CLI still proceeds to cgroup
    /// cleanup in that case, per `spec.md` §4.3).
    pub fn delete(&self, id: &str) -> Result<bool, StateError> {
        let dir = self.container_dir(id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|err| StateError::Write {
            path: dir,
            source: err,
        })?;
        Ok(true)
    }

    pub fn list_ids(&self) -> Result<Vec<String>, StateError> {
        let mut ids = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(err) => {
                return Err(StateError::Open {
                    path: self.root.clone(),
                    source: err,
                })
            }
        };
        for entry in entries {
            let entry = entry.map_err(|err| StateError::Open {
                path: self.root.clone(),
                source: err,
            })?;
            if entry.path().join(STATE_FILE_NAME).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }
}
