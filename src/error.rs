//! Error types for each subsystem. The CLI boundary (`main.rs`) converts all
//! of these into `anyhow::Error` with added context, the same split the
//! teacher uses between `libcontainer`'s `thiserror` enums and `youki`'s
//! `anyhow`-based command layer.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("failed to open bundle config {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse bundle config {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid bundle spec: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open state file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse state file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write state file {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("container {0} not found")]
    NotFound(String),
    #[error("container {0} already exists")]
    AlreadyExists(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to open namespace path {path:?}")]
    OpenNamespace {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("failed to create namespace(s): {0}")]
    Unshare(nix::Error),
    #[error("failed to join namespace: {0}")]
    SetNs(nix::Error),
    #[error("failed to fork init process: {0}")]
    Fork(nix::Error),
    #[error("failed to set up mounts: {0}")]
    Mount(String),
    #[error("failed to pivot root: {0}")]
    PivotRoot(String),
    #[error("failed to allocate terminal: {0}")]
    Terminal(nix::Error),
    #[error("failed to execute {0:?}: {1}")]
    Exec(PathBuf, nix::Error),
    #[error("sync channel error: {0}")]
    Channel(String),
    #[error("child reported failure: {0}")]
    ChildFailed(String),
    #[error(transparent)]
    Cgroup(#[from] CgroupError),
    #[error("failed to write id mapping for pid {pid}: {source}")]
    IdMapping { pid: i32, source: std::io::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum CgroupError {
    #[error("failed to create cgroup directory {path:?}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to attach pid to cgroup {path:?}")]
    Attach {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("could not determine or create the state directory: {0}")]
    StateDir(std::io::Error),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Cgroup(#[from] CgroupError),
    #[error("container {id} is in state {status}, which does not permit {verb}")]
    IncorrectStatus {
        id: String,
        status: &'static str,
        verb: &'static str,
    },
    #[error("runtime mode {0:?} is not implemented by this runtime")]
    UnsupportedMode(crate::record::Mode),
    #[error("--attach and --detach are mutually exclusive")]
    ConflictingAttachDetach,
    #[error("--rm is only valid for `run` in attached mode")]
    InvalidRm,
    #[error("{0}")]
    Wait(String),
}
