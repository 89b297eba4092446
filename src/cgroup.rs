//! Cgroup Manager: creates/attaches a cgroup for a container, removes it on
//! delete. Grounded in `libcgroups::v2::manager::Manager` and
//! `libcgroups::stub::v2::manager::Manager`, reduced to the cgroup v2 unified
//! hierarchy only (`spec.md` Non-goals exclude v1/systemd transient units and
//! resource-limit enforcement — creation/attachment/cleanup is all that's
//! asked for).
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::error::CgroupError;

const CGROUP_MOUNT: &str = "/sys/fs/cgroup";
const CGROUP_PROCS: &str = "cgroup.procs";
const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";
const RUNTIME_PARENT: &str = "nano-sandbox";

/// `attach`/`cleanup` are the only operations `spec.md` §4.5 asks for.
pub trait CgroupManager {
    fn attach(&self, pid: Pid) -> Result<(), CgroupError>;
    fn cleanup(&self) -> Result<(), CgroupError>;
}

/// Real cgroup v2 manager rooted at `<CGROUP_MOUNT>/nano-sandbox/<id>`.
pub struct UnifiedManager {
    full_path: PathBuf,
}

impl UnifiedManager {
    pub fn new(id: &str) -> Self {
        UnifiedManager {
            full_path: Path::new(CGROUP_MOUNT).join(RUNTIME_PARENT).join(id),
        }
    }

    /// Detects whether cgroup v2 is actually mounted here. When it isn't
    /// (e.g. this execution environment, or containerized CI), callers fall
    /// back to `NoopManager` so the rest of the lifecycle stays testable.
    pub fn available() -> bool {
        Path::new(CGROUP_MOUNT).join("cgroup.controllers").is_file()
    }

    fn enable_controllers(path: &Path) -> Result<(), CgroupError> {
        let controllers_file = path.join("cgroup.controllers");
        let available = fs::read_to_string(&controllers_file).unwrap_or_default();
        let controllers: Vec<String> = available
            .split_whitespace()
            .map(|c| format!("+{c}"))
            .collect();
        if controllers.is_empty() {
            return Ok(());
        }
        let enable = controllers.join(" ");
        fs::write(path.join(CGROUP_SUBTREE_CONTROL), enable).map_err(|err| CgroupError::Attach {
            path: path.to_path_buf(),
            source: err,
        })
    }
}

impl CgroupManager for UnifiedManager {
    /// Walks down to `<id>`, creating each missing directory component and
    /// enabling controllers on every ancestor (but not on the leaf itself,
    /// since writing `cgroup.procs` into a node with subtree_control
    /// enabled fails with EBUSY).
    fn attach(&self, pid: Pid) -> Result<(), CgroupError> {
        let mut current = PathBuf::from(CGROUP_MOUNT);
        Self::enable_controllers(&current)?;
        for component in self
            .full_path
            .strip_prefix(CGROUP_MOUNT)
            .unwrap_or(&self.full_path)
            .components()
        {
            current = current.join(component);
            if !current.exists() {
                fs::create_dir(&current).map_err(|err| CgroupError::Create {
                    path: current.clone(),
                    source: err,
                })?;
                let _ = fs::set_permissions(&current, fs::Permissions::from_mode(0o755));
            }
            if current != self.full_path {
                Self::enable_controllers(&current)?;
            }
        }

        fs::write(self.full_path.join(CGROUP_PROCS), pid.to_string().as_bytes()).map_err(
            |err| CgroupError::Attach {
                path: self.full_path.clone(),
                source: err,
            },
        )
    }

    /// Best-effort per `spec.md` §4.5 / §7: must not fail the delete path.
    fn cleanup(&self) -> Result<(), CgroupError> {
        if self.full_path.exists() {
            let _ = fs::remove_dir(&self.full_path);
        }
        Ok(())
    }
}

/// Used when cgroup v2 isn't mounted in the current environment. Attachment
/// and cleanup both succeed trivially, which keeps the lifecycle engine
/// exercisable in unprivileged/sandboxed test environments.
pub struct NoopManager;

impl CgroupManager for NoopManager {
    fn attach(&self, _pid: Pid) -> Result<(), CgroupError> {
        Ok(())
    }

    fn cleanup(&self) -> Result<(), CgroupError> {
        Ok(())
    }
}

pub fn manager_for(id: &str) -> Box<dyn CgroupManager> {
    if UnifiedManager::available() {
        Box::new(UnifiedManager::new(id))
    } else {
        Box::new(NoopManager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_manager_always_succeeds() {
        let mgr = NoopManager;
        mgr.attach(Pid::from_raw(1)).unwrap();
        mgr.cleanup().unwrap();
    }

    #[test]
    fn unified_manager_path_is_scoped_under_runtime_parent() {
        let mgr = UnifiedManager::new("c1");
        assert_eq!(
            mgr.full_path,
            PathBuf::from("/sys/fs/cgroup/nano-sandbox/c1")
        );
    }
}
