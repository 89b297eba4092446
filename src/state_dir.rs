//! Decides where per-container state lives.
//!
//! Grounded in `youki::determine_root_path`, reduced to the env-var contract
//! this runtime exposes: `NS_RUN_DIR` (preferred), `NK_RUN_DIR` (compat
//! alias), then a root-vs-user default split on effective uid.
use std::fs;
use std::io;
use std::path::PathBuf;

use nix::unistd::Uid;

use crate::error::LifecycleError;

const NS_RUN_DIR: &str = "NS_RUN_DIR";
const NK_RUN_DIR: &str = "NK_RUN_DIR";
const SYSTEM_STATE_DIR: &str = "/run/nano-sandbox";

/// Pure function of environment + euid. Deliberately not cached: tests flip
/// these env vars between invocations and expect the change to take effect
/// immediately.
pub fn resolve_state_dir() -> PathBuf {
    if let Ok(path) = std::env::var(NS_RUN_DIR) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(NK_RUN_DIR) {
        return PathBuf::from(path);
    }
    if Uid::effective().is_root() {
        return PathBuf::from(SYSTEM_STATE_DIR);
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("nano-sandbox")
                .join("run");
        }
    }
    PathBuf::from("run")
}

/// Ensures the resolved state directory exists (mode 0755), tolerating a
/// concurrent creator. Any other error is fatal to the invocation.
pub fn ensure_state_dir() -> Result<PathBuf, LifecycleError> {
    let dir = resolve_state_dir();
    create_dir_all_0755(&dir).map_err(LifecycleError::StateDir)?;
    Ok(dir)
}

fn create_dir_all_0755(path: &std::path::Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = fs::Permissions::from_mode(0o755);
                fs::set_permissions(path, perms)?;
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(NS_RUN_DIR);
        std::env::remove_var(NK_RUN_DIR);
        std::env::remove_var("HOME");
    }

    #[test]
    #[serial]
    fn prefers_ns_run_dir_over_everything() {
        clear_env();
        std::env::set_var(NS_RUN_DIR, "/tmp/ns-dir");
        std::env::set_var(NK_RUN_DIR, "/tmp/nk-dir");
        assert_eq!(resolve_state_dir(), PathBuf::from("/tmp/ns-dir"));
        clear_env();
    }

    #[test]
    #[serial]
    fn falls_back_to_nk_run_dir() {
        clear_env();
        std::env::set_var(NK_RUN_DIR, "/tmp/nk-dir-2");
        assert_eq!(resolve_state_dir(), PathBuf::from("/tmp/nk-dir-2"));
        clear_env();
    }

    #[test]
    #[serial]
    fn falls_back_to_home_when_not_root() {
        clear_env();
        if Uid::effective().is_root() {
            // running as root, this branch can't be observed; covered separately.
            return;
        }
        std::env::set_var("HOME", "/tmp/home-fixture");
        assert_eq!(
            resolve_state_dir(),
            PathBuf::from("/tmp/home-fixture/.local/share/nano-sandbox/run")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn falls_back_to_relative_run_when_nothing_set() {
        clear_env();
        if Uid::effective().is_root() {
            assert_eq!(resolve_state_dir(), PathBuf::from(SYSTEM_STATE_DIR));
        } else {
            assert_eq!(resolve_state_dir(), PathBuf::from("run"));
        }
    }

    #[test]
    #[serial]
    fn ensure_state_dir_tolerates_already_exists() {
        clear_env();
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var(NS_RUN_DIR, tmp.path());
        ensure_state_dir().unwrap();
        // second call must not error even though the directory now exists
        ensure_state_dir().unwrap();
        clear_env();
    }
}
