//! Bundle Loader: reads and validates an OCI `config.json`, exposing a typed
//! spec. Modeled on `oci-spec::runtime`'s shape (the crate the teacher
//! depends on) but trimmed to the fields `spec.md` §3 requires.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Root {
    pub path: String,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceType {
    Pid,
    Network,
    Ipc,
    Uts,
    Mount,
    User,
    Cgroup,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub typ: NamespaceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Linux {
    #[serde(default)]
    pub namespaces: Vec<LinuxNamespace>,
}

fn default_cwd() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Process {
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default = "default_cwd")]
    pub cwd: String,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    pub destination: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// The typed OCI configuration object loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleSpec {
    pub root: Root,
    pub process: Process,
    #[serde(default)]
    pub linux: Linux,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    /// Not required by `spec.md` §3, but needed to give step 6a ("sets
    /// hostname if a UTS namespace was created") something to set; optional,
    /// matching the OCI runtime-spec's own top-level `hostname` field.
    #[serde(default)]
    pub hostname: Option<String>,
}

impl BundleSpec {
    /// Reads and parses `<bundle_path>/config.json`. Ownership of the
    /// returned spec belongs to the caller.
    pub fn load(bundle_path: &Path) -> Result<Self, SpecError> {
        let config_path = bundle_path.join(CONFIG_FILE_NAME);
        let file = File::open(&config_path).map_err(|err| SpecError::Open {
            path: config_path.clone(),
            source: err,
        })?;
        let spec: BundleSpec =
            serde_json::from_reader(BufReader::new(file)).map_err(|err| SpecError::Parse {
                path: config_path.clone(),
                source: err,
            })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Enforces the §3 validation invariant: `root`/`process` present (the
    /// type system already guarantees this once deserialized), `args`
    /// non-empty, `args[0]` non-empty, namespace types recognised (again
    /// guaranteed by the enum, but kept explicit for clarity and so a
    /// future superset of namespace types fails closed rather than silently
    /// deserializing garbage).
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.process.args.is_empty() {
            return Err(SpecError::Invalid(
                "process.args must be a non-empty sequence".to_string(),
            ));
        }
        if self.process.args[0].is_empty() {
            return Err(SpecError::Invalid(
                "process.args[0] must not be empty".to_string(),
            ));
        }
        if self.root.path.is_empty() {
            return Err(SpecError::Invalid("root.path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn rootfs(&self, bundle_path: &Path) -> std::path::PathBuf {
        bundle_path.join(&self.root.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, body: &str) {
        let mut file = File::create(dir.join(CONFIG_FILE_NAME)).unwrap();
        file.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn loads_minimal_valid_config() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"root":{"path":"rootfs"},"process":{"args":["/bin/true"]}}"#,
        );
        let spec = BundleSpec::load(tmp.path()).unwrap();
        assert_eq!(spec.process.args, vec!["/bin/true".to_string()]);
        assert_eq!(spec.process.cwd, "/");
        assert!(!spec.process.terminal);
        assert!(spec.linux.namespaces.is_empty());
    }

    #[test]
    fn rejects_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = BundleSpec::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SpecError::Open { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "{not json");
        let err = BundleSpec::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SpecError::Parse { .. }));
    }

    #[test]
    fn rejects_empty_args() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"root":{"path":"rootfs"},"process":{"args":[]}}"#,
        );
        let err = BundleSpec::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SpecError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_argv0() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"root":{"path":"rootfs"},"process":{"args":[""]}}"#,
        );
        let err = BundleSpec::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SpecError::Invalid(_)));
    }

    #[test]
    fn rejects_unrecognised_namespace_type() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"root":{"path":"rootfs"},"process":{"args":["/bin/true"]},"linux":{"namespaces":[{"type":"vulcan"}]}}"#,
        );
        let err = BundleSpec::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SpecError::Parse { .. }));
    }

    #[test]
    fn parses_namespaces_with_and_without_join_path() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"root":{"path":"rootfs"},"process":{"args":["/bin/true"]},
               "linux":{"namespaces":[{"type":"pid"},{"type":"network","path":"/proc/1/ns/net"}]}}"#,
        );
        let spec = BundleSpec::load(tmp.path()).unwrap();
        assert_eq!(spec.linux.namespaces.len(), 2);
        assert_eq!(spec.linux.namespaces[0].typ, NamespaceType::Pid);
        assert!(spec.linux.namespaces[0].path.is_none());
        assert_eq!(spec.linux.namespaces[1].typ, NamespaceType::Network);
        assert_eq!(
            spec.linux.namespaces[1].path.as_deref(),
            Some("/proc/1/ns/net")
        );
    }

    #[test]
    fn rootfs_joins_bundle_and_root_path() {
        let spec = BundleSpec {
            root: Root {
                path: "rootfs".to_string(),
                readonly: false,
            },
            process: Process {
                args: vec!["/bin/true".to_string()],
                env: vec![],
                cwd: default_cwd(),
                terminal: false,
            },
            linux: Linux::default(),
            mounts: vec![],
            hostname: None,
        };
        assert_eq!(
            spec.rootfs(Path::new("/bundle")),
            Path::new("/bundle/rootfs")
        );
    }
}
