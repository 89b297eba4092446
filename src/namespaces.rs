//! Namespace flag mapping, grounded in `libcontainer::namespaces`.
//!
//! Kernel isolation primitives used by the Container Executor. Namespaces are
//! entered in a fixed order so that, e.g., a new user namespace exists before
//! the other namespaces it may gate are created.
use std::collections::HashMap;

use nix::sched::CloneFlags;

use crate::spec::{LinuxNamespace, NamespaceType};

pub static ORDERED_NAMESPACE_TYPES: &[NamespaceType] = &[
    NamespaceType::User,
    NamespaceType::Pid,
    NamespaceType::Uts,
    NamespaceType::Ipc,
    NamespaceType::Network,
    NamespaceType::Cgroup,
    NamespaceType::Mount,
];

pub fn clone_flag(typ: NamespaceType) -> CloneFlags {
    match typ {
        NamespaceType::User => CloneFlags::CLONE_NEWUSER,
        NamespaceType::Pid => CloneFlags::CLONE_NEWPID,
        NamespaceType::Uts => CloneFlags::CLONE_NEWUTS,
        NamespaceType::Ipc => CloneFlags::CLONE_NEWIPC,
        NamespaceType::Network => CloneFlags::CLONE_NEWNET,
        NamespaceType::Cgroup => CloneFlags::CLONE_NEWCGROUP,
        NamespaceType::Mount => CloneFlags::CLONE_NEWNS,
    }
}

/// Indexes the spec's namespace list by type, so the executor can ask "is a
/// pid namespace requested, and if so, is it a create or a join?"
#[derive(Debug, Default, Clone)]
pub struct Namespaces {
    by_type: HashMap<NamespaceType, LinuxNamespace>,
}

impl From<&[LinuxNamespace]> for Namespaces {
    fn from(namespaces: &[LinuxNamespace]) -> Self {
        Namespaces {
            by_type: namespaces.iter().cloned().map(|ns| (ns.typ, ns)).collect(),
        }
    }
}

impl Namespaces {
    pub fn get(&self, typ: NamespaceType) -> Option<&LinuxNamespace> {
        self.by_type.get(&typ)
    }

    /// Namespace types requested with no `path` — i.e. to be created fresh
    /// via `unshare`, combined into a single `CloneFlags` bitset in the
    /// teacher's canonical order.
    pub fn create_flags(&self) -> CloneFlags {
        ORDERED_NAMESPACE_TYPES
            .iter()
            .filter(|typ| matches!(self.by_type.get(typ), Some(ns) if ns.path.is_none()))
            .fold(CloneFlags::empty(), |acc, typ| acc | clone_flag(*typ))
    }

    /// Namespace types requested with a `path` — i.e. to be joined via
    /// `setns`, in the teacher's canonical order.
    pub fn join_targets(&self) -> Vec<(NamespaceType, String)> {
        ORDERED_NAMESPACE_TYPES
            .iter()
            .filter_map(|typ| {
                self.by_type
                    .get(typ)
                    .and_then(|ns| ns.path.as_ref().map(|p| (*typ, p.clone())))
            })
            .collect()
    }

    pub fn requests_uts_create(&self) -> bool {
        matches!(self.by_type.get(&NamespaceType::Uts), Some(ns) if ns.path.is_none())
    }

    pub fn requests_user(&self) -> bool {
        matches!(self.by_type.get(&NamespaceType::User), Some(ns) if ns.path.is_none())
    }
}
