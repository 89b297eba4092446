//! Wire messages sent between the parent and the forked child over the
//! synchronisation channel. Grounded in `libcontainer::process::message`,
//! collapsed from the teacher's three-channel main/intermediate/init design
//! down to the single parent/child pair this runtime's simpler two-process
//! model needs.
use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Message {
    /// Child -> parent: the requested namespaces have been unshared (the
    /// user namespace, if any, now exists) and the child is blocked waiting
    /// for the parent to finish uid/gid mapping and cgroup attachment.
    NamespacesReady,
    /// Parent -> child: cgroup attachment and uid/gid maps are done, the
    /// child may continue into mount setup and exec.
    Proceed,
    /// Child -> parent: something went wrong before the exec handoff,
    /// categorised by a human-readable reason.
    Failed(String),
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::NamespacesReady => write!(f, "NamespacesReady"),
            Message::Proceed => write!(f, "Proceed"),
            Message::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}
