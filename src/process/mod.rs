//! The Container Executor's supporting machinery: the synchronisation
//! channel, the fork wrapper, the wire messages sent across it, and the
//! executor itself. Laid out as a module the way
//! `libcontainer::process::{channel, message, fork, ...}` is.
pub mod channel;
pub mod executor;
pub mod fork;
pub mod message;
