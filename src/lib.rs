//! `nano-sandbox`: an educational OCI-compatible container runtime.
//!
//! Laid out the way `containers-youki` splits `libcontainer` (the engine,
//! re-exported here as library modules) from `youki` (the CLI binary in
//! `main.rs`): `cli` and `main.rs` are the only pieces that know about
//! process exit codes and stdio; everything else is a plain library.
pub mod cgroup;
pub mod cli;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod namespaces;
pub mod process;
pub mod record;
pub mod spec;
pub mod state_dir;
