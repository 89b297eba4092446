//! Lifecycle Engine: orchestrates `create`/`start`/`run`/`delete`/`state`,
//! drives the `spec.md` §4.6 state machine, and handles attach vs. detach,
//! signal-based stop, optional PID-file emission, and `--rm` auto-removal.
//! Grounded in `libcontainer::container::{container_start, container_delete,
//! container_kill}` and `youki::commands::{create, start, run, delete,
//! state}`, collapsed onto this runtime's single-record `RecordStore`
//! instead of the teacher's `Container` wrapper plus separate
//! `YoukiConfig` side-channel.
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::cgroup;
use crate::error::LifecycleError;
use crate::logging;
use crate::process::executor::{self, ExecContext};
use crate::record::{ContainerRecord, Mode, RecordStore, Status};
use crate::spec::BundleSpec;
use crate::state_dir;

const SIGTERM_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Whether `start`/`run` wait for the init process or return immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Attached,
    Detached,
}

/// Result of a `start` (or the start half of `run`). For detached starts,
/// `exit_code` is 0 unless PID-file emission failed (`spec.md` §4.6: that
/// failure "is reported as a non-zero exit but does not tear down the
/// container"); for attached starts it mirrors the container init's own
/// exit, per `spec.md` §6.
#[derive(Debug)]
pub struct StartOutcome {
    pub exit_code: i32,
    pub pid_file_error: Option<String>,
}

pub struct Engine {
    store: RecordStore,
}

impl Engine {
    pub fn new() -> Result<Self, LifecycleError> {
        let dir = state_dir::ensure_state_dir()?;
        Ok(Engine {
            store: RecordStore::new(dir),
        })
    }

    /// `create`: requires the id to be unused; validates the bundle spec;
    /// persists `created`. Never spawns a process (`spec.md` §4.6).
    pub fn create(&self, id: &str, bundle: &Path, mode: Mode) -> Result<(), LifecycleError> {
        logging::narrate(format!("loading and validating bundle at {}", bundle.display()));
        let _spec = BundleSpec::load(bundle)?;

        let bundle_abs = bundle.canonicalize().unwrap_or_else(|_| bundle.to_path_buf());
        let record = ContainerRecord::new(id, bundle_abs, mode);
        self.store.create(&record)?;
        logging::narrate(format!("created container {id} (mode={mode})"));
        Ok(())
    }

    /// `start`: requires `created`; performs the exec protocol of
    /// `spec.md` §4.4, then transitions to `running`. In attached mode it
    /// waits for the init to exit and transitions to `stopped`.
    pub fn start(
        &self,
        id: &str,
        mode: StartMode,
        pid_file: Option<&Path>,
    ) -> Result<StartOutcome, LifecycleError> {
        let mut record = self.store.load(id)?;

        if !matches!(record.status, Status::Created) {
            return Err(LifecycleError::IncorrectStatus {
                id: id.to_string(),
                status: status_label(record.status),
                verb: "start",
            });
        }
        if record.mode == Mode::Vm {
            return Err(LifecycleError::UnsupportedMode(Mode::Vm));
        }

        logging::narrate(format!("loading bundle spec for {id}"));
        let spec = BundleSpec::load(&record.bundle_path)?;
        let ctx = ExecContext::from_spec(&spec, &record.bundle_path);
        let cgroup_manager = cgroup::manager_for(id);

        logging::narrate(format!(
            "entering namespaces for {id} and pivoting to {}",
            ctx.rootfs.display()
        ));
        let pid = executor::exec(&ctx, |p| cgroup_manager.attach(p))?;

        record.set_running(pid.as_raw());
        self.store.save(&record)?;
        logging::narrate(format!("container {id} running as pid {pid}"));

        match mode {
            StartMode::Detached => {
                let pid_file_error = match pid_file {
                    Some(path) => write_pid_file(path, pid).err(),
                    None => None,
                };
                let exit_code = if pid_file_error.is_some() { 1 } else { 0 };
                Ok(StartOutcome {
                    exit_code,
                    pid_file_error,
                })
            }
            StartMode::Attached => {
                let exit_code = wait_and_translate(pid)?;
                record.set_stopped();
                self.store.save(&record)?;
                logging::narrate(format!("container {id} stopped with exit code {exit_code}"));
                Ok(StartOutcome {
                    exit_code,
                    pid_file_error: None,
                })
            }
        }
    }

    /// `run`: `create` then `start` with the same options. Handles `--rm`:
    /// deletes after an attached wait regardless of exit code, or deletes a
    /// partially-created container if `start` itself failed.
    pub fn run(
        &self,
        id: &str,
        bundle: &Path,
        mode: Mode,
        start_mode: StartMode,
        rm: bool,
        pid_file: Option<&Path>,
    ) -> Result<i32, LifecycleError> {
        self.create(id, bundle, mode)?;

        match self.start(id, start_mode, pid_file) {
            Ok(outcome) => {
                if rm && start_mode == StartMode::Attached {
                    logging::narrate(format!("--rm: deleting {id} after run"));
                    if let Err(err) = self.delete(id) {
                        tracing::warn!(id, ?err, "failed to clean up container after --rm run");
                    }
                }
                Ok(outcome.exit_code)
            }
            Err(err) => {
                if rm {
                    logging::narrate(format!(
                        "run failed for {id}; --rm cleaning up the partially-created container"
                    ));
                    if let Err(cleanup_err) = self.delete(id) {
                        tracing::warn!(
                            id,
                            ?cleanup_err,
                            "failed to clean up partially-created container after --rm failure"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// `delete`: from any persisted state. If `running`, signals
    /// (`SIGTERM` then, after a grace period, `SIGKILL`) before cleaning up
    /// the cgroup and removing the record. Cgroup cleanup is attempted
    /// whenever a record was loaded, even if the subsequent steps warn
    /// instead of succeeding outright (`spec.md` §4.6/§7).
    pub fn delete(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.store.load(id)?;

        if record.status == Status::Running && record.init_pid > 0 {
            logging::narrate(format!("sending SIGTERM to {id} (pid {})", record.init_pid));
            stop_process(Pid::from_raw(record.init_pid));
        }

        let cgroup_manager = cgroup::manager_for(id);
        if let Err(err) = cgroup_manager.cleanup() {
            tracing::warn!(id, ?err, "cgroup cleanup failed during delete");
        }

        self.store.delete(id)?;
        logging::narrate(format!("deleted container {id}"));
        Ok(())
    }

    /// `state`: returns the persisted state verbatim; never launches
    /// processes, never reconciles against the live process table
    /// (`spec.md` §9 open question: the stored value is authoritative).
    pub fn state(&self, id: &str) -> Result<Status, LifecycleError> {
        let record = self.store.load(id)?;
        Ok(record.status)
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Created => "created",
        Status::Running => "running",
        Status::Stopped => "stopped",
        Status::Paused => "paused",
    }
}

/// `SIGTERM`, grace period, liveness probe, `SIGKILL` if still alive.
/// Best-effort per `spec.md` §7's Shutdown category: failures here are
/// warnings, not errors, and never block cleanup.
fn stop_process(pid: Pid) {
    if let Err(err) = signal::kill(pid, Signal::SIGTERM) {
        tracing::warn!(?pid, ?err, "failed to send SIGTERM");
        return;
    }

    thread::sleep(SIGTERM_GRACE_PERIOD);

    match signal::kill(pid, None) {
        Ok(()) => {
            logging::narrate(format!("pid {pid} still alive after grace period, sending SIGKILL"));
            if let Err(err) = signal::kill(pid, Signal::SIGKILL) {
                tracing::warn!(?pid, ?err, "failed to send SIGKILL");
            }
        }
        Err(_) => {
            // ESRCH (or any other errno): the process is gone, nothing more to do.
        }
    }
}

/// Translates a `waitpid` status into the exit code `spec.md` §4.6/§6
/// define: `WIFEXITED` -> the exit code, `WIFSIGNALED` -> `128 + signal`.
/// The source leaves the wait-failure case itself ambiguous (`spec.md` §9
/// open question); this runtime treats it as a generic runtime failure.
fn wait_and_translate(pid: Pid) -> Result<i32, LifecycleError> {
    match waitpid(pid, None) {
        Ok(WaitStatus::Exited(_, code)) => Ok(code),
        Ok(WaitStatus::Signaled(_, sig, _)) => Ok(128 + sig as i32),
        Ok(other) => Err(LifecycleError::Wait(format!(
            "unexpected wait status for init pid {pid}: {other:?}"
        ))),
        Err(err) => Err(LifecycleError::Wait(format!(
            "waitpid on init pid {pid} failed: {err}"
        ))),
    }
}

fn write_pid_file(path: &Path, pid: Pid) -> Result<(), String> {
    std::fs::write(path, format!("{pid}\n")).map_err(|err| {
        format!(
            "failed to write pid file {}: {err}",
            PathBuf::from(path).display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_label_matches_display() {
        assert_eq!(status_label(Status::Created), "created");
        assert_eq!(status_label(Status::Running), "running");
        assert_eq!(status_label(Status::Stopped), "stopped");
        assert_eq!(status_label(Status::Paused), "paused");
    }

    #[test]
    fn write_pid_file_truncates_and_appends_newline() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c1.pid");
        write_pid_file(&path, Pid::from_raw(4242)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "4242\n");
    }
}
