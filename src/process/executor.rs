//! Container Executor: spawns the init process with the requested
//! namespaces, performs the rootfs pivot, mount setup, cwd, env, argv and
//! terminal handoff, and returns the init pid. Grounded in
//! `libcontainer::process::{container_main_process, container_init_process}`
//! and `libcontainer::rootfs::rootfs::RootFS::mount_to_rootfs`, collapsed
//! into the single parent/child exchange `spec.md` §4.4 describes instead of
//! the teacher's three-process (main/intermediate/init) pipeline.
use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};

use nix::fcntl::{open, OFlag};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::pty::openpty;
use nix::sched::setns;
use nix::sys::stat::Mode;
use nix::unistd::{self, chdir, dup2, fchdir, pivot_root, sethostname, Pid};

use crate::error::{CgroupError, ExecError};
use crate::namespaces::{clone_flag, Namespaces};
use crate::process::channel::Channel;
use crate::process::fork::fork_child;
use crate::process::message::Message;
use crate::spec::{BundleSpec, Mount as SpecMount, NamespaceType};

/// Everything the forked child needs, copied out of the loaded `BundleSpec`
/// so the executor never retains the spec itself past this call, per the
/// lifetime note in `spec.md` §9 (`options ⊇ spec ⊇ context`).
#[derive(Clone)]
pub struct ExecContext {
    pub rootfs: PathBuf,
    pub namespaces: Namespaces,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    pub terminal: bool,
    pub mounts: Vec<SpecMount>,
    pub hostname: Option<String>,
}

impl ExecContext {
    pub fn from_spec(spec: &BundleSpec, bundle_path: &Path) -> Self {
        ExecContext {
            rootfs: spec.rootfs(bundle_path),
            namespaces: Namespaces::from(&spec.linux.namespaces[..]),
            args: spec.process.args.clone(),
            env: spec.process.env.clone(),
            cwd: spec.process.cwd.clone(),
            terminal: spec.process.terminal,
            mounts: spec.mounts.clone(),
            hostname: spec.hostname.clone(),
        }
    }
}

/// Forks the init process and drives the execution protocol of `spec.md`
/// §4.4 steps 1-6. `attach_cgroup` is invoked with the freshly forked pid
/// after namespace creation but before the child is released (step 4),
/// which lets the Lifecycle Engine inject whichever `CgroupManager` fits
/// without the executor owning one itself.
pub fn exec(
    ctx: &ExecContext,
    attach_cgroup: impl FnOnce(Pid) -> Result<(), CgroupError>,
) -> Result<Pid, ExecError> {
    let (parent_chan, child_chan) = Channel::pair()?;
    let child_ctx = ctx.clone();

    let pid = fork_child(move || child_main(&child_ctx, &child_chan))?;

    match parent_chan.recv()? {
        Message::NamespacesReady => {}
        Message::Failed(reason) => return Err(ExecError::ChildFailed(reason)),
        other => {
            return Err(ExecError::Channel(format!(
                "unexpected message while waiting for namespace setup: {other}"
            )))
        }
    }

    if ctx.namespaces.requests_user() {
        write_id_mappings(pid)?;
    }

    attach_cgroup(pid).map_err(ExecError::Cgroup)?;

    parent_chan.send(&Message::Proceed)?;
    parent_chan.wait_for_completion()?;
    Ok(pid)
}

/// Runs inside the forked child. Only returns (with a nonzero code) on
/// failure before the exec handoff; success replaces the process image and
/// never returns here at all.
fn child_main(ctx: &ExecContext, chan: &Channel) -> i32 {
    match run_child(ctx, chan) {
        Ok(()) => unreachable!("run_child only returns on failure; success execs"),
        Err(reason) => {
            let _ = chan.send(&Message::Failed(reason));
            1
        }
    }
}

/// Wire-level entry point: delegates to `run_child_typed` and stringifies
/// the categorised `ExecError` for transport over the channel, the same
/// split the teacher keeps between `LibcontainerError`-typed internals and
/// `Message::ExecFailed(String)` on the wire.
fn run_child(ctx: &ExecContext, chan: &Channel) -> Result<(), String> {
    run_child_typed(ctx, chan).map_err(|err| err.to_string())
}

fn run_child_typed(ctx: &ExecContext, chan: &Channel) -> Result<(), ExecError> {
    nix::sched::unshare(ctx.namespaces.create_flags()).map_err(ExecError::Unshare)?;

    chan.send(&Message::NamespacesReady)?;

    match chan.recv()? {
        Message::Proceed => {}
        other => {
            return Err(ExecError::Channel(format!(
                "expected Proceed from parent, got {other}"
            )))
        }
    }

    for (typ, path) in ctx.namespaces.join_targets() {
        join_namespace(&path, typ)?;
    }

    if ctx.namespaces.requests_uts_create() {
        if let Some(hostname) = ctx.hostname.as_deref() {
            sethostname(hostname)
                .map_err(|err| ExecError::ChildFailed(format!("sethostname: {err}")))?;
        }
    }

    pivot_to_rootfs(&ctx.rootfs, &ctx.mounts)?;

    chdir(ctx.cwd.as_str())
        .map_err(|err| ExecError::ChildFailed(format!("chdir {}: {err}", ctx.cwd)))?;

    if ctx.terminal {
        setup_terminal()?;
    }

    replace_self(&ctx.args, &ctx.env)
}

fn join_namespace(path: &str, typ: NamespaceType) -> Result<(), ExecError> {
    let fd = open(path, OFlag::O_RDONLY, Mode::empty()).map_err(|err| ExecError::OpenNamespace {
        path: PathBuf::from(path),
        source: err,
    })?;
    let result = setns(fd, clone_flag(typ));
    let _ = unistd::close(fd);
    result.map_err(ExecError::SetNs)
}

/// Bind-mounts the rootfs onto itself, applies any `mounts[]` entries, then
/// `pivot_root`s into it so only the rootfs subtree is visible, following
/// `RootFS::mount_to_rootfs` and `syscall::linux::LinuxSyscall::pivot_rootfs`
/// in spirit: make `/` private recursive first so none of this propagates
/// back to the host mount namespace.
fn pivot_to_rootfs(rootfs: &Path, mounts: &[SpecMount]) -> Result<(), ExecError> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|err| ExecError::Mount(format!("make / private: {err}")))?;

    mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|err| ExecError::Mount(format!("bind-mount rootfs {}: {err}", rootfs.display())))?;

    for m in mounts {
        apply_mount(rootfs, m)?;
    }

    // Open the new root before pivoting so we can fchdir into it afterwards
    // by fd rather than by (now possibly-shadowed) path.
    let newroot_fd = open(rootfs, OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())
        .map_err(|err| ExecError::PivotRoot(format!("open new root: {err}")))?;

    // Using the same path for both arguments stacks the old root on top of
    // the new one at the same mountpoint; the umount2 below then detaches
    // exactly that stacked old root, without needing a separate temporary
    // directory to hold it.
    pivot_root(rootfs, rootfs).map_err(|err| ExecError::PivotRoot(err.to_string()))?;

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_SLAVE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|err| ExecError::PivotRoot(format!("remount old root slave: {err}")))?;
    umount2("/", MntFlags::MNT_DETACH)
        .map_err(|err| ExecError::PivotRoot(format!("detach old root: {err}")))?;
    fchdir(newroot_fd).map_err(|err| ExecError::PivotRoot(format!("fchdir into new root: {err}")))?;
    unistd::close(newroot_fd)
        .map_err(|err| ExecError::PivotRoot(format!("close new root fd: {err}")))?;
    Ok(())
}

fn apply_mount(rootfs: &Path, m: &SpecMount) -> Result<(), ExecError> {
    let dest = m.destination.trim_start_matches('/');
    let target = rootfs.join(dest);
    if !target.exists() {
        let _ = fs::create_dir_all(&target);
    }

    let mut flags = MsFlags::empty();
    let mut data_opts = Vec::new();
    for opt in &m.options {
        match opt.as_str() {
            "bind" | "rbind" => flags |= MsFlags::MS_BIND,
            "ro" => flags |= MsFlags::MS_RDONLY,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "rw" => {}
            other => data_opts.push(other.to_string()),
        }
    }
    if matches!(m.typ.as_deref(), Some("bind") | None) && m.source.is_some() {
        flags |= MsFlags::MS_BIND;
    }

    let source = m.source.as_deref();
    let fstype = m.typ.as_deref().filter(|t| *t != "bind");
    let data = if data_opts.is_empty() {
        None
    } else {
        Some(data_opts.join(","))
    };

    mount(source, &target, fstype, flags, data.as_deref())
        .map_err(|err| ExecError::Mount(format!("mount {}: {err}", target.display())))
}

/// Allocates a pty and dups the slave end over stdio. This runtime does not
/// implement the `--console-socket` fd-passing protocol (a deliberate scope
/// reduction noted in `SPEC_FULL.md` §4.4) — the pty stays attached to
/// whatever the CLI's own controlling terminal already was, rather than
/// being handed off to an external collector process.
fn setup_terminal() -> Result<(), ExecError> {
    use std::os::unix::io::AsRawFd;

    let pty = openpty(None, None).map_err(ExecError::Terminal)?;
    let slave_fd = pty.slave.as_raw_fd();
    unsafe {
        if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) < 0 {
            tracing::warn!("could not set controlling terminal via TIOCSCTTY");
        }
    }
    dup2(slave_fd, 0).map_err(ExecError::Terminal)?;
    dup2(slave_fd, 1).map_err(ExecError::Terminal)?;
    dup2(slave_fd, 2).map_err(ExecError::Terminal)?;
    Ok(())
}

/// Replaces the process image with `args[0]`, searching `PATH` from the
/// container's own environment, matching `libcontainer::utils::do_exec`
/// (`execvp` after the process env has been reset to the spec's `env[]`,
/// as `container_init_process.rs` does with `env::set_var`).
fn replace_self(args: &[String], env: &[String]) -> Result<(), ExecError> {
    for (key, _) in std::env::vars() {
        std::env::remove_var(key);
    }
    for kv in env {
        if let Some((key, value)) = kv.split_once('=') {
            std::env::set_var(key, value);
        }
    }

    let prog = CString::new(args[0].as_str())
        .map_err(|err| ExecError::ChildFailed(format!("argv[0] contains a nul byte: {err}")))?;
    let argv: Vec<CString> = args
        .iter()
        .map(|a| CString::new(a.as_str()).unwrap_or_default())
        .collect();

    let err = unistd::execvp(&prog, &argv).unwrap_err();
    Err(ExecError::Exec(PathBuf::from(&args[0]), err))
}

/// Writes the uid/gid maps for a child that created a new user namespace.
/// Mirrors `libcontainer::process::container_main_process::setup_mapping`:
/// `setgroups` must be denied before the gid map can be written by an
/// unprivileged mapper (CVE-2014-8989). This runtime only supports mapping
/// the invoking user identity to root inside the container, not the full
/// OCI `uidMappings`/`gidMappings` ranges, which `spec.md` does not ask for.
fn write_id_mappings(pid: Pid) -> Result<(), ExecError> {
    let uid = unistd::getuid();
    let gid = unistd::getgid();

    let setgroups_path = format!("/proc/{pid}/setgroups");
    let _ = fs::write(&setgroups_path, "deny");

    let uid_map_path = format!("/proc/{pid}/uid_map");
    fs::write(&uid_map_path, format!("0 {uid} 1")).map_err(|err| ExecError::IdMapping {
        pid: pid.as_raw(),
        source: err,
    })?;

    let gid_map_path = format!("/proc/{pid}/gid_map");
    fs::write(&gid_map_path, format!("0 {gid} 1")).map_err(|err| ExecError::IdMapping {
        pid: pid.as_raw(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Linux, LinuxNamespace, Process, Root};

    fn minimal_ctx(args: Vec<&str>) -> ExecContext {
        ExecContext {
            rootfs: PathBuf::from("/nonexistent"),
            namespaces: Namespaces::default(),
            args: args.into_iter().map(str::to_string).collect(),
            env: vec!["PATH=/usr/bin:/bin".to_string()],
            cwd: "/".to_string(),
            terminal: false,
            mounts: vec![],
            hostname: None,
        }
    }

    #[test]
    fn from_spec_builds_rootfs_and_copies_fields() {
        let spec = BundleSpec {
            root: Root {
                path: "rootfs".to_string(),
                readonly: false,
            },
            process: Process {
                args: vec!["/bin/true".to_string()],
                env: vec!["A=B".to_string()],
                cwd: "/".to_string(),
                terminal: false,
            },
            linux: Linux {
                namespaces: vec![LinuxNamespace {
                    typ: NamespaceType::Pid,
                    path: None,
                }],
            },
            mounts: vec![],
            hostname: Some("box".to_string()),
        };
        let ctx = ExecContext::from_spec(&spec, Path::new("/bundle"));
        assert_eq!(ctx.rootfs, PathBuf::from("/bundle/rootfs"));
        assert_eq!(ctx.args, vec!["/bin/true".to_string()]);
        assert_eq!(ctx.env, vec!["A=B".to_string()]);
        assert_eq!(ctx.hostname.as_deref(), Some("box"));
        assert!(ctx.namespaces.get(NamespaceType::Pid).is_some());
    }

    #[test]
    fn exec_reports_failure_for_unexecutable_program() {
        // Forks a child with no namespaces requested; the child should fail
        // fast inside `replace_self` (program does not exist) and report it
        // back over the channel rather than hanging.
        let ctx = minimal_ctx(vec!["/this/does/not/exist"]);
        let result = exec(&ctx, |_pid| Ok(()));
        match result {
            Err(ExecError::ChildFailed(reason)) => {
                assert!(
                    reason.contains("execute")
                        || reason.contains("mount")
                        || reason.contains("pivot")
                );
            }
            Err(ExecError::Fork(_)) => {
                // Fork can fail in constrained CI sandboxes; that's an
                // acceptable skip rather than a hard failure here.
            }
            other => panic!("expected a reported child failure, got {other:?}"),
        }
    }
}
