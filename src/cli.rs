//! CLI surface: one struct per verb, modeled 1:1 on `liboci-cli`'s
//! per-verb files (`Create`, `Start`, `Delete`, `State`), plus a `Run`
//! struct carrying the union of `Create` and `Start` flags the way
//! `liboci-cli::run::Run` does. `--attach`/`--detach`/`--rm` are left as
//! plain booleans rather than a `clap` `ArgGroup` so their conflicts are
//! reported through `LifecycleError` and exit 1, not `clap`'s own usage
//! exit code (`spec.md` §7 requires usage errors to exit 1).
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::LifecycleError;
use crate::record::Mode;

#[derive(Debug, Parser)]
#[command(
    name = "nano-sandbox",
    version,
    disable_version_flag = true,
    about = "An educational OCI-compatible container runtime"
)]
pub struct Cli {
    #[arg(short = 'V', long, global = true, help = "raise the ambient log level")]
    pub verbose: bool,
    #[arg(
        short = 'E',
        long,
        global = true,
        help = "narrate each lifecycle decision point"
    )]
    pub educational: bool,
    /// `--version`'s auto-generated short is `-V`, which collides with
    /// `verbose`; the built-in flag is disabled above and rewired here with
    /// `-v` instead, matching `spec.md` §6 (`-v, --version`).
    #[arg(
        short = 'v',
        long = "version",
        action = clap::ArgAction::Version,
        help = "print version information"
    )]
    pub version: Option<bool>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Create(Create),
    Start(Start),
    Run(Run),
    Delete(Delete),
    State(State),
}

#[derive(Debug, Args)]
pub struct Create {
    pub id: String,
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
    #[arg(short, long, default_value = "container")]
    pub runtime: Mode,
}

#[derive(Debug, Args)]
pub struct Start {
    pub id: String,
    #[arg(short, long)]
    pub runtime: Option<Mode>,
    #[arg(short, long, value_name = "FILE")]
    pub pid_file: Option<PathBuf>,
    #[arg(short, long)]
    pub attach: bool,
    #[arg(short, long)]
    pub detach: bool,
}

#[derive(Debug, Args)]
pub struct Run {
    pub id: String,
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
    #[arg(short, long, default_value = "container")]
    pub runtime: Mode,
    #[arg(short, long, value_name = "FILE")]
    pub pid_file: Option<PathBuf>,
    #[arg(short, long)]
    pub attach: bool,
    #[arg(short, long)]
    pub detach: bool,
    #[arg(long)]
    pub rm: bool,
}

#[derive(Debug, Args)]
pub struct Delete {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct State {
    pub id: String,
}

/// Resolves `--attach`/`--detach` into "should the caller wait for the init
/// process". `spec.md` §4.6 gives `start` and `run` opposite defaults when
/// neither flag is given: `start` defaults to detached (matching scenario 6,
/// `prog start -d ...`, as the explicit norm for daemon-style starts), `run`
/// defaults to attached (scenario 3's bare `prog run -b ./bundle c2`, which
/// carries neither flag and is expected to block for the exit code).
pub fn resolve_attach_detach(
    attach: bool,
    detach: bool,
    default_attached: bool,
) -> Result<bool, LifecycleError> {
    if attach && detach {
        return Err(LifecycleError::ConflictingAttachDetach);
    }
    if attach {
        return Ok(true);
    }
    if detach {
        return Ok(false);
    }
    Ok(default_attached)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_and_detach_together_is_rejected() {
        assert!(resolve_attach_detach(true, true, true).is_err());
    }

    #[test]
    fn neither_flag_defaults_per_verb() {
        assert!(resolve_attach_detach(false, false, true).unwrap());
        assert!(!resolve_attach_detach(false, false, false).unwrap());
    }

    #[test]
    fn detach_alone_is_detached() {
        assert!(!resolve_attach_detach(false, true, true).unwrap());
    }

    #[test]
    fn attach_alone_is_attached() {
        assert!(resolve_attach_detach(true, false, false).unwrap());
    }

    #[test]
    fn parses_minimal_create_invocation() {
        let cli = Cli::parse_from(["nano-sandbox", "create", "-b", "./bundle", "c1"]);
        match cli.command {
            Command::Create(create) => {
                assert_eq!(create.id, "c1");
                assert_eq!(create.bundle, PathBuf::from("./bundle"));
                assert_eq!(create.runtime, Mode::Container);
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn parses_conflicting_start_flags_without_erroring_at_parse_time() {
        // clap itself must accept both flags; the conflict is reported by
        // resolve_attach_detach(), not by clap's own exit(2) usage path.
        let cli = Cli::parse_from(["nano-sandbox", "start", "-a", "-d", "c6"]);
        match cli.command {
            Command::Start(start) => {
                assert!(start.attach && start.detach);
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }
}
