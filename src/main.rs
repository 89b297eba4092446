//! Entry point: parses the CLI, initializes logging, and dispatches to the
//! `Engine`. Mirrors the split in `youki::main` between argument parsing,
//! observability setup, and `commands::*` dispatch, but collapses the
//! dispatch into a single `run()` so exit-code mapping (`spec.md` §6) lives
//! in one place.
use std::process::ExitCode;

use clap::Parser;

use nano_sandbox::cli::{self, Cli, Command};
use nano_sandbox::error::LifecycleError;
use nano_sandbox::lifecycle::{Engine, StartMode};
use nano_sandbox::logging::{self, ObservabilityConfig};
use nano_sandbox::record::Mode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap's `Error::print()` writes --help/--version to stdout;
            // spec.md §8 scenario 1 wants all usage text, including help, on
            // stderr, so render it ourselves instead of calling `print()`.
            eprint!("{err}");
            // clap's own exit codes are 0 for --help/--version, 2 for
            // everything else; spec.md §6/§7 wants usage errors to exit 1.
            return ExitCode::from(if err.exit_code() == 0 { 0 } else { 1 });
        }
    };

    if let Err(err) = logging::init(ObservabilityConfig {
        verbose: cli.verbose,
        educational: cli.educational,
    }) {
        eprintln!("error: {err:#}");
        return ExitCode::from(1);
    }

    match dispatch(cli.command) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn dispatch(command: Command) -> anyhow::Result<i32> {
    let engine = Engine::new()?;

    match command {
        Command::Create(args) => {
            engine.create(&args.id, &args.bundle, args.runtime)?;
            Ok(0)
        }

        Command::Start(args) => {
            if args.runtime == Some(Mode::Vm) {
                return Err(LifecycleError::UnsupportedMode(Mode::Vm).into());
            }
            let attached = cli::resolve_attach_detach(args.attach, args.detach, false)?;
            let mode = if attached {
                StartMode::Attached
            } else {
                StartMode::Detached
            };
            let outcome = engine.start(&args.id, mode, args.pid_file.as_deref())?;
            if let Some(reason) = &outcome.pid_file_error {
                eprintln!("warning: {reason}");
            }
            Ok(outcome.exit_code)
        }

        Command::Run(args) => {
            let attached = cli::resolve_attach_detach(args.attach, args.detach, true)?;
            if args.rm && !attached {
                return Err(LifecycleError::InvalidRm.into());
            }
            let mode = if attached {
                StartMode::Attached
            } else {
                StartMode::Detached
            };
            let code = engine.run(
                &args.id,
                &args.bundle,
                args.runtime,
                mode,
                args.rm,
                args.pid_file.as_deref(),
            )?;
            Ok(code)
        }

        Command::Delete(args) => {
            engine.delete(&args.id)?;
            Ok(0)
        }

        Command::State(args) => {
            let status = engine.state(&args.id)?;
            println!("{status}");
            Ok(0)
        }
    }
}
