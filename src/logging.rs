//! Logging / educational trace facility, grounded in
//! `youki::observability`: `-V, --verbose` raises the ambient `tracing`
//! level; `-E, --educational` independently turns on a narration layer that
//! prints one line per lifecycle decision point. Process-wide by design —
//! set once during CLI parse and immutable thereafter (`spec.md` §9).
use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default level in release builds; debug builds default to `debug` to get
/// maximum logging, matching the teacher's `DEFAULT_LOG_LEVEL` convention.
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "warn";

static EDUCATIONAL: OnceCell<bool> = OnceCell::new();

#[derive(Debug, Default, Clone, Copy)]
pub struct ObservabilityConfig {
    pub verbose: bool,
    pub educational: bool,
}

/// Initializes the global `tracing` subscriber. Safe to call once per
/// process; a second call is a logic error in this codebase (the CLI only
/// calls it once, at the top of `main`), so it surfaces as an `anyhow`
/// error rather than panicking, same as `youki::observability::init`.
pub fn init(config: ObservabilityConfig) -> anyhow::Result<()> {
    let level = if config.verbose { "debug" } else { DEFAULT_LOG_LEVEL };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to init logger: {err}"))?;

    EDUCATIONAL
        .set(config.educational)
        .map_err(|_| anyhow::anyhow!("logging already initialized"))?;
    Ok(())
}

fn educational_enabled() -> bool {
    *EDUCATIONAL.get().unwrap_or(&false)
}

/// Prints one line per lifecycle decision point ("entering pid namespace",
/// "pivoting root to ...", "sending SIGTERM, waiting 100ms") at `info`
/// level tagged with the `educational` target, independent of the ambient
/// `-V` log level — gated purely by whether `-E` was passed.
pub fn narrate(message: impl std::fmt::Display) {
    if educational_enabled() {
        tracing::info!(target: "educational", "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrate_is_a_silent_no_op_before_init() {
        // EDUCATIONAL may already be set by another test in this binary;
        // this only asserts that calling narrate() never panics either way.
        narrate("pivoting root to /nonexistent");
    }
}
