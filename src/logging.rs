use env_logger::{Builder, Env};

/// Installs the stderr logger. `RUST_LOG` overrides the flag-derived level.
pub fn init(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    // A second call (tests, embedded use) keeps the first logger.
    let _ = Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
