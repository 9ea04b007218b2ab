//! Command-line front end for goaltree.
//!
//! Logging goes to stderr so `--json` output on stdout stays parseable.

pub mod goal_cmd;

pub use goal_cmd::GoalCli;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `--verbose` forces `debug`. Otherwise `RUST_LOG` applies when set and
/// valid, and the level falls back to `warn`.
pub fn init_tracing(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(verbose, rust_log.as_deref());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    match (verbose, rust_log) {
        (true, _) => EnvFilter::new("debug"),
        (false, Some(directives)) => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
        (false, None) => EnvFilter::new("warn"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_overrides_rust_log() {
        assert_eq!(log_filter(true, Some("info")).to_string(), "debug");
        assert_eq!(log_filter(true, None).to_string(), "debug");
    }

    #[test]
    fn rust_log_applies_without_verbose() {
        assert_eq!(log_filter(false, Some("info")).to_string(), "info");
        assert_eq!(log_filter(false, None).to_string(), "warn");
    }
}
