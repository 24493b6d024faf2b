//! Logging initialization for the host.
//!
//! Filter precedence: `RUST_LOG` → `-v` flags → `logging.level` from config.
//! Everything is written to stderr so stdout carries plugin output only.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig, verbosity_level};

/// Build the filter from `RUST_LOG`, falling back to `-v` and then the configured level.
///
/// # Errors
/// Fails if the resulting directive does not parse.
pub fn build_filter(cfg: &LoggingConfig, verbose: u8) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = verbosity_level(verbose).unwrap_or(&cfg.level);
    EnvFilter::try_new(directive)
        .map_err(|e| anyhow::anyhow!("invalid log level '{directive}': {e}"))
}

/// Install the global subscriber. Call once, before loading any module: loaded modules
/// receive this dispatcher at load time.
///
/// # Errors
/// Fails on an invalid level directive or if a global subscriber is already set.
pub fn init_logging(cfg: &LoggingConfig, verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(cfg, verbose)?;
    let registry = tracing_subscriber::registry().with(filter);

    match cfg.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Plain => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    tracing::debug!(level = %cfg.level, format = ?cfg.format, "logging initialized");
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn cfg(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_owned(),
            format: LogFormat::Plain,
        }
    }

    #[test]
    fn rust_log_wins() {
        temp_env::with_var("RUST_LOG", Some("trace"), || {
            let filter = build_filter(&cfg("error"), 1).unwrap();
            assert_eq!(filter.to_string(), "trace");
        });
    }

    #[test]
    fn verbose_beats_config_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            let filter = build_filter(&cfg("error"), 2).unwrap();
            assert_eq!(filter.to_string(), "debug");
        });
    }

    #[test]
    fn config_level_is_the_fallback() {
        temp_env::with_var_unset("RUST_LOG", || {
            let filter = build_filter(&cfg("plugkit=debug,warn"), 0).unwrap();
            let rendered = filter.to_string();
            assert!(rendered.contains("plugkit=debug"), "{rendered}");
            assert!(rendered.contains("warn"), "{rendered}");
        });
    }

    #[test]
    fn bad_directive_is_an_error() {
        temp_env::with_var_unset("RUST_LOG", || {
            let err = build_filter(&cfg("plugkit=notalevel"), 0).unwrap_err();
            assert!(err.to_string().contains("invalid log level"));
        });
    }
}
