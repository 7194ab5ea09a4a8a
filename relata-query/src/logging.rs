//! Logging setup.
//!
//! The engine logs through `tracing` and never installs a subscriber on its
//! own. Applications that want relata's output without wiring their own
//! subscriber can call [`init`] (requires the `tracing-subscriber` feature).
//!
//! # Environment Variables
//!
//! - `RELATA_DEBUG=true|1|yes` - Enable debug logging
//! - `RELATA_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `RELATA_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! What gets logged:
//!
//! - `debug`: every dispatched statement with its SQL and parameter count
//! - `trace`: environment state transitions
//! - `warn`: the failure that cancels a request
//! - `info`: pool and driver lifecycle
//!
//! ```rust,no_run
//! relata_query::logging::init();
//! ```

use std::sync::Once;

use crate::config::{EnvSource, StdEnvSource};

static INIT: Once = Once::new();

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

/// Logging settings read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether anything asked for logging at all.
    pub enabled: bool,
    /// Level applied to the relata crates.
    pub level: &'static str,
    /// Output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Read `RELATA_DEBUG`, `RELATA_LOG_LEVEL` and `RELATA_LOG_FORMAT`.
    pub fn from_source(source: &impl EnvSource) -> Self {
        let debug = debug_flag(source);
        let fallback = if debug { "debug" } else { "warn" };
        let requested = source.get("RELATA_LOG_LEVEL");

        let level = match requested.as_deref().map(str::to_lowercase).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => fallback,
        };
        let format = match source.get("RELATA_LOG_FORMAT").map(|f| f.to_lowercase()).as_deref() {
            Some("pretty") => LogFormat::Pretty,
            Some("compact") => LogFormat::Compact,
            _ => LogFormat::Json,
        };

        Self {
            enabled: debug || requested.is_some(),
            level,
            format,
        }
    }

    /// The `EnvFilter` directive for the relata crates.
    pub fn directive(&self) -> String {
        format!(
            "relata={0},relata_query={0},relata_sqlite={0}",
            self.level
        )
    }
}

/// Whether `RELATA_DEBUG` is set to `true`, `1` or `yes`.
pub fn is_debug_enabled() -> bool {
    debug_flag(&StdEnvSource)
}

fn debug_flag(source: &impl EnvSource) -> bool {
    source
        .get("RELATA_DEBUG")
        .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Install a global subscriber according to the environment.
///
/// Runs once; later calls do nothing. Without `RELATA_DEBUG` or
/// `RELATA_LOG_LEVEL` no subscriber is installed.
pub fn init() {
    INIT.call_once(|| {
        let settings = LogSettings::from_source(&StdEnvSource);
        if !settings.enabled {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter =
                EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));
            let registry = tracing_subscriber::registry().with(filter);
            let installed = match settings.format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = settings.level,
                    format = ?settings.format,
                    "relata logging initialized"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnvSource;

    #[test]
    fn test_disabled_by_default() {
        let settings = LogSettings::from_source(&MapEnvSource::new());
        assert!(!settings.enabled);
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.format, LogFormat::Json);
    }

    #[test]
    fn test_debug_flag() {
        let settings = LogSettings::from_source(&MapEnvSource::new().set("RELATA_DEBUG", "YES"));
        assert!(settings.enabled);
        assert_eq!(settings.level, "debug");
    }

    #[test]
    fn test_explicit_level_and_format() {
        let env = MapEnvSource::new()
            .set("RELATA_LOG_LEVEL", "Trace")
            .set("RELATA_LOG_FORMAT", "compact");
        let settings = LogSettings::from_source(&env);
        assert!(settings.enabled);
        assert_eq!(settings.level, "trace");
        assert_eq!(settings.format, LogFormat::Compact);
        assert_eq!(settings.directive(), "relata=trace,relata_query=trace,relata_sqlite=trace");
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let env = MapEnvSource::new().set("RELATA_LOG_LEVEL", "loud");
        let settings = LogSettings::from_source(&env);
        assert!(settings.enabled);
        assert_eq!(settings.level, "warn");
    }
}
