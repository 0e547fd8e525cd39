//! Logging Setup
//!
//! The library only emits `tracing` events; it never installs a subscriber on
//! its own. Applications and examples that want console output call
//! [`init`] once at startup.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `alpaca_trade_api=info`)
//! - `APCA_LOG_TARGETS`: set to "false" to hide event targets (default: true)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "alpaca_trade_api=info";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter directives.
    pub directives: String,
    /// Whether to print event targets.
    pub with_targets: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directives: DEFAULT_DIRECTIVES.to_string(),
            with_targets: true,
        }
    }
}

impl TelemetryConfig {
    /// Configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let directives = lookup("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());
        let with_targets = lookup("APCA_LOG_TARGETS").is_none_or(|v| v.to_lowercase() != "false");
        Self {
            directives,
            with_targets,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.directives).unwrap_or_else(|e| {
            eprintln!("Invalid log directives {:?}: {e}", self.directives);
            EnvFilter::new(DEFAULT_DIRECTIVES)
        })
    }
}

/// Install a console subscriber configured from the environment.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install a console subscriber with `config`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_with_config(config: &TelemetryConfig) -> bool {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_targets)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = TelemetryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn environment_overrides() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("RUST_LOG", "alpaca_trade_api=debug"),
            ("APCA_LOG_TARGETS", "FALSE"),
        ]));
        assert_eq!(config.directives, "alpaca_trade_api=debug");
        assert!(!config.with_targets);
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        let config = TelemetryConfig {
            directives: "not a valid [directive".to_string(),
            with_targets: false,
        };
        let _ = init_with_config(&config);
        assert!(!init_with_config(&config));
    }
}
