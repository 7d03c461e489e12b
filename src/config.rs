//! Runtime configuration.
//!
//! Values come from `RELAY_*` environment variables. Anything unset keeps its
//! default; anything unparseable is logged and also keeps its default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Default delay between subscribe and handshake.
pub const DEFAULT_HANDSHAKE_DELAY_SECS: u64 = 5;

/// Default watchdog sweep interval.
pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 60;

/// Default number of missed heartbeat periods before a mirror counts as stale.
pub const DEFAULT_ERROR_THRESHOLD_MULTIPLIER: u32 = 3;

/// Default timeout for callback sends, source queries and destination calls.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 10;

/// Log filter used when `RUST_LOG` is unset. Only names crates the relay
/// actually logs from.
pub const DEFAULT_LOG_FILTER: &str = "subscription_relay=debug";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Unparseable { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub handshake_delay: Duration,
    pub watchdog_interval: Duration,
    pub error_threshold_multiplier: u32,
    pub callback_timeout: Duration,
    /// File backing the consumer store. In-memory when unset.
    pub state_file: Option<PathBuf>,
    /// Destination bindings. No downstream destinations when unset.
    pub destinations_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            handshake_delay: Duration::from_secs(DEFAULT_HANDSHAKE_DELAY_SECS),
            watchdog_interval: Duration::from_secs(DEFAULT_WATCHDOG_INTERVAL_SECS),
            error_threshold_multiplier: DEFAULT_ERROR_THRESHOLD_MULTIPLIER,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            state_file: None,
            destinations_file: None,
        }
    }
}

impl RelayConfig {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RelayConfig::default();
        let secs = |var: &'static str, default: Duration| {
            parse_or(&lookup, var, default.as_secs()).map_or(default, Duration::from_secs)
        };

        RelayConfig {
            listen_addr: parse_or(&lookup, "RELAY_LISTEN_ADDR", defaults.listen_addr)
                .unwrap_or(defaults.listen_addr),
            handshake_delay: secs("RELAY_HANDSHAKE_DELAY_SECS", defaults.handshake_delay),
            watchdog_interval: secs("RELAY_WATCHDOG_INTERVAL_SECS", defaults.watchdog_interval),
            error_threshold_multiplier: parse_or(
                &lookup,
                "RELAY_ERROR_THRESHOLD_MULTIPLIER",
                defaults.error_threshold_multiplier,
            )
            .unwrap_or(defaults.error_threshold_multiplier),
            callback_timeout: secs("RELAY_CALLBACK_TIMEOUT_SECS", defaults.callback_timeout),
            state_file: non_empty(&lookup, "RELAY_STATE_FILE").map(PathBuf::from),
            destinations_file: non_empty(&lookup, "RELAY_DESTINATIONS_FILE").map(PathBuf::from),
        }
    }

    /// Rejects values that would stall the relay.
    ///
    /// A zero handshake delay is allowed; zero intervals, multipliers and
    /// timeouts are not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_interval.is_zero() {
            return Err(ConfigError::Zero("watchdog_interval"));
        }
        if self.error_threshold_multiplier == 0 {
            return Err(ConfigError::Zero("error_threshold_multiplier"));
        }
        if self.callback_timeout.is_zero() {
            return Err(ConfigError::Zero("callback_timeout"));
        }
        Ok(())
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parses `var` if set. Unparseable values are logged and yield `None` so the
/// caller keeps its default.
fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Option<T> {
    let Some(raw) = non_empty(lookup, var) else {
        return Some(default);
    };
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            let err = ConfigError::Unparseable { var, value: raw };
            warn!(error = %err, "using default");
            None
        }
    }
}
