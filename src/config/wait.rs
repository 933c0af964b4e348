use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_value};
use crate::error::ConfigError;

const STARTUP_TIMEOUT_KEY: &str = "WAIT_STARTUP_TIMEOUT_SECS";
const POLL_INTERVAL_KEY: &str = "WAIT_POLL_INTERVAL_MS";

/// Timing defaults shared by every wait strategy.
///
/// Strategies start from [`WaitDefaults::default`]; callers that want the
/// environment to drive timing (slow CI hosts, debugging sessions) resolve
/// a `WaitDefaults` once and hand it to each strategy's `with_defaults`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitDefaults {
    /// Maximum time a strategy waits on its own. `None` defers entirely to
    /// the caller's deadline.
    pub startup_timeout: Option<Duration>,
    /// Pause between two probes.
    pub poll_interval: Duration,
}

impl Default for WaitDefaults {
    fn default() -> Self {
        Self {
            startup_timeout: Some(Duration::from_secs(60)),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WaitDefaults {
    /// Resolve defaults from `WAIT_STARTUP_TIMEOUT_SECS` and
    /// `WAIT_POLL_INTERVAL_MS`.
    pub fn resolve() -> Result<Self, ConfigError> {
        Self::from_values(
            optional_env(STARTUP_TIMEOUT_KEY)?,
            optional_env(POLL_INTERVAL_KEY)?,
        )
    }

    /// Resolve defaults from a `.env` file instead of the process
    /// environment. Keys missing from the file keep their defaults.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let env_file_error = |e: dotenvy::Error| ConfigError::EnvFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let vars = dotenvy::from_path_iter(path)
            .map_err(env_file_error)?
            .collect::<Result<HashMap<String, String>, _>>()
            .map_err(env_file_error)?;

        Self::from_values(
            vars.get(STARTUP_TIMEOUT_KEY).cloned(),
            vars.get(POLL_INTERVAL_KEY).cloned(),
        )
    }

    fn from_values(
        startup_timeout: Option<String>,
        poll_interval: Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_secs = defaults.startup_timeout.map_or(0, |d| d.as_secs());
        let startup_secs: u64 =
            parse_optional_value(STARTUP_TIMEOUT_KEY, startup_timeout, default_secs)?;

        let default_ms = defaults.poll_interval.as_millis() as u64;
        let poll_ms: u64 = parse_optional_value(POLL_INTERVAL_KEY, poll_interval, default_ms)?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: POLL_INTERVAL_KEY.to_string(),
                message: "must be a positive number of milliseconds".to_string(),
            });
        }

        Ok(Self {
            // Zero means "no timeout of our own".
            startup_timeout: (startup_secs > 0).then(|| Duration::from_secs(startup_secs)),
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}
