//! Runtime configuration for the gsearch binary.
//!
//! Values come from the process environment, which may be seeded from `.env`
//! files. Variables already set in the environment are never overwritten by a
//! `.env` file, so the precedence is: process environment, `./.env`, then
//! `{config_dir}/gsearch/.env`. CLI flags are applied on top by the caller.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::admission::{PolicyError, RateLimitPolicy};
use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const ENV_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";
pub const ENV_MAX_CALLS: &str = "GSEARCH_MAX_CALLS";
pub const ENV_WINDOW_SECS: &str = "GSEARCH_WINDOW_SECS";
pub const ENV_TIMEOUT_SECS: &str = "GSEARCH_TIMEOUT_SECS";

pub const DEFAULT_MAX_CALLS: u32 = 5;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised while assembling configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to something that does not parse
    #[error("{key} has invalid value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The configured rate limit policy is not usable
    #[error("invalid rate limit policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Settings needed to build the search service.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Gemini API key; absence is reported per request, not at startup
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_calls_per_window: u32,
    pub window_secs: u64,
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_calls_per_window: DEFAULT_MAX_CALLS,
            window_secs: DEFAULT_WINDOW_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_calls_per_window", &self.max_calls_per_window)
            .field("window_secs", &self.window_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            api_key: get(ENV_API_KEY),
            model: get(ENV_MODEL).unwrap_or(defaults.model),
            base_url: get(ENV_BASE_URL).unwrap_or(defaults.base_url),
            max_calls_per_window: parse_number(ENV_MAX_CALLS, get(ENV_MAX_CALLS))?
                .unwrap_or(defaults.max_calls_per_window),
            window_secs: parse_number(ENV_WINDOW_SECS, get(ENV_WINDOW_SECS))?
                .unwrap_or(defaults.window_secs),
            timeout_secs: parse_number(ENV_TIMEOUT_SECS, get(ENV_TIMEOUT_SECS))?
                .unwrap_or(defaults.timeout_secs),
        })
    }

    /// Builds the rate limit policy described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Policy` if the limit or window is zero or the
    /// window is longer than `MAX_WINDOW`, or
    /// `ConfigError::InvalidValue` if the window does not fit a duration.
    pub fn policy(&self) -> Result<RateLimitPolicy, ConfigError> {
        let window_secs =
            i64::try_from(self.window_secs).map_err(|e| ConfigError::InvalidValue {
                key: ENV_WINDOW_SECS,
                value: self.window_secs.to_string(),
                reason: e.to_string(),
            })?;
        Ok(RateLimitPolicy::new(
            self.max_calls_per_window,
            time::Duration::seconds(window_secs),
        )?)
    }

    /// Returns the HTTP request timeout.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn parse_number<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    key,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

/// Returns the per-user `.env` location, `{config_dir}/gsearch/.env`.
pub fn user_env_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gsearch").join(".env"))
}

/// Loads `.env` from `dir` into the process environment, if present.
///
/// Returns the path that was loaded. Existing variables are kept.
pub fn load_dotenv_from(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(".env");
    if !path.is_file() {
        return None;
    }
    match dotenvy::from_path(&path) {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable .env file");
            None
        }
    }
}

/// Loads `./.env` and then the per-user `.env`, returning the files that were read.
pub fn load_dotenv_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        loaded.extend(load_dotenv_from(&cwd));
    }
    if let Some(dir) = user_env_path().as_deref().and_then(Path::parent) {
        loaded.extend(load_dotenv_from(dir));
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "abc"),
            (ENV_MODEL, "gemini-test"),
            (ENV_BASE_URL, "http://localhost:9999"),
            (ENV_MAX_CALLS, "3"),
            (ENV_WINDOW_SECS, " 120 "),
            (ENV_TIMEOUT_SECS, "5"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.model, "gemini-test");
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.max_calls_per_window, 3);
        assert_eq!(config.window_secs, 120);
        assert_eq!(config.timeout(), std::time::Duration::from_secs(5));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config =
            AppConfig::from_lookup(lookup_from(&[(ENV_API_KEY, "  "), (ENV_MODEL, "")])).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[(ENV_MAX_CALLS, "lots")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: ENV_MAX_CALLS, ref value, .. }) if value == "lots"
        ));
    }

    #[test]
    fn policy_is_built_from_config() {
        let config = AppConfig {
            max_calls_per_window: 3,
            window_secs: 60,
            ..AppConfig::default()
        };
        let policy = config.policy().unwrap();
        assert_eq!(policy.max_calls_per_window(), 3);
        assert_eq!(policy.window(), time::Duration::seconds(60));
    }

    #[test]
    fn zero_limit_is_a_configuration_error() {
        let config = AppConfig {
            max_calls_per_window: 0,
            ..AppConfig::default()
        };
        assert_eq!(
            config.policy(),
            Err(ConfigError::Policy(PolicyError::ZeroMaxCalls))
        );
    }

    #[test]
    fn oversized_window_is_a_configuration_error() {
        let config = AppConfig {
            window_secs: 400_000_000_000,
            ..AppConfig::default()
        };
        assert_eq!(
            config.policy(),
            Err(ConfigError::Policy(PolicyError::WindowTooLong(
                time::Duration::seconds(400_000_000_000)
            )))
        );

        let config = AppConfig {
            window_secs: u64::MAX,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.policy(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("secret".to_string()),
            ..AppConfig::default()
        };
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    #[serial]
    fn load_dotenv_from_sets_missing_variables_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "GSEARCH_TEST_FROM_FILE=file\nGSEARCH_TEST_PRESET=file\n",
        )
        .unwrap();

        unsafe {
            std::env::remove_var("GSEARCH_TEST_FROM_FILE");
            std::env::set_var("GSEARCH_TEST_PRESET", "process");
        }

        let loaded = load_dotenv_from(dir.path());

        assert_eq!(loaded, Some(dir.path().join(".env")));
        assert_eq!(std::env::var("GSEARCH_TEST_FROM_FILE").as_deref(), Ok("file"));
        assert_eq!(std::env::var("GSEARCH_TEST_PRESET").as_deref(), Ok("process"));

        unsafe {
            std::env::remove_var("GSEARCH_TEST_FROM_FILE");
            std::env::remove_var("GSEARCH_TEST_PRESET");
        }
    }

    #[test]
    fn load_dotenv_from_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_dotenv_from(dir.path()), None);
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        unsafe {
            std::env::set_var(ENV_MODEL, "gemini-from-env");
            std::env::set_var(ENV_MAX_CALLS, "7");
        }

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.model, "gemini-from-env");
        assert_eq!(config.max_calls_per_window, 7);

        unsafe {
            std::env::remove_var(ENV_MODEL);
            std::env::remove_var(ENV_MAX_CALLS);
        }
    }
}
