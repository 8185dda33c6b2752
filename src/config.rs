//! Application-level configuration loading: chat limits, session lifetime, durable
//! write policy and the privileged accounts allowed to use dev mode.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TICTAC_BACK_CONFIG_PATH";

const DEFAULT_CHAT_HISTORY_LIMIT: usize = 100;
const DEFAULT_CHAT_MAX_CHARS: usize = 200;
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24;
const DEFAULT_DURABLE_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_DURABLE_CALL_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    chat_history_limit: usize,
    chat_max_chars: usize,
    session_ttl: Duration,
    privileged_usernames: Vec<String>,
    durable_retry_attempts: u32,
    durable_call_timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        privileged = app_config.privileged_usernames.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; missing keys take their defaults.
    pub fn from_json_str(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Number of chat entries retained in memory.
    pub fn chat_history_limit(&self) -> usize {
        self.chat_history_limit
    }

    /// Longest accepted chat message, in characters.
    pub fn chat_max_chars(&self) -> usize {
        self.chat_max_chars
    }

    /// Lifetime of a login session.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Accounts holding the dev-mode capability.
    pub fn privileged_usernames(&self) -> &[String] {
        &self.privileged_usernames
    }

    /// Attempts per durable write before it is dropped.
    pub fn durable_retry_attempts(&self) -> u32 {
        self.durable_retry_attempts
    }

    /// Upper bound for one durable store call.
    pub fn durable_call_timeout(&self) -> Duration {
        self.durable_call_timeout
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    chat_history_limit: usize,
    chat_max_chars: usize,
    session_ttl_secs: u64,
    privileged_usernames: Vec<String>,
    durable_retry_attempts: u32,
    durable_call_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
            chat_max_chars: DEFAULT_CHAT_MAX_CHARS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            privileged_usernames: Vec::new(),
            durable_retry_attempts: DEFAULT_DURABLE_RETRY_ATTEMPTS,
            durable_call_timeout_ms: DEFAULT_DURABLE_CALL_TIMEOUT_MS,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            chat_history_limit: value.chat_history_limit,
            chat_max_chars: value.chat_max_chars,
            session_ttl: Duration::from_secs(value.session_ttl_secs),
            privileged_usernames: value.privileged_usernames,
            durable_retry_attempts: value.durable_retry_attempts.max(1),
            durable_call_timeout: Duration::from_millis(value.durable_call_timeout_ms),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
