//! Configuration types.
//!
//! Built once at startup from the process environment and passed by
//! reference afterwards. Nothing else in the crate reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Default PDS the bot account signs in to.
pub const DEFAULT_ACCOUNT_SERVICE: &str = "https://bsky.social";

/// Default DID of the chat proxy service.
pub const DEFAULT_CHAT_SERVICE_DID: &str = "did:web:api.bsky.chat";

/// Default location of the persisted runtime state.
pub const DEFAULT_STATE_FILE: &str = "./state.json.local";

/// Posts on the network are capped at 300 graphemes.
pub const DEFAULT_MAX_LENGTH: usize = 300;

/// Default delay between the end of one poll cycle and the start of the next.
pub const DEFAULT_POLL_DELAY_MS: u64 = 5_000;

pub const DEFAULT_TOGGLE_WATCH_COMMAND: &str = "!menfess";
pub const DEFAULT_TOGGLE_FOLLOWBACK_COMMAND: &str = "!followback";

const DID_PATTERN: &str = r"^did:[a-z]+:[A-Za-z0-9._:%-]+$";

/// Credentials and endpoints for the bot account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// PDS base URL.
    pub service: String,
    /// Handle or DID used to sign in.
    pub identifier: String,
    pub password: SecretString,
    /// DID of the chat service all DM calls are proxied to.
    pub chat_service_did: String,
}

/// Behavior of the relay loop. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The only account allowed to send toggle commands.
    pub owner_did: String,
    /// Content messages must start with this prefix followed by a space.
    pub prefix: String,
    /// Maximum message length in graphemes.
    pub max_length: usize,
    /// Exact text that flips `watch_enabled`.
    pub toggle_watch_command: String,
    /// Exact text that flips `require_followback`.
    pub toggle_followback_command: String,
    /// Send a status report to the owner on launch.
    pub report_at_launch: bool,
    pub poll_delay: Duration,
    pub state_file: PathBuf,
    /// Directory for a daily-rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub account: AccountConfig,
    pub relay: RelayConfig,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated the same as missing ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let chat_service_did =
            get("CHAT_SERVICE_DID").unwrap_or_else(|| DEFAULT_CHAT_SERVICE_DID.to_string());
        check_did("CHAT_SERVICE_DID", &chat_service_did)?;

        let account = AccountConfig {
            service: get("ACCOUNT_SERVICE").unwrap_or_else(|| DEFAULT_ACCOUNT_SERVICE.to_string()),
            identifier: require("ACCOUNT_IDENTIFIER")?,
            password: SecretString::from(require("ACCOUNT_PASSWORD")?),
            chat_service_did,
        };

        let owner_did = require("OWNER_DID")?;
        check_did("OWNER_DID", &owner_did)?;

        let toggle_watch_command = get("MENFESS_TOGGLE_COMMAND")
            .unwrap_or_else(|| DEFAULT_TOGGLE_WATCH_COMMAND.to_string());
        let toggle_followback_command = get("MENFESS_FOLLOWBACK_COMMAND")
            .unwrap_or_else(|| DEFAULT_TOGGLE_FOLLOWBACK_COMMAND.to_string());
        if toggle_watch_command == toggle_followback_command {
            return Err(ConfigError::InvalidValue {
                key: "MENFESS_FOLLOWBACK_COMMAND".into(),
                message: "must differ from MENFESS_TOGGLE_COMMAND".into(),
            });
        }

        let max_length = match get("MENFESS_MAX_LENGTH") {
            Some(raw) => parse_number::<usize>("MENFESS_MAX_LENGTH", &raw)?,
            None => DEFAULT_MAX_LENGTH,
        };
        let poll_delay_ms = match get("MENFESS_POLL_DELAY_MS") {
            Some(raw) => parse_number::<u64>("MENFESS_POLL_DELAY_MS", &raw)?,
            None => DEFAULT_POLL_DELAY_MS,
        };

        let relay = RelayConfig {
            owner_did,
            prefix: require("MENFESS_PREFIX")?,
            max_length,
            toggle_watch_command,
            toggle_followback_command,
            report_at_launch: parse_bool(
                "MENFESS_REPORT_AT_LAUNCH",
                &require("MENFESS_REPORT_AT_LAUNCH")?,
            )?,
            poll_delay: Duration::from_millis(poll_delay_ms),
            state_file: get("STATE_PERSISTENCE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            log_dir: get("MENFESS_LOG_DIR").map(PathBuf::from),
        };

        Ok(Self { account, relay })
    }
}

fn check_did(key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.into(),
        message,
    };
    let pattern = Regex::new(DID_PATTERN).map_err(|e| invalid(e.to_string()))?;
    if pattern.is_match(value) {
        Ok(())
    } else {
        Err(invalid(format!("{value:?} is not a DID")))
    }
}

/// Only the exact strings `true` and `false` are accepted.
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected \"true\" or \"false\", got {other:?}"),
        }),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed = value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: e.to_string(),
    })?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}
