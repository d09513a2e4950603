// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! by the passkey client. Configuration is loaded from the environment once
//! per application session.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `API_BASE_URL` | Wallet backend base URL | `https://apis.aboki.xyz` |
//! | `PASSKEY_TOKEN_LIFETIME_SECS` | Validity window of a minted verification token | `300` |
//! | `PASSKEY_EXPIRY_WARNING_SECS` | Remaining lifetime below which a warning is logged | `30` |
//! | `PASSKEY_SUBMIT_WARNING_SECS` | Same, for bank cash-out confirmations | `10` |
//! | `PASSKEY_CEREMONY_TIMEOUT_SECS` | Authenticator wait when the backend suggests none | `60` |
//! | `HTTP_TIMEOUT_SECS` | Per-request HTTP timeout | `15` |
//! | `SESSION_DIR` | Directory for session-scoped token persistence | unset (memory only) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,relational_passkey_client=debug` |

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::logging::LogFormat;

/// Environment variable name for the backend base URL.
pub const API_BASE_URL_ENV: &str = "API_BASE_URL";

/// Environment variable name for the verification token lifetime.
pub const TOKEN_LIFETIME_ENV: &str = "PASSKEY_TOKEN_LIFETIME_SECS";

/// Environment variable name for the expiring-soon warning threshold.
pub const EXPIRY_WARNING_ENV: &str = "PASSKEY_EXPIRY_WARNING_SECS";

/// Environment variable name for the bank confirmation warning threshold.
pub const SUBMIT_WARNING_ENV: &str = "PASSKEY_SUBMIT_WARNING_SECS";

/// Environment variable name for the default authenticator timeout.
pub const CEREMONY_TIMEOUT_ENV: &str = "PASSKEY_CEREMONY_TIMEOUT_SECS";

/// Environment variable name for the HTTP request timeout.
pub const HTTP_TIMEOUT_ENV: &str = "HTTP_TIMEOUT_SECS";

/// Environment variable name for the session storage directory.
///
/// The directory should live on a per-session scratch location (for example
/// under `$XDG_RUNTIME_DIR`) so tokens never outlive the login session.
pub const SESSION_DIR_ENV: &str = "SESSION_DIR";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_API_BASE_URL: &str = "https://apis.aboki.xyz";

/// Tokens are one-shot server side and expire after five minutes.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_EXPIRY_WARNING: Duration = Duration::from_secs(30);
pub const DEFAULT_SUBMIT_WARNING: Duration = Duration::from_secs(10);
pub const DEFAULT_CEREMONY_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{name} must be a positive number of seconds, got `{value}`")]
    InvalidDuration { name: &'static str, value: String },

    #[error("{name} must be `json` or `pretty`, got `{value}`")]
    InvalidLogFormat { name: &'static str, value: String },
}

/// Client configuration shared by every flow in an application session.
#[derive(Debug, Clone)]
pub struct PasskeyConfig {
    pub api_base_url: Url,
    pub token_lifetime: Duration,
    pub expiry_warning: Duration,
    pub submit_warning: Duration,
    pub ceremony_timeout: Duration,
    pub http_timeout: Duration,
    pub session_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for PasskeyConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            expiry_warning: DEFAULT_EXPIRY_WARNING,
            submit_warning: DEFAULT_SUBMIT_WARNING,
            ceremony_timeout: DEFAULT_CEREMONY_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            session_dir: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl PasskeyConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();

        let api_base_url = match get(API_BASE_URL_ENV) {
            Some(raw) => Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
                name: API_BASE_URL_ENV,
                reason: e.to_string(),
            })?,
            None => defaults.api_base_url,
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat {
                name: LOG_FORMAT_ENV,
                value: raw,
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            api_base_url,
            token_lifetime: secs_or_default(
                get(TOKEN_LIFETIME_ENV),
                TOKEN_LIFETIME_ENV,
                defaults.token_lifetime,
            )?,
            expiry_warning: secs_or_default(
                get(EXPIRY_WARNING_ENV),
                EXPIRY_WARNING_ENV,
                defaults.expiry_warning,
            )?,
            submit_warning: secs_or_default(
                get(SUBMIT_WARNING_ENV),
                SUBMIT_WARNING_ENV,
                defaults.submit_warning,
            )?,
            ceremony_timeout: secs_or_default(
                get(CEREMONY_TIMEOUT_ENV),
                CEREMONY_TIMEOUT_ENV,
                defaults.ceremony_timeout,
            )?,
            http_timeout: secs_or_default(
                get(HTTP_TIMEOUT_ENV),
                HTTP_TIMEOUT_ENV,
                defaults.http_timeout,
            )?,
            session_dir: get(SESSION_DIR_ENV).map(PathBuf::from),
            log_format,
        })
    }
}

fn secs_or_default(
    raw: Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidDuration { name, value: raw }),
    }
}
