//! Server and client configuration parsed from environment variables.
//!
//! LLM settings live in [`crate::llm::config`]; this module covers the HTTP
//! server and the capture client. Both read through a lookup closure so
//! tests can feed a map instead of mutating the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::detection::DEFAULT_MODEL_DIR;
use crate::services::reading::DEFAULT_READING_MAX_TOKENS;
use crate::workflow::{DEFAULT_SUBMIT_TIMEOUT_SECS, DEFAULT_VALIDATE_TIMEOUT_SECS, WorkflowTimeouts};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_ANALYZE_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_DATA_DIR: &str = ".palmreader";
pub const DEFAULT_DETECTOR_URL: &str = "http://127.0.0.1:8765";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl crate::error::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        "E_CONFIG_PARSE"
    }
}

// =============================================================================
// SERVER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub analyze_timeout_secs: u64,
    pub body_limit_bytes: usize,
    pub reading_max_tokens: u32,
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `PORT`, `ANALYZE_TIMEOUT_SECS`,
    /// `ANALYZE_BODY_LIMIT_BYTES` and `READING_MAX_TOKENS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for any value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: parse(&lookup, "PORT", DEFAULT_PORT)?,
            analyze_timeout_secs: parse(&lookup, "ANALYZE_TIMEOUT_SECS", DEFAULT_ANALYZE_TIMEOUT_SECS)?,
            body_limit_bytes: parse(&lookup, "ANALYZE_BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES)?,
            reading_max_tokens: parse(&lookup, "READING_MAX_TOKENS", DEFAULT_READING_MAX_TOKENS)?,
        })
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_addr:port` is not a socket
    /// address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_addr, self.port);
        raw.parse()
            .map_err(|_| ConfigError::Invalid { key: "BIND_ADDR", value: raw })
    }

    #[must_use]
    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub detector_url: String,
    pub validate_timeout_secs: u64,
    pub submit_timeout_secs: u64,
}

impl ClientConfig {
    /// Read `PALM_API_URL`, `PALM_DATA_DIR`, `HAND_MODEL_DIR`,
    /// `HAND_DETECTOR_URL`, `VALIDATE_TIMEOUT_SECS` and `SUBMIT_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for any value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: lookup("PALM_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            data_dir: lookup("PALM_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            model_dir: lookup("HAND_MODEL_DIR").map_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR), PathBuf::from),
            detector_url: lookup("HAND_DETECTOR_URL").unwrap_or_else(|| DEFAULT_DETECTOR_URL.to_string()),
            validate_timeout_secs: parse(&lookup, "VALIDATE_TIMEOUT_SECS", DEFAULT_VALIDATE_TIMEOUT_SECS)?,
            submit_timeout_secs: parse(&lookup, "SUBMIT_TIMEOUT_SECS", DEFAULT_SUBMIT_TIMEOUT_SECS)?,
        })
    }

    #[must_use]
    pub fn timeouts(&self) -> WorkflowTimeouts {
        WorkflowTimeouts {
            validate: Duration::from_secs(self.validate_timeout_secs),
            submit: Duration::from_secs(self.submit_timeout_secs),
        }
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
