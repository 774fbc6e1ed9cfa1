// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_ENDPOINT, DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT,
    DEFAULT_LOG_LEVEL, DEFAULT_MIN_BATCH_SIZE, DEFAULT_SEND_INTERVAL, LOG_LEVELS, MAX_BATCH_SIZE,
    MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL,
};
use crate::errors::ConfigError;
use crate::token::AuthToken;
use crate::util::parse_interval;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const TOKEN_VAR: &str = "LOGTAIL_TOKEN";
const HOST_VAR: &str = "LISTEN_HOST";
const PORT_VAR: &str = "LISTEN_PORT";
const INTERVAL_VAR: &str = "LOGTAIL_SEND_INTERVAL";
const BATCH_SIZE_VAR: &str = "LOGS_BATCH_SIZE";
const MIN_BATCH_SIZE_VAR: &str = "LOGTAIL_MIN_BATCH_SIZE";
const ENDPOINT_VAR: &str = "LOGTAIL_URL";
const COMPRESSION_VAR: &str = "LOGTAIL_COMPRESSION_LEVEL";
const LOG_LEVEL_VAR: &str = "LOGTAIL_LOG_LEVEL";
const PROXY_VARS: [&str; 2] = ["LOGTAIL_PROXY_HTTPS", "HTTPS_PROXY"];

/// Collector configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Logtail source token sent as a bearer token
    pub token: AuthToken,
    /// Address the UDP socket binds to
    pub listen_host: IpAddr,
    /// Port the UDP socket binds to (0 lets the OS pick, tests only)
    pub listen_port: u16,
    /// Time between two scheduled flushes
    pub send_interval: Duration,
    /// Capacity of the entry buffer, and so the largest batch
    pub batch_size: usize,
    /// Scheduled flushes with fewer entries than this are discarded
    pub min_batch_size: usize,
    /// Ingestion URL every batch is POSTed to
    pub endpoint: String,
    /// zstd level for request bodies, `None` sends them uncompressed
    pub compression_level: Option<i32>,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Configuration with every optional setting at its default.
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self {
            token: AuthToken::new(token),
            listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: DEFAULT_LISTEN_PORT,
            send_interval: DEFAULT_SEND_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            compression_level: None,
            https_proxy: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Create configuration from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|val| !val.trim().is_empty());

        let token = get(TOKEN_VAR).ok_or(ConfigError::Missing(TOKEN_VAR))?;

        let listen_host = get(HOST_VAR)
            .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string())
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::invalid(HOST_VAR, e.to_string()))?;

        let listen_port = match get(PORT_VAR) {
            Some(port) => parse_port(&port)?,
            None => DEFAULT_LISTEN_PORT,
        };

        let send_interval = match get(INTERVAL_VAR) {
            Some(interval) => {
                parse_interval(&interval)
                    .map_err(|e| ConfigError::invalid(INTERVAL_VAR, e.to_string()))?
            }
            None => DEFAULT_SEND_INTERVAL,
        };

        let batch_size = match get(BATCH_SIZE_VAR) {
            Some(size) => parse_count(BATCH_SIZE_VAR, &size)?,
            None => DEFAULT_BATCH_SIZE,
        };

        let min_batch_size = match get(MIN_BATCH_SIZE_VAR) {
            Some(size) => parse_count(MIN_BATCH_SIZE_VAR, &size)?,
            None => DEFAULT_MIN_BATCH_SIZE,
        };

        let endpoint = get(ENDPOINT_VAR)
            .map(|url| url.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let compression_level = get(COMPRESSION_VAR)
            .map(|level| {
                level
                    .trim()
                    .parse::<i32>()
                    .map_err(|e| ConfigError::invalid(COMPRESSION_VAR, e.to_string()))
            })
            .transpose()?;

        let https_proxy = PROXY_VARS.iter().find_map(|&var| get(var));

        let log_level = get(LOG_LEVEL_VAR)
            .map(|val| val.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let config = Self {
            token: AuthToken::new(token.trim()),
            listen_host,
            listen_port,
            send_interval,
            batch_size,
            min_batch_size,
            endpoint,
            compression_level,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.as_str().trim().is_empty() {
            return Err(ConfigError::Missing(TOKEN_VAR));
        }

        if self.send_interval.is_zero() {
            return Err(ConfigError::invalid(
                INTERVAL_VAR,
                "must be greater than zero",
            ));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::invalid(
                BATCH_SIZE_VAR,
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }

        // A drain never returns more than batch_size entries, so a larger minimum would
        // discard every scheduled batch.
        if self.min_batch_size == 0 || self.min_batch_size > self.batch_size {
            return Err(ConfigError::invalid(
                MIN_BATCH_SIZE_VAR,
                format!("must be between 1 and {BATCH_SIZE_VAR} ({})", self.batch_size),
            ));
        }

        match reqwest::Url::parse(&self.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::invalid(
                    ENDPOINT_VAR,
                    format!("unsupported scheme '{}'", url.scheme()),
                ))
            }
            Err(e) => return Err(ConfigError::invalid(ENDPOINT_VAR, e.to_string())),
        }

        if let Some(level) = self.compression_level {
            if !(MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&level) {
                return Err(ConfigError::invalid(
                    COMPRESSION_VAR,
                    format!(
                        "must be between {MIN_COMPRESSION_LEVEL} and {MAX_COMPRESSION_LEVEL}"
                    ),
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid(
                LOG_LEVEL_VAR,
                format!(
                    "'{}' must be one of: trace, debug, info, warn, error",
                    self.log_level
                ),
            ));
        }

        Ok(())
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    let port: i64 = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::invalid(PORT_VAR, e.to_string()))?;
    match u16::try_from(port) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::invalid(
            PORT_VAR,
            "must be between 1 and 65535",
        )),
    }
}

fn parse_count(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    let count: usize = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::invalid(var, e.to_string()))?;
    if count == 0 {
        return Err(ConfigError::invalid(var, "must be greater than 0"));
    }
    Ok(count)
}
