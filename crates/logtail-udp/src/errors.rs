// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while reading the collector configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} required")]
    Missing(&'static str),

    #[error("{var} invalid ({reason})")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Startup errors. These are the only errors that stop the collector.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot listen {addr} ({source})")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single delivery attempt. Logged and swallowed by the flusher.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("cannot create http request ({0})")]
    Payload(String),

    #[error("logtail error ({1})")]
    Destination(Option<StatusCode>, String),
}
