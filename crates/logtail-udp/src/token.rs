// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::header::{HeaderValue, InvalidHeaderValue};
use std::fmt::Debug;

/// Source token used to authenticate against the Logtail ingestion endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value for this token, marked sensitive so it never shows up in
    /// request debug output.
    pub fn bearer_header(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthToken(<redacted>)")
    }
}

#[cfg(test)]
pub mod tests {
    use crate::token::AuthToken;

    #[test]
    fn bearer_header() {
        let token = AuthToken::new("mock-token");
        let header = token.bearer_header().expect("valid header");
        assert_eq!(header.to_str().unwrap(), "Bearer mock-token");
        assert!(header.is_sensitive());
    }

    #[test]
    fn bearer_header_rejects_control_characters() {
        let token = AuthToken::new("bad\ntoken");
        assert!(token.bearer_header().is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let token = AuthToken::new("super-secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert_eq!(token.as_str(), "super-secret");
    }
}
