// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions for reading collector settings.

use std::time::Duration;

/// Parses a send interval such as `10s`, `500ms` or `1m30s`.
///
/// Anything `humantime` understands is accepted. A bare integer is read as seconds.
/// Whitespace around the value is ignored.
///
/// # Examples
///
/// ```
/// use logtail_udp::util::parse_interval;
/// use std::time::Duration;
///
/// assert_eq!(parse_interval("10s"), Ok(Duration::from_secs(10)));
/// assert_eq!(parse_interval("1m30s"), Ok(Duration::from_secs(90)));
/// assert_eq!(parse_interval("250ms"), Ok(Duration::from_millis(250)));
/// assert_eq!(parse_interval("15"), Ok(Duration::from_secs(15)));
/// assert!(parse_interval("ten seconds").is_err());
/// ```
pub fn parse_interval(value: &str) -> Result<Duration, humantime::DurationError> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(trimmed)
}
