// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 49152;
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_MIN_BATCH_SIZE: usize = 1;
pub const DEFAULT_ENDPOINT: &str = "https://in.logtail.com";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The shutdown flush sends anything that is left, whatever the configured minimum.
pub const FINAL_FLUSH_MIN_BATCH_SIZE: usize = 1;

/// Largest entry buffer tokio's bounded channel can hold.
pub const MAX_BATCH_SIZE: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Largest UDP payload we accept in one datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

pub const MIN_COMPRESSION_LEVEL: i32 = 1;
pub const MAX_COMPRESSION_LEVEL: i32 = 22;

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
