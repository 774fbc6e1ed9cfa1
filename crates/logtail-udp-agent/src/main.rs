// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logtail_udp::{
    config::Config,
    constants::{DEFAULT_LOG_LEVEL, LOG_LEVELS},
    coordinator::Coordinator,
    flusher::FlushOutcome,
};

const EXIT_BIND_ERROR: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

#[tokio::main]
pub async fn main() -> ExitCode {
    // Logging is needed to report config errors, so the level is read before validation.
    let env_filter = filter_directive(env::var("LOGTAIL_LOG_LEVEL").ok());

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    info!("[LogtailUDP] version {}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Err: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    debug!("Loaded configuration: {:?}", config);

    let coordinator = match Coordinator::start(&config).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("Err: {e}");
            return ExitCode::from(EXIT_BIND_ERROR);
        }
    };

    match coordinator.run_until(shutdown_signal()).await {
        FlushOutcome::Empty => info!("Nothing left to send"),
        FlushOutcome::BelowMinimum { discarded } => {
            info!("Discarded {discarded} log entries on shutdown")
        }
        FlushOutcome::Sent { entries, status } => {
            info!("Sent last {entries} log entries, status {status}")
        }
        FlushOutcome::Failed { entries, error } => {
            error!("Lost last {entries} log entries: {error}")
        }
    }

    ExitCode::SUCCESS
}

/// Subscriber filter for the given level. Unknown levels fall back to the default.
fn filter_directive(log_level: Option<String>) -> String {
    let log_level = log_level
        .map(|val| val.trim().to_lowercase())
        .filter(|val| LOG_LEVELS.contains(&val.as_str()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    format!("h2=off,hyper=off,rustls=off,{}", log_level)
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
