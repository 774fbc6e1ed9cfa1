// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector lifecycle.
//!
//! The coordinator owns the listener and scheduler tasks. Both share one cancellation token;
//! shutting down cancels it, waits for both tasks to return, then sends whatever is left in a
//! final flush.

use crate::buffer::{EntryBuffer, LogEntry};
use crate::config::Config;
use crate::constants::FINAL_FLUSH_MIN_BATCH_SIZE;
use crate::errors::Error;
use crate::flusher::{FlushOutcome, Flusher, FlusherConfig};
use crate::listener::{Listener, ListenerConfig};
use crate::scheduler::FlushScheduler;
use derive_more::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle state of the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CollectorState {
    /// Receiving datagrams and flushing on schedule.
    Running,
    /// Shutdown requested. No more datagrams are read.
    Draining,
    /// The final flush is done.
    Stopped,
}

/// Handle to a running collector.
pub struct Coordinator {
    buffer: Arc<EntryBuffer>,
    flusher: Flusher,
    cancel_token: CancellationToken,
    local_addr: SocketAddr,
    listener: JoinHandle<Option<LogEntry>>,
    scheduler: JoinHandle<()>,
    state_tx: watch::Sender<CollectorState>,
}

impl Coordinator {
    /// Binds the socket and spawns the listener and scheduler tasks.
    ///
    /// Fails only if the socket cannot be bound, in which case nothing has been spawned.
    pub async fn start(config: &Config) -> Result<Coordinator, Error> {
        let buffer = Arc::new(EntryBuffer::new(config.batch_size));
        let cancel_token = CancellationToken::new();

        let listener_config = ListenerConfig {
            host: config.listen_host,
            port: config.listen_port,
        };
        let listener =
            Listener::bind(&listener_config, Arc::clone(&buffer), cancel_token.clone()).await?;
        let local_addr = listener.local_addr()?;

        let flusher = Flusher::new(FlusherConfig {
            token: config.token.clone(),
            buffer: Arc::clone(&buffer),
            endpoint: config.endpoint.clone(),
            https_proxy: config.https_proxy.clone(),
            compression_level: config.compression_level,
        });
        let scheduler = FlushScheduler::new(
            flusher.clone(),
            config.send_interval,
            config.min_batch_size,
            cancel_token.clone(),
        );

        let listener = tokio::spawn(listener.spin());
        let scheduler = tokio::spawn(scheduler.run());
        let (state_tx, _) = watch::channel(CollectorState::Running);

        info!(
            "logtail-udp: listening on {}, flushing up to {} entries every {:?} to {}",
            local_addr, config.batch_size, config.send_interval, config.endpoint
        );

        Ok(Coordinator {
            buffer,
            flusher,
            cancel_token,
            local_addr,
            listener,
            scheduler,
            state_tx,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn state(&self) -> CollectorState {
        *self.state_tx.borrow()
    }

    /// Get a receiver for state updates.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CollectorState> {
        self.state_tx.subscribe()
    }

    /// Waits for `signal`, then shuts down.
    pub async fn run_until<F>(self, signal: F) -> FlushOutcome
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("Termination signal received");
        self.shutdown().await
    }

    /// Stops reading, stops the scheduler and sends everything still buffered.
    pub async fn shutdown(self) -> FlushOutcome {
        info!("Shutting down log collector");
        self.state_tx.send_replace(CollectorState::Draining);
        self.cancel_token.cancel();

        // The scheduler has to be gone before the final drain
        if let Err(e) = self.scheduler.await {
            error!("Flush scheduler task failed: {}", e);
        }
        let pending = match self.listener.await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Listener task failed: {}", e);
                None
            }
        };

        let mut batch = self.buffer.drain_available();
        batch.extend(pending);
        debug!("Final flush of {} log entries", batch.len());
        let outcome = self
            .flusher
            .flush_batch(batch, FINAL_FLUSH_MIN_BATCH_SIZE)
            .await;

        self.state_tx.send_replace(CollectorState::Stopped);
        info!("Log collector stopped");
        outcome
    }
}
