// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP ingestion listener.
//!
//! Every datagram becomes one [`LogEntry`]: the payload is decoded as UTF-8 (invalid sequences
//! are replaced, never rejected) and stored with the sender address. When the entry buffer is
//! full the listener stops reading and waits for a free slot, so the kernel socket buffer takes
//! the backpressure.

use std::net::{IpAddr, SocketAddr};
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::buffer::{EntryBuffer, LogEntry};
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::errors::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Address the UDP socket binds to
pub struct ListenerConfig {
    pub host: IpAddr,
    pub port: u16,
}

// BufferReader abstracts where datagrams come from.
enum BufferReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Mirror reader for testing - replays a fixed buffer
    #[allow(dead_code)]
    MirrorTest(Vec<u8>, SocketAddr),

    /// Replays queued reads in order, then waits forever
    #[cfg(test)]
    ScriptedTest(
        std::sync::Mutex<std::collections::VecDeque<std::io::Result<Vec<u8>>>>,
        SocketAddr,
    ),
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = vec![0; MAX_DATAGRAM_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                buf.truncate(amt);
                Ok((buf, src))
            }
            BufferReader::MirrorTest(data, addr) => Ok((data.clone(), *addr)),
            #[cfg(test)]
            BufferReader::ScriptedTest(reads, addr) => {
                let next = reads.lock().expect("lock poisoned").pop_front();
                match next {
                    Some(read) => read.map(|data| (data, *addr)),
                    None => std::future::pending().await,
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            BufferReader::UdpSocket(socket) => socket.local_addr(),
            BufferReader::MirrorTest(_, addr) => Ok(*addr),
            #[cfg(test)]
            BufferReader::ScriptedTest(_, addr) => Ok(*addr),
        }
    }
}

/// Receives datagrams and stores them in the entry buffer until cancelled.
pub struct Listener {
    cancel_token: CancellationToken,
    buffer: Arc<EntryBuffer>,
    buffer_reader: BufferReader,
}

impl Listener {
    /// Binds the UDP socket. Nothing is read until [`Listener::spin`] runs.
    pub async fn bind(
        config: &ListenerConfig,
        buffer: Arc<EntryBuffer>,
        cancel_token: CancellationToken,
    ) -> Result<Listener, Error> {
        let addr = SocketAddr::new(config.host, config.port);
        let socket = tokio::net::UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind {
                addr: addr.to_string(),
                source,
            })?;
        debug!("Listening for log datagrams on {}", addr);

        Ok(Listener {
            cancel_token,
            buffer,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    /// Bound address. Differs from the configured one when port 0 was requested.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.buffer_reader
            .local_addr()
            .map_err(|source| Error::Bind {
                addr: "local address".to_string(),
                source,
            })
    }

    /// Main loop. Returns once the cancel token fires.
    ///
    /// If cancellation interrupts a wait for a free buffer slot, the datagram that was being
    /// stored is returned so the caller can still ship it.
    pub async fn spin(self) -> Option<LogEntry> {
        loop {
            if let ControlFlow::Break(pending) = self.consume().await {
                debug!("Listener stopped");
                return pending;
            }
        }
    }

    /// Receive one datagram and store it.
    async fn consume(&self) -> ControlFlow<Option<LogEntry>> {
        let read = tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => return ControlFlow::Break(None),
            read = self.buffer_reader.read() => read,
        };

        let (buf, src) = match read {
            Ok(datagram) => datagram,
            Err(e) => {
                error!("Failed to receive datagram: {}", e);
                return ControlFlow::Continue(());
            }
        };

        debug!("Received {} bytes from {}", buf.len(), src);
        let payload = String::from_utf8_lossy(&buf);
        trace!("Received message: {}", payload);
        self.store(LogEntry::new(src.to_string(), payload))
            .await
    }

    async fn store(&self, entry: LogEntry) -> ControlFlow<Option<LogEntry>> {
        let entry = match self.buffer.try_insert(entry) {
            Ok(()) => return ControlFlow::Continue(()),
            Err(entry) => entry,
        };

        debug!("Entry buffer full, waiting for a free slot");
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => ControlFlow::Break(Some(entry)),
            slot = self.buffer.reserve() => {
                slot.insert(entry);
                ControlFlow::Continue(())
            }
        }
    }
}
