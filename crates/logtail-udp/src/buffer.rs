// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO buffer shared by the listener and the flushers.
//!
//! Slots are handed out by a bounded tokio channel, so a producer waits while the buffer is
//! full instead of dropping entries. Drains take the receiving side under a mutex, which keeps
//! two drains from ever splitting or duplicating entries.

use crate::constants::MAX_BATCH_SIZE;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// One received datagram: the sender address and the decoded text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    source: String,
    payload: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(source: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// A free slot in the buffer, reserved for exactly one entry.
///
/// Dropping the slot without inserting releases it.
pub struct Slot<'a> {
    permit: mpsc::Permit<'a, LogEntry>,
}

impl Slot<'_> {
    pub fn insert(self, entry: LogEntry) {
        self.permit.send(entry);
    }
}

pub struct EntryBuffer {
    tx: mpsc::Sender<LogEntry>,
    rx: Mutex<mpsc::Receiver<LogEntry>>,
}

impl EntryBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("entry buffer capacity is 0, using 1");
            1
        } else if capacity > MAX_BATCH_SIZE {
            warn!("entry buffer capacity {capacity} is too large, using {MAX_BATCH_SIZE}");
            MAX_BATCH_SIZE
        } else {
            capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Waits for a free slot.
    pub async fn reserve(&self) -> Slot<'_> {
        // The receiver lives as long as the buffer, so the channel cannot be closed here.
        #[allow(clippy::expect_used)]
        let permit = self
            .tx
            .reserve()
            .await
            .expect("entry buffer receiver dropped");
        Slot { permit }
    }

    /// Inserts an entry, waiting while the buffer is full.
    pub async fn insert(&self, entry: LogEntry) {
        self.reserve().await.insert(entry);
    }

    /// Inserts an entry if a slot is free right now, otherwise hands it back.
    pub fn try_insert(&self, entry: LogEntry) -> Result<(), LogEntry> {
        self.tx.try_send(entry).map_err(|e| match e {
            mpsc::error::TrySendError::Full(entry) | mpsc::error::TrySendError::Closed(entry) => {
                entry
            }
        })
    }

    /// Removes and returns every entry currently in the buffer, oldest first.
    ///
    /// Never waits: an empty buffer yields an empty batch. A single drain returns at most
    /// `capacity` entries, so a producer refilling the buffer cannot keep it draining forever.
    #[must_use]
    pub fn drain_available(&self) -> Vec<LogEntry> {
        #[allow(clippy::expect_used)]
        let mut rx = self.rx.lock().expect("lock poisoned");

        let max = self.capacity();
        let mut batch = Vec::with_capacity(self.len());
        while batch.len() < max {
            match rx.try_recv() {
                Ok(entry) => batch.push(entry),
                Err(_) => break,
            }
        }
        batch
    }

    /// Number of occupied slots, including slots reserved by a pending insert.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
