// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::flusher::Flusher;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs one flush cycle per interval until cancelled.
pub struct FlushScheduler {
    flusher: Flusher,
    interval: Duration,
    min_batch_size: usize,
    cancel_token: CancellationToken,
}

impl FlushScheduler {
    #[must_use]
    pub fn new(
        flusher: Flusher,
        interval: Duration,
        min_batch_size: usize,
        cancel_token: CancellationToken,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!("flush interval is 0, using 1ms");
            Duration::from_millis(1)
        } else {
            interval
        };
        FlushScheduler {
            flusher,
            interval,
            min_batch_size,
            cancel_token,
        }
    }

    /// The first flush happens one interval after this is called. A flush that is already
    /// running when the token fires is finished before returning.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("Flushing log entries");
                    self.flusher.flush(self.min_batch_size).await;
                }
            }
        }
        debug!("Flush scheduler stopped");
    }
}
