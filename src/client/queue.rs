//! Outbound operations buffered while the connection is down.

use std::{collections::VecDeque, time::Duration};

use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

/// How long a buffered operation stays eligible for replay.
pub const OPERATION_TTL: Duration = Duration::from_secs(5 * 60);

/// An operation waiting for a live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    /// Event name sent on the wire.
    pub name: String,
    /// Event payload.
    pub payload: Value,
    /// When the caller issued the operation.
    pub enqueued_at: Instant,
    /// Failed transmissions so far.
    pub retry_count: u32,
    /// Failed transmissions tolerated before the operation is dropped.
    pub max_retries: u32,
}

impl QueuedOperation {
    /// Wrap a fresh operation stamped with the current instant.
    pub fn new(name: impl Into<String>, payload: Value, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            payload,
            enqueued_at: Instant::now(),
            retry_count: 0,
            max_retries,
        }
    }

    /// Whether the operation is older than `ttl` at `now`.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.enqueued_at) > ttl
    }

    /// Count a failed transmission. Returns false once the retry budget is spent.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count <= self.max_retries
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations handed to the transport.
    pub sent: usize,
    /// Operations dropped because they were too old.
    pub expired: usize,
    /// Operations put back after a failed transmission.
    pub requeued: usize,
    /// Operations dropped after exhausting their retries.
    pub exhausted: usize,
}

/// FIFO of [`QueuedOperation`]s with age-based expiry.
#[derive(Debug)]
pub struct OperationQueue {
    entries: VecDeque<QueuedOperation>,
    ttl: Duration,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::with_ttl(OPERATION_TTL)
    }
}

impl OperationQueue {
    /// Empty queue whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            ttl,
        }
    }

    ///
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an operation behind everything already queued.
    pub fn push(&mut self, operation: QueuedOperation) {
        self.entries.push_back(operation);
    }

    /// Put operations back at the head of the queue, keeping their relative order.
    pub fn push_front_all(&mut self, operations: Vec<QueuedOperation>) {
        for operation in operations.into_iter().rev() {
            self.entries.push_front(operation);
        }
    }

    /// Drain a fixed snapshot of the queue through `transmit`.
    ///
    /// Operations pushed while draining (including failed ones put back) land in a
    /// fresh queue and are left for the next drain. `transmit` hands the operation
    /// back on failure.
    pub fn drain_with<F>(&mut self, mut transmit: F) -> DrainReport
    where
        F: FnMut(QueuedOperation) -> Result<(), QueuedOperation>,
    {
        let batch = std::mem::take(&mut self.entries);
        let now = Instant::now();
        let mut report = DrainReport::default();

        for operation in batch {
            if operation.is_expired(now, self.ttl) {
                warn!(
                    event = %operation.name,
                    age_ms = now.saturating_duration_since(operation.enqueued_at).as_millis() as u64,
                    "dropping expired queued operation"
                );
                report.expired += 1;
                continue;
            }

            match transmit(operation) {
                Ok(()) => report.sent += 1,
                Err(mut failed) => {
                    if failed.record_failure() {
                        self.entries.push_back(failed);
                        report.requeued += 1;
                    } else {
                        warn!(
                            event = %failed.name,
                            retries = failed.retry_count,
                            "dropping queued operation after exhausting retries"
                        );
                        report.exhausted += 1;
                    }
                }
            }
        }

        report
    }
}
