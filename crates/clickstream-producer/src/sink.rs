//! Diagnostic sinks for asynchronous delivery failures.
//!
//! By the time a delivery fails in the background, the `publish` call that
//! accepted the record has long returned and the tick that produced it has
//! moved on. Such failures are therefore posted to a [`DeliverySink`]
//! rather than propagated.

use std::sync::{Mutex, PoisonError};

use tracing::warn;

/// A delivery that failed after its record was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Topic the record was published to.
    pub topic: String,
    /// Key the record was published with.
    pub key: String,
    /// Description of the transport failure.
    pub message: String,
}

/// Receiver for asynchronous delivery failures.
pub trait DeliverySink: Send + Sync {
    /// Called once per failed delivery, from the delivery task.
    fn delivery_failed(&self, failure: DeliveryFailure);
}

/// Logs delivery failures at `warn` level.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    /// Identifies the producer in log lines.
    pub producer: String,
}

impl TracingSink {
    /// Create a sink that tags its log lines with `producer`.
    pub fn new(producer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
        }
    }
}

impl DeliverySink for TracingSink {
    fn delivery_failed(&self, failure: DeliveryFailure) {
        warn!(
            producer = self.producer,
            topic = failure.topic,
            key = failure.key,
            error = failure.message,
            "event delivery failed"
        );
    }
}

/// Keeps every reported failure in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    failures: Mutex<Vec<DeliveryFailure>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the failures reported so far.
    pub fn failures(&self) -> Vec<DeliveryFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeliverySink for CollectingSink {
    fn delivery_failed(&self, failure: DeliveryFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }
}
