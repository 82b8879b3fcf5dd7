//! Error types for event producers.
//!
//! Only structural failures surface here. A record that was accepted and
//! later failed in transit is reported to a
//! [`DeliverySink`](crate::sink::DeliverySink) instead.

/// A publish call was rejected synchronously.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The producer is closing or closed and accepts no new records.
    #[error("producer is closed")]
    Closed,

    /// The record could not be serialized to JSON.
    #[error("failed to serialize record: {source}")]
    Serialize {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// A close call was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CloseError {
    /// `close` was already called on this producer.
    #[error("producer already closed")]
    AlreadyClosed,
}

/// A producer could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// No broker addresses were configured.
    #[error("no broker addresses configured")]
    NoBrokers,

    /// Connecting to the brokers failed after every retry.
    #[error("failed to connect to {servers} after {attempts} attempt(s): {message}")]
    Connect {
        /// The comma-joined broker list.
        servers: String,
        /// Number of connection attempts made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },
}
