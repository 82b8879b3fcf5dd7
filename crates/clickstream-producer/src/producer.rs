//! Producer and factory traits.
//!
//! The simulation engine depends only on these traits. The concrete broker
//! client is chosen by the binary; tests use
//! [`MemoryProducer`](crate::memory::MemoryProducer).

use std::future::Future;

use serde::Serialize;

use crate::error::{CloseError, ProducerError, PublishError};

/// Publishes keyed JSON records to named topics.
///
/// Implementations must uphold the accept/drain contract:
///
/// - once [`close`] has been called, [`publish`] fails with
///   [`PublishError::Closed`] without blocking,
/// - [`close`] returns only after every record accepted before it was
///   called has finished delivery,
/// - delivery failures after acceptance go to a diagnostic sink, never to
///   the caller.
///
/// [`publish`] may wait when the producer's buffer is saturated. That wait
/// is the backpressure mechanism, not an error.
///
/// [`close`]: EventProducer::close
/// [`publish`]: EventProducer::publish
pub trait EventProducer: Send + Sync {
    /// Accept `record` for delivery to `topic` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Closed`] if the producer is closing, or
    /// [`PublishError::Serialize`] if the record cannot be encoded.
    fn publish<T>(
        &self,
        topic: &str,
        key: &str,
        record: &T,
    ) -> impl Future<Output = Result<(), PublishError>> + Send
    where
        T: Serialize + ?Sized;

    /// Stop accepting records, wait for in-flight deliveries, and release
    /// the transport.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::AlreadyClosed`] if called more than once.
    fn close(&self) -> impl Future<Output = Result<(), CloseError>> + Send;

    /// Whether [`close`](EventProducer::close) has been called.
    fn is_closed(&self) -> bool;

    /// Number of accepted records whose delivery has not finished.
    fn in_flight(&self) -> usize;
}

/// Creates one producer per worker.
pub trait ProducerFactory: Send + Sync {
    /// The producer type handed to workers.
    type Producer: EventProducer + 'static;

    /// Create the producer for the worker named `worker_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError`] if the producer cannot be constructed.
    fn create(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Self::Producer, ProducerError>> + Send;
}
