//! In-memory producer for tests and dry runs.
//!
//! [`MemoryProducer`] follows the same accept/drain discipline as the NATS
//! producer, but "delivers" records by appending them to a shared log, in
//! publish order. An optional delivery delay models transport latency and
//! keeps records in flight long enough to observe draining; a failing topic
//! exercises the delivery sink.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CloseError, ProducerError, PublishError};
use crate::outbox::Outbox;
use crate::producer::{EventProducer, ProducerFactory};
use crate::sink::{DeliveryFailure, DeliverySink, TracingSink};

/// A record that completed delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    /// Topic the record was published to.
    pub topic: String,
    /// Key the record was published with.
    pub key: String,
    /// The record as JSON.
    pub payload: serde_json::Value,
}

/// Shared view of a [`MemoryProducer`]'s delivered records and state.
///
/// Remains usable after the producer itself has been moved into a worker
/// and dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    records: Arc<Mutex<Vec<PublishedRecord>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryHandle {
    /// Snapshot of every delivered record, in delivery order.
    pub fn records(&self) -> Vec<PublishedRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of delivered records.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the producer finished closing.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn push(&self, record: PublishedRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

/// One accepted record on its way to the log.
struct Pending {
    record: PublishedRecord,
    due: Instant,
    fails: bool,
    sink: Arc<dyn DeliverySink>,
}

/// Producer that appends delivered records to a [`MemoryHandle`].
pub struct MemoryProducer {
    outbox: Outbox<Pending>,
    handle: MemoryHandle,
    delivery_delay: Duration,
    failing_topic: Option<String>,
    sink: Arc<dyn DeliverySink>,
}

impl MemoryProducer {
    /// Create a producer that delivers immediately and buffers up to
    /// `max_buffered_records` in-flight records.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(max_buffered_records: usize) -> Self {
        let handle = MemoryHandle::default();
        let log = handle.clone();
        let outbox = Outbox::spawn(max_buffered_records, move |pending: Pending| {
            let log = log.clone();
            async move {
                tokio::time::sleep_until(pending.due).await;
                if pending.fails {
                    pending.sink.delivery_failed(DeliveryFailure {
                        topic: pending.record.topic,
                        key: pending.record.key,
                        message: String::from("simulated delivery failure"),
                    });
                } else {
                    log.push(pending.record);
                }
            }
        });
        Self {
            outbox,
            handle,
            delivery_delay: Duration::ZERO,
            failing_topic: None,
            sink: Arc::new(TracingSink::new("memory")),
        }
    }

    /// Deliver each record `delay` after it was accepted.
    #[must_use]
    pub const fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// Fail every delivery to `topic`, reporting it to the sink.
    #[must_use]
    pub fn with_failing_topic(mut self, topic: impl Into<String>) -> Self {
        self.failing_topic = Some(topic.into());
        self
    }

    /// Report delivery failures to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Handle onto this producer's delivered records.
    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

impl std::fmt::Debug for MemoryProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProducer")
            .field("outbox", &self.outbox)
            .field("delivered", &self.handle.len())
            .field("delivery_delay", &self.delivery_delay)
            .finish_non_exhaustive()
    }
}

impl EventProducer for MemoryProducer {
    fn publish<T>(
        &self,
        topic: &str,
        key: &str,
        record: &T,
    ) -> impl Future<Output = Result<(), PublishError>> + Send
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(record).map_err(PublishError::from);
        let topic = topic.to_owned();
        let key = key.to_owned();

        async move {
            let payload = payload?;
            let accepted = Instant::now();
            let fails = self.failing_topic.as_deref() == Some(topic.as_str());
            self.outbox
                .enqueue(Pending {
                    record: PublishedRecord {
                        topic,
                        key,
                        payload,
                    },
                    due: accepted.checked_add(self.delivery_delay).unwrap_or(accepted),
                    fails,
                    sink: Arc::clone(&self.sink),
                })
                .await
        }
    }

    async fn close(&self) -> Result<(), CloseError> {
        self.outbox.drain().await?;
        self.handle.closed.store(true, Ordering::Release);
        debug!(delivered = self.handle.len(), "memory producer closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.outbox.is_closing()
    }

    fn in_flight(&self) -> usize {
        self.outbox.in_flight()
    }
}

/// Factory producing [`MemoryProducer`]s and remembering their handles.
#[derive(Debug, Default)]
pub struct MemoryProducerFactory {
    max_buffered_records: usize,
    delivery_delay: Duration,
    handles: Mutex<Vec<(String, MemoryHandle)>>,
}

impl MemoryProducerFactory {
    /// Create a factory whose producers buffer up to
    /// `max_buffered_records` records.
    pub fn new(max_buffered_records: usize) -> Self {
        Self {
            max_buffered_records,
            delivery_delay: Duration::ZERO,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Delay every delivery of every producer by `delay`.
    #[must_use]
    pub const fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// Handles of every producer created so far, keyed by worker ID.
    pub fn handles(&self) -> Vec<(String, MemoryHandle)> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProducerFactory for MemoryProducerFactory {
    type Producer = MemoryProducer;

    async fn create(&self, worker_id: &str) -> Result<MemoryProducer, ProducerError> {
        let producer = MemoryProducer::new(self.max_buffered_records)
            .with_delivery_delay(self.delivery_delay)
            .with_sink(Arc::new(TracingSink::new(worker_id)));
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((worker_id.to_owned(), producer.handle()));
        Ok(producer)
    }
}
