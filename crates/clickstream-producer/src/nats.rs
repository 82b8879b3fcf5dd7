//! NATS-backed event producer.
//!
//! Each [`NatsProducer`] owns its own NATS connection. The topic is used as
//! the subject and the record key travels in the `Clickstream-Key` header.
//!
//! The initial connection is retried with exponential backoff; this is the
//! only place reconnection is attempted explicitly. Publishing queues the
//! payload on the producer's [`Outbox`], whose single delivery task hands
//! records to the client in publish order. The tick loop never waits on the
//! socket, only on the outbox when the buffer is saturated.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;
use crate::error::{CloseError, ProducerError, PublishError};
use crate::outbox::Outbox;
use crate::producer::{EventProducer, ProducerFactory};
use crate::sink::{DeliveryFailure, DeliverySink, TracingSink};

/// Header carrying the record key.
pub const KEY_HEADER: &str = "Clickstream-Key";

/// One serialized record waiting for the delivery task.
struct NatsMessage {
    subject: String,
    key: String,
    payload: Vec<u8>,
}

/// Event producer publishing to a NATS server.
pub struct NatsProducer {
    /// Connection name, used in logs.
    name: String,
    /// The NATS client connection.
    client: async_nats::Client,
    /// Ordered queue feeding the delivery task.
    outbox: Outbox<NatsMessage>,
    /// Receiver for background delivery failures.
    sink: Arc<dyn DeliverySink>,
}

impl NatsProducer {
    /// Connect to the configured brokers.
    ///
    /// Retries up to `connect_attempts` times, sleeping
    /// `connect_backoff_ms` before the first retry and doubling the delay
    /// after each one.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError::NoBrokers`] if the broker list is empty, or
    /// [`ProducerError::Connect`] once every attempt has failed.
    pub async fn connect(
        config: &ProducerConfig,
        name: &str,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self, ProducerError> {
        let servers = config
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        if servers.is_empty() {
            return Err(ProducerError::NoBrokers);
        }

        let attempts = config.connect_attempts.max(1);
        let mut backoff = Duration::from_millis(config.connect_backoff_ms);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            info!(servers = servers, name = name, attempt = attempt, "connecting to NATS");

            let result = async_nats::ConnectOptions::new()
                .name(name)
                .client_capacity(config.client_capacity.max(1))
                .connect(servers.as_str())
                .await;

            match result {
                Ok(client) => {
                    info!(name = name, "NATS connection established");
                    let outbox = Self::spawn_outbox(
                        config.max_buffered_records,
                        client.clone(),
                        Arc::clone(&sink),
                    );
                    return Ok(Self {
                        name: name.to_owned(),
                        client,
                        outbox,
                        sink,
                    });
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        servers = servers,
                        attempt = attempt,
                        retry_in_ms = backoff.as_millis(),
                        error = %e,
                        "NATS connection failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    return Err(ProducerError::Connect {
                        servers,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Start the delivery task that hands queued messages to `client`.
    fn spawn_outbox(
        capacity: usize,
        client: async_nats::Client,
        sink: Arc<dyn DeliverySink>,
    ) -> Outbox<NatsMessage> {
        Outbox::spawn(capacity, move |message: NatsMessage| {
            let client = client.clone();
            let sink = Arc::clone(&sink);
            async move {
                let NatsMessage {
                    subject,
                    key,
                    payload,
                } = message;
                let mut headers = async_nats::HeaderMap::new();
                headers.insert(KEY_HEADER, key.as_str());
                if let Err(e) = client
                    .publish_with_headers(subject.clone(), headers, payload.into())
                    .await
                {
                    sink.delivery_failed(DeliveryFailure {
                        topic: subject,
                        key,
                        message: e.to_string(),
                    });
                }
            }
        })
    }

    /// The connection name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for NatsProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsProducer")
            .field("name", &self.name)
            .field("outbox", &self.outbox)
            .finish_non_exhaustive()
    }
}

impl EventProducer for NatsProducer {
    fn publish<T>(
        &self,
        topic: &str,
        key: &str,
        record: &T,
    ) -> impl Future<Output = Result<(), PublishError>> + Send
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(record).map_err(PublishError::from);
        let subject = topic.to_owned();
        let key = key.to_owned();

        async move {
            let payload = payload?;
            self.outbox
                .enqueue(NatsMessage {
                    subject,
                    key,
                    payload,
                })
                .await
        }
    }

    async fn close(&self) -> Result<(), CloseError> {
        self.outbox.drain().await?;
        debug!(name = self.name, "in-flight records drained, flushing");

        // Records handed to the client are buffered until the connection
        // writes them; flush pushes them out before the connection goes away.
        if let Err(e) = self.client.flush().await {
            self.sink.delivery_failed(DeliveryFailure {
                topic: String::from("*"),
                key: String::new(),
                message: format!("flush on close failed: {e}"),
            });
        }
        info!(name = self.name, "NATS producer closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.outbox.is_closing()
    }

    fn in_flight(&self) -> usize {
        self.outbox.in_flight()
    }
}

/// Creates one [`NatsProducer`] (and one connection) per worker.
#[derive(Debug, Clone)]
pub struct NatsProducerFactory {
    config: ProducerConfig,
}

impl NatsProducerFactory {
    /// Create a factory connecting with `config`.
    pub const fn new(config: ProducerConfig) -> Self {
        Self { config }
    }
}

impl ProducerFactory for NatsProducerFactory {
    type Producer = NatsProducer;

    async fn create(&self, worker_id: &str) -> Result<NatsProducer, ProducerError> {
        let name = format!("clickstream-{worker_id}");
        let sink: Arc<dyn DeliverySink> = Arc::new(TracingSink::new(worker_id));
        NatsProducer::connect(&self.config, &name, sink).await
    }
}
