//! Event producer capability for the Clickstream traffic simulator.
//!
//! Workers publish page-view records through the [`EventProducer`] trait and
//! never see the broker directly. Every implementation shares the same
//! accept/drain discipline, provided by [`Outbox`]:
//!
//! - `publish` accepts a record and queues it for the producer's single
//!   delivery task, so records reach the broker in publish order,
//! - `close` stops accepting, then waits until every accepted record has
//!   finished delivery before releasing the transport.
//!
//! Delivery failures that happen after a record was accepted are reported
//! to a [`DeliverySink`] instead of the caller.
//!
//! # Modules
//!
//! - [`producer`] -- [`EventProducer`] and [`ProducerFactory`] traits
//! - [`gate`] -- In-flight accounting and drain-on-close
//! - [`outbox`] -- Ordered hand-off to the delivery task
//! - [`sink`] -- Diagnostic sinks for asynchronous delivery failures
//! - [`nats`] -- NATS-backed producer
//! - [`memory`] -- In-memory producer for tests and dry runs
//! - [`config`] -- Producer connection and buffering settings
//! - [`error`] -- Publish, close and connect errors

pub mod config;
pub mod error;
pub mod gate;
pub mod memory;
pub mod nats;
pub mod outbox;
pub mod producer;
pub mod sink;

pub use config::ProducerConfig;
pub use error::{CloseError, ProducerError, PublishError};
pub use gate::{DeliveryGate, DeliveryPermit};
pub use memory::{MemoryHandle, MemoryProducer, MemoryProducerFactory, PublishedRecord};
pub use nats::{NatsProducer, NatsProducerFactory};
pub use outbox::Outbox;
pub use producer::{EventProducer, ProducerFactory};
pub use sink::{CollectingSink, DeliveryFailure, DeliverySink, TracingSink};
