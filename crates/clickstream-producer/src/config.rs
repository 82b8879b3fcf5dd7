//! Producer connection and buffering settings.
//!
//! Mirrors the `producer` section of `clickstream-config.yaml`.

use serde::Deserialize;

/// Settings shared by every producer a process creates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProducerConfig {
    /// Broker addresses (e.g. `nats://localhost:4222`).
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,

    /// Topic (NATS subject) that page-view events are published to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Maximum number of accepted-but-undelivered records per producer.
    /// Publishing blocks once this many are in flight.
    #[serde(default = "default_max_buffered_records")]
    pub max_buffered_records: usize,

    /// Capacity of the NATS client's internal command channel.
    #[serde(default = "default_client_capacity")]
    pub client_capacity: usize,

    /// Attempts made for the initial broker connection.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Delay before the first reconnect attempt; doubles on each retry.
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            max_buffered_records: default_max_buffered_records(),
            client_capacity: default_client_capacity(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff_ms(),
        }
    }
}

fn default_brokers() -> Vec<String> {
    vec![String::from("nats://localhost:4222")]
}

fn default_topic() -> String {
    String::from("events")
}

const fn default_max_buffered_records() -> usize {
    10_000_000
}

const fn default_client_capacity() -> usize {
    65_536
}

const fn default_connect_attempts() -> u32 {
    5
}

const fn default_connect_backoff_ms() -> u64 {
    500
}
