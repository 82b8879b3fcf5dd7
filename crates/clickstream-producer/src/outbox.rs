//! Ordered hand-off from `publish` to a single delivery task.
//!
//! An [`Outbox`] pairs a [`DeliveryGate`] with a bounded channel drained by
//! one spawned task. Records reach the transport in the order `enqueue`
//! accepted them, whatever runtime flavor is driving the producer. Each
//! record carries its gate permit through the channel, and the permit is
//! released only after the transport has finished with that record, so
//! [`Outbox::drain`] still waits for every accepted delivery.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CloseError, PublishError};
use crate::gate::{DeliveryGate, DeliveryPermit};

struct Queued<M> {
    message: M,
    permit: DeliveryPermit,
}

/// FIFO delivery queue with accept/drain accounting.
pub struct Outbox<M> {
    gate: DeliveryGate,
    tx: mpsc::Sender<Queued<M>>,
}

impl<M: Send + 'static> Outbox<M> {
    /// Create an outbox holding up to `capacity` undelivered records and
    /// spawn its delivery task onto the current Tokio runtime.
    ///
    /// `deliver` is awaited once per record, one record at a time. The task
    /// ends when the outbox is dropped.
    pub fn spawn<F, Fut>(capacity: usize, mut deliver: F) -> Self
    where
        F: FnMut(M) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let gate = DeliveryGate::new(capacity);
        // Every queued record holds a permit, so the channel never fills
        // before the gate does.
        let (tx, mut rx) = mpsc::channel::<Queued<M>>(gate.capacity());

        tokio::spawn(async move {
            while let Some(Queued { message, permit }) = rx.recv().await {
                deliver(message).await;
                drop(permit);
            }
            debug!("delivery task finished");
        });

        Self { gate, tx }
    }

    /// Accept `message` for delivery after everything accepted before it.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Closed`] once [`drain`](Self::drain) has been
    /// called.
    pub async fn enqueue(&self, message: M) -> Result<(), PublishError> {
        let permit = self.gate.admit().await?;
        self.tx
            .send(Queued { message, permit })
            .await
            .map_err(|_dropped| PublishError::Closed)
    }

    /// Stop accepting and wait until every accepted record was delivered.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::AlreadyClosed`] on the second and later calls.
    pub async fn drain(&self) -> Result<(), CloseError> {
        self.gate.drain().await
    }

    /// Whether [`drain`](Self::drain) has been called.
    pub fn is_closing(&self) -> bool {
        self.gate.is_closing()
    }

    /// Accepted records not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }
}

impl<M> std::fmt::Debug for Outbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
