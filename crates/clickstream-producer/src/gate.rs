//! In-flight accounting and drain-on-close for producers.
//!
//! A [`DeliveryGate`] owns a fair semaphore with one permit per record the
//! producer may have in flight. Publishing takes a permit and queues it with
//! the record (see [`Outbox`](crate::outbox::Outbox)); the permit is released
//! when delivery finishes, whether it succeeded or not.
//!
//! Closing flips the closing flag first, so new publishes fail fast, and
//! then acquires *every* permit. Because the semaphore is FIFO, that
//! acquisition completes only once all earlier accepted records have
//! released theirs. The semaphore is closed afterwards, which fails any
//! publish that slipped past the flag check while the drain was waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{CloseError, PublishError};

/// Proof that a record was accepted. Dropping it marks delivery finished.
#[derive(Debug)]
pub struct DeliveryPermit {
    _permit: OwnedSemaphorePermit,
}

/// Accept/drain discipline shared by every producer implementation.
#[derive(Debug)]
pub struct DeliveryGate {
    /// One permit per record that may be in flight.
    permits: Arc<Semaphore>,
    /// Total permits the semaphore was created with.
    capacity: u32,
    /// Set once `drain` has been called.
    closing: AtomicBool,
}

impl DeliveryGate {
    /// Create a gate allowing up to `capacity` records in flight.
    ///
    /// The capacity is clamped to at least 1 and at most `u32::MAX`.
    pub fn new(capacity: usize) -> Self {
        let capacity = u32::try_from(capacity).unwrap_or(u32::MAX).max(1);
        let permits = usize::try_from(capacity)
            .unwrap_or(Semaphore::MAX_PERMITS)
            .min(Semaphore::MAX_PERMITS);
        let capacity = u32::try_from(permits).unwrap_or(u32::MAX);
        Self {
            permits: Arc::new(Semaphore::new(permits)),
            capacity,
            closing: AtomicBool::new(false),
        }
    }

    /// Maximum number of records in flight at once.
    pub fn capacity(&self) -> usize {
        usize::try_from(self.capacity).unwrap_or(usize::MAX)
    }

    /// Whether `drain` has been called.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Number of accepted records whose delivery has not finished.
    pub fn in_flight(&self) -> usize {
        self.capacity()
            .saturating_sub(self.permits.available_permits())
    }

    /// Accept one record for delivery.
    ///
    /// Waits while the gate is saturated. Fails immediately once the gate
    /// is closing.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Closed`] if the gate is closing or closed.
    pub async fn admit(&self) -> Result<DeliveryPermit, PublishError> {
        if self.is_closing() {
            return Err(PublishError::Closed);
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_closed| PublishError::Closed)?;
        Ok(DeliveryPermit { _permit: permit })
    }

    /// Stop accepting records and wait for every accepted record to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::AlreadyClosed`] on the second and later calls.
    pub async fn drain(&self) -> Result<(), CloseError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(CloseError::AlreadyClosed);
        }

        debug!(in_flight = self.in_flight(), "draining in-flight records");
        // Only `drain` closes the semaphore and the swap above guarantees a
        // single caller, so this acquisition cannot observe a closed gate.
        let all = self.permits.acquire_many(self.capacity).await;
        self.permits.close();
        drop(all);
        Ok(())
    }
}
