//! Cooperative stop signal shared by every worker.
//!
//! A single [`StopHandle`] broadcasts to any number of [`StopSignal`]s.
//! Stopping is idempotent and never blocks. Workers check the signal at
//! tick boundaries and may also await it while sleeping between ticks.
//!
//! Dropping every handle counts as a stop, so workers never outlive the
//! supervisor that started them.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected handle/signal pair.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Sender side of the stop signal.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Signal every subscriber to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new receiver of this signal.
    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver side of the stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Whether a stop has been signalled (or every handle was dropped).
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until a stop is signalled. Returns immediately if it already
    /// was.
    pub async fn stopped(&mut self) {
        // An error means every handle is gone, which is also a stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
