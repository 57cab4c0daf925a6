//! Cooperative shutdown signalling.
//!
//! A [`ShutdownTrigger`] flips a watch channel exactly once; every clone of the
//! matching [`Shutdown`] token observes it. Loops check
//! [`Shutdown::is_requested`] at the top of each iteration and wait with
//! [`Shutdown::sleep`], which returns early as soon as shutdown is requested.
//! Nothing is cancelled mid-flight: an in-progress request or transaction runs
//! to completion before the next check.

use std::time::Duration;

use tokio::sync::watch;

/// Create a connected trigger/token pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// The sending half. Held by whoever handles process signals.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Create another token observing this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cloneable shutdown token passed into every loop and sleep.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// True once shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when shutdown is requested.
    ///
    /// If the trigger is dropped without firing, this never resolves.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` when the full duration elapsed, `false` when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.requested() => false,
        }
    }
}
