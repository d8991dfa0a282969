// src/shutdown.rs
//! Process-wide stop signal shared by the sweep, the purger and the adapters.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Flips the signal. Dropping it also counts as a shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub fn fire(&self) {
        let _ = self.0.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    // held only by `never()`, so `changed()` stays pending
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownTrigger(tx),
        Shutdown {
            rx,
            _keepalive: None,
        },
    )
}

impl Shutdown {
    /// A signal that never fires, for one-off runs and tests.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires (or its trigger is dropped).
    pub async fn cancelled(&mut self) {
        while !self.is_triggered() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `dur` unless shutdown comes first. Returns `true` on shutdown.
    pub async fn sleep(&mut self, dur: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => self.is_triggered(),
            res = self.rx.changed() => res.is_err() || self.is_triggered(),
        }
    }
}
