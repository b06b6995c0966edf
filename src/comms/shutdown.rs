//! Shared cancellation signal.
//!
//! One `ShutdownTrigger` fans out to any number of cloned `Shutdown`
//! handles. Every worker selects on `Shutdown::cancelled()` at each of its
//! suspension points. Dropping the trigger counts as cancellation: nobody is
//! left who could stop the workers otherwise.

use std::time::Duration;

use tokio::sync::watch;

/// Owner side: fires the signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Worker side: cheap to clone, observed at suspension points.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even without receivers.
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown { rx: self.tx.subscribe() }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal has fired (or the trigger is gone).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// A handle that additionally fires after `deadline`.
    ///
    /// The returned trigger is owned by the spawned timer task; it also fires
    /// early when `self` does.
    pub fn with_deadline(&self, deadline: Duration) -> Shutdown {
        let (trigger, derived) = channel();
        let parent = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    log::info!("run deadline of {} reached", humantime::format_duration(deadline));
                }
            }
            trigger.trigger();
        });
        derived
    }
}
