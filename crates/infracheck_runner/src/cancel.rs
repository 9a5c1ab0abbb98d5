//! Cooperative cancellation for long-running commands.
//!
//! Dropping a running command kills it outright. Engines like terraform need
//! to be asked to stop instead, so that they can record what they already
//! created. A [`CancelSignal`] travels with the command; the owner of the
//! matching [`CancelTrigger`] fires it.

use tokio::sync::watch;

/// Fires a [`CancelSignal`]. Cancelling more than once is harmless.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observed by commands that should stop gracefully when asked.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A connected trigger and signal.
    pub fn pair() -> (CancelTrigger, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled. Pends forever if the trigger is gone without firing.
    pub async fn cancelled(&mut self) {
        let closed = self.rx.wait_for(|c| *c).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}
