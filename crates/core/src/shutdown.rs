//! Run cancellation.
//!
//! A [`ShutdownTrigger`] is held by whoever owns the process lifetime (normally a Ctrl-C task in
//! the binaries); cloned [`Shutdown`] receivers are handed to the pipeline, which checks them
//! before each patient and races them against poll sleeps.

use tokio::sync::watch;

/// Sending half. Dropping it without calling [`ShutdownTrigger::trigger`] does not cancel.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half, cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger(tx), Shutdown(rx))
    }

    /// A signal that never fires, for one-shot commands and tests.
    pub fn never() -> Shutdown {
        let (_tx, rx) = watch::channel(false);
        Shutdown(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// A signal fired by the first Ctrl-C. Must be called inside a tokio runtime.
    pub fn on_ctrl_c() -> Shutdown {
        let (trigger, shutdown) = Shutdown::new();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current step");
                trigger.trigger();
            }
        });
        shutdown
    }

    /// Completes once cancellation has been requested.
    ///
    /// If the trigger is dropped without firing this never completes.
    pub async fn cancelled(&mut self) {
        if self.0.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
