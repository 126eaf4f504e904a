// ABOUTME: Batch-wide cancellation signal and the process signal listener.
// ABOUTME: One trigger per batch; every session holds a clone of the receiving side.

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Fires the batch's shutdown signal. Held by the signal listener.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent; every live `ShutdownSignal` observes it.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// The receiving side of the batch's cancellation signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested. If the trigger is dropped
    /// without firing, cancellation can no longer happen and this pends
    /// forever, letting the racing work run to completion.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// A fresh trigger/signal pair for one batch.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Spawn the listener that fires `trigger` on the first catchable
/// termination signal (SIGINT, SIGTERM, or SIGQUIT).
pub fn listen_for_termination(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        let streams = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::quit()),
        );
        let (mut interrupt, mut terminate, mut quit) = match streams {
            (Ok(i), Ok(t), Ok(q)) => (i, t, q),
            _ => {
                tracing::warn!("unable to install signal handlers; interrupt support disabled");
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
            _ = quit.recv() => {}
        }
        tracing::info!("termination signal received, closing sessions");
        trigger.trigger();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_every_clone() {
        let (trigger, signal) = channel();
        let mut first = signal.clone();
        let mut second = signal;

        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), first.triggered())
            .await
            .expect("first clone should observe the trigger");
        tokio::time::timeout(Duration::from_secs(1), second.triggered())
            .await
            .expect("second clone should observe the trigger");
    }

    #[tokio::test]
    async fn trigger_observed_even_if_fired_before_waiting() {
        let (trigger, mut signal) = channel();
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("late waiter should still resolve");
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn dropped_trigger_never_resolves() {
        let (trigger, mut signal) = channel();
        drop(trigger);

        let waited = tokio::time::timeout(Duration::from_millis(50), signal.triggered()).await;
        assert!(waited.is_err(), "dropped trigger must not look like shutdown");
        assert!(!signal.is_triggered());
    }
}
