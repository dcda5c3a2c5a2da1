//! Request-scoped deadline and cancellation.

use std::future::{Future, pending, poll_fn};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Carries an optional deadline and any number of cancellation signals down
/// to servers, connections and handlers.
///
/// Cloning is cheap. A derived context is cancelled when any of its parents
/// is cancelled and never outlives the earliest deadline in its lineage.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Cancels the context returned alongside it by [`Context::with_cancel`].
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// Never cancelled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(&self) -> (Self, Canceller) {
        let (tx, rx) = watch::channel(false);
        let mut ctx = self.clone();
        ctx.signals.push(rx);
        (ctx, Canceller { tx })
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        ctx
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
            || self.signals.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut signals = self.signals.clone();
        let signalled = async move {
            // Receivers whose canceller is gone can never fire.
            let mut waits: Vec<Option<Pin<Box<dyn Future<Output = bool> + Send + '_>>>> = signals
                .iter_mut()
                .map(|rx| {
                    let wait: Pin<Box<dyn Future<Output = bool> + Send + '_>> =
                        Box::pin(async move { rx.wait_for(|cancelled| *cancelled).await.is_ok() });
                    Some(wait)
                })
                .collect();

            if waits.is_empty() {
                return pending::<()>().await;
            }

            poll_fn(|cx| {
                for slot in waits.iter_mut() {
                    let Some(wait) = slot else { continue };
                    match wait.as_mut().poll(cx) {
                        Poll::Ready(true) => return Poll::Ready(()),
                        Poll::Ready(false) => *slot = None,
                        Poll::Pending => {}
                    }
                }
                Poll::Pending
            })
            .await
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = signalled => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signalled.await,
        }
    }
}
