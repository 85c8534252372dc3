//! Cooperative cancellation and per-call deadlines for upstream requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{ReconcileError, ReconcileResult};

/// Cloneable cancellation flag. Every clone observes the same cancel.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone: nobody can cancel any more.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Run one upstream call under a deadline, aborting early on cancel.
/// Every failure mode maps to `UpstreamUnavailable`.
pub async fn guarded<T, F>(
    collaborator: &'static str,
    deadline: Duration,
    cancel: &CancelToken,
    fut: F,
) -> ReconcileResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(ReconcileError::upstream(collaborator, "cancelled"));
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::upstream(collaborator, "cancelled")),
        res = tokio::time::timeout(deadline, fut) => match res {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(ReconcileError::upstream(collaborator, format!("{e:#}"))),
            Err(_) => Err(ReconcileError::upstream(
                collaborator,
                format!("timed out after {}ms", deadline.as_millis()),
            )),
        },
    }
}
