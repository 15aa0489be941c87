//! A single cancel hook, propagated by reference into every component
//! that has an await boundary (§5).
//!
//! Built on `tokio::sync::watch` rather than `tokio-util`'s
//! `CancellationToken`: the rest of the pack reaches for `tokio::sync`
//! primitives directly for shutdown signaling (see
//! `surrealdb-surrealdb`'s core), and a `watch` channel gives us both
//! "is cancelled" polling and an awaitable edge for free.

use tokio::sync::watch;

/// The sending half; owned by whoever drives an operation (a task in the
/// supervisor, or a test harness).
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// The read-only half, threaded into the keep-alive orchestrator, retry
/// orchestrator, and streaming writer.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled. Used inside `select!` to
    /// make a sleep gracefully resolve instead of throwing (§4.3).
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        // A send error means the handle was dropped without ever
        // cancelling; treat that the same as "never cancelled" and hang
        // here, since callers always race this against another future.
        let _ = self.rx.changed().await;
    }

    /// A token that reports never-cancelled; useful for tests and for
    /// callers that don't need cancellation.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelToken { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_observed() {
        let (handle, mut token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn never_token_reports_not_cancelled() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }
}
