//! Keep-alive read orchestrator (§4.1): a cursor-liveness watchdog, not a
//! prefetcher. Guarantees a successful underlying read at least once per
//! `interval`, buffering results until the consumer reads them.
//!
//! The background tick runs as its own task so it keeps firing while the
//! consumer is stalled between `next()` calls (§5: "parallelism is
//! limited to the keep-alive orchestrator's timer callback, distinct
//! from the foreground read"). The shared `Inner` is guarded by a
//! `tokio::sync::Mutex` so the tick and a foreground `next()` never touch
//! the underlying stream concurrently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cancel::CancelToken;
use crate::document::{Document, DocumentStream};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Stats returned by `stop()` (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeepAliveStats {
    pub keep_alive_read_count: u64,
    pub max_buffer_length: usize,
}

struct Inner {
    stream: Box<dyn DocumentStream>,
    buffer: VecDeque<Document>,
    stream_start: Instant,
    last_read_at: Instant,
    stats: KeepAliveStats,
    timed_out: bool,
    released: bool,
    timeout: Duration,
}

impl Inner {
    /// One tick of the background watchdog (§4.1 "Tick algorithm").
    async fn tick(&mut self, config: &KeepAliveConfig) {
        if self.timed_out || self.released {
            return;
        }
        let now = Instant::now();
        if now.duration_since(self.stream_start) >= config.timeout {
            self.stream.release();
            self.released = true;
            self.timed_out = true;
            return;
        }
        if now.duration_since(self.last_read_at) >= config.interval {
            // Background read errors never escape the tick; a persistent
            // failure surfaces on the next foreground read instead.
            if let Some(doc) = self.stream.next().await {
                self.buffer.push_back(doc);
                self.last_read_at = Instant::now();
                self.stats.keep_alive_read_count += 1;
                self.stats.max_buffer_length = self.stats.max_buffer_length.max(self.buffer.len());
            }
        }
        // Buffer non-empty but no interval elapsed: watchdog does nothing.
    }
}

pub struct KeepAliveOrchestrator {
    inner: Arc<Mutex<Inner>>,
    ticker: JoinHandle<()>,
}

impl KeepAliveOrchestrator {
    /// `start(iter)`: captures `streamStartTime = now`, `lastReadAt =
    /// now`, arms a timer firing every `interval`.
    pub fn start(stream: Box<dyn DocumentStream>, config: KeepAliveConfig) -> Self {
        let now = Instant::now();
        let inner = Arc::new(Mutex::new(Inner {
            stream,
            buffer: VecDeque::new(),
            stream_start: now,
            last_read_at: now,
            stats: KeepAliveStats::default(),
            timed_out: false,
            released: false,
            timeout: config.timeout,
        }));

        let ticker_inner = inner.clone();
        let ticker_config = config;
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(ticker_config.interval).await;
                let mut guard = ticker_inner.lock().await;
                if guard.released {
                    return;
                }
                guard.tick(&ticker_config).await;
                if guard.timed_out {
                    return;
                }
            }
        });

        KeepAliveOrchestrator { inner, ticker }
    }

    /// Returns the oldest buffered document, a fresh foreground read, or
    /// a fatal non-retryable `KeepAliveTimeout`.
    pub async fn next(&mut self, cancel: &CancelToken) -> Result<Option<Document>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut guard = self.inner.lock().await;

        if guard.timed_out {
            let elapsed_ms = Instant::now().duration_since(guard.stream_start).as_millis() as u64;
            return Err(Error::KeepAliveTimeout {
                elapsed_ms,
                timeout_ms: guard.timeout.as_millis() as u64,
            });
        }

        if let Some(doc) = guard.buffer.pop_front() {
            return Ok(Some(doc));
        }

        let doc = guard.stream.next().await;
        if doc.is_some() {
            guard.last_read_at = Instant::now();
        }
        Ok(doc)
    }

    /// Cancels the timer, releases the underlying stream if it hasn't
    /// already been released by a timeout, and returns the cumulative
    /// stats.
    pub async fn stop(self) -> KeepAliveStats {
        self.ticker.abort();
        let mut guard = self.inner.lock().await;
        if !guard.released {
            guard.stream.release();
            guard.released = true;
        }
        guard.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::VecDocumentStream;
    use bson::{doc, Bson};

    fn sample_docs(n: usize) -> Vec<Document> {
        (0..n).map(|i| Document::new(Bson::Int32(i as i32), doc! {})).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn fast_consumer_never_triggers_background_reads() {
        let stream = VecDocumentStream::new(sample_docs(3));
        let mut orchestrator = KeepAliveOrchestrator::start(
            Box::new(stream),
            KeepAliveConfig {
                interval: Duration::from_secs(1),
                timeout: Duration::from_secs(10),
            },
        );
        let cancel = CancelToken::never();
        for _ in 0..3 {
            assert!(orchestrator.next(&cancel).await.unwrap().is_some());
        }
        let stats = orchestrator.stop().await;
        assert_eq!(stats.keep_alive_read_count, 0);
        assert_eq!(stats.max_buffer_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_fatal_and_nonretryable() {
        let stream = VecDocumentStream::new(sample_docs(20));
        let mut orchestrator = KeepAliveOrchestrator::start(
            Box::new(stream),
            KeepAliveConfig {
                interval: Duration::from_millis(1000),
                timeout: Duration::from_millis(10_000),
            },
        );
        let cancel = CancelToken::never();
        assert!(orchestrator.next(&cancel).await.unwrap().is_some());

        // Stall for 11s, letting the background timer do the reading.
        for _ in 0..11 {
            tokio::time::advance(Duration::from_millis(1000)).await;
            tokio::task::yield_now().await;
        }

        let result = orchestrator.next(&cancel).await;
        assert!(matches!(result, Err(Error::KeepAliveTimeout { .. })));
        let stats = orchestrator.stop().await;
        assert!(stats.keep_alive_read_count >= 9, "got {}", stats.keep_alive_read_count);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_next() {
        let stream = VecDocumentStream::new(sample_docs(1));
        let mut orchestrator = KeepAliveOrchestrator::start(
            Box::new(stream),
            KeepAliveConfig {
                interval: Duration::from_secs(1),
                timeout: Duration::from_secs(10),
            },
        );
        let (handle, cancel) = crate::cancel::cancel_pair();
        handle.cancel();
        let result = orchestrator.next(&cancel).await.unwrap();
        assert!(result.is_none());
        orchestrator.stop().await;
    }
}
