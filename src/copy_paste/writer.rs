//! The streaming writer (§4.4) — the core of Core A.
//!
//! Consumes a `DocumentStream`, buffers to a flush threshold, calls
//! `writeBatch` per driver, integrates the batch-size adapter and the
//! retry orchestrator, aggregates statistics, reports progress on every
//! processed sub-batch (including partial progress recovered mid-
//! throttle), and produces a typed `WriteStats` result.
//!
//! Holds no persistent state across operations: the buffer, the stats,
//! the adapter, and the retry state are all local to `run`.

use std::collections::VecDeque;

use tracing::{debug, instrument, warn};

use crate::cancel::CancelToken;
use crate::document::{Document, DocumentStream};
use crate::error::{DriverError, Error, ErrorKind, Result as CrateResult, WriterError};

use super::batch_adapter::{BatchSizeAdapter, MEMORY_LIMIT_MB};
use super::driver::DriverAdapter;
use super::retry::{is_retryable, sleep_cancellable, RetryConfig};
use super::strategy::{BatchResult, ConflictStrategy, WriteStats};

const BYTES_PER_MB: usize = 1024 * 1024;

/// Running state for a single write operation. Never reused across
/// operations (§4.4).
pub struct StreamingWriter<'a> {
    adapter: &'a dyn DriverAdapter,
    strategy: ConflictStrategy,
    retry_config: RetryConfig,
}

/// Terminal state of a write operation (§4.4's per-operation state
/// machine: Running -> (Completed | Cancelled | Failed)). `Failed` is
/// represented by the `Err(WriterError)` arm of the outer `Result`
/// rather than folded into this enum, so a fatal error can't be mistaken
/// for a successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterOutcome {
    Completed(WriteStats),
    Cancelled(WriteStats),
}

impl WriterOutcome {
    pub fn stats(&self) -> WriteStats {
        match self {
            WriterOutcome::Completed(s) | WriterOutcome::Cancelled(s) => *s,
        }
    }
}

/// Outcome of draining one sub-batch through `write_batch_with_retry`.
enum SubBatchOutcome {
    Written(BatchResult),
    /// Every document in the sub-batch was already accounted for by a
    /// partial-progress report mid-retry; nothing further to write.
    AbsorbedByPartialProgress,
    Cancelled,
}

impl<'a> StreamingWriter<'a> {
    pub fn new(adapter: &'a dyn DriverAdapter, strategy: ConflictStrategy) -> Self {
        StreamingWriter {
            adapter,
            strategy,
            retry_config: RetryConfig::batch_writer(),
        }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Runs the whole operation: reads `stream` to exhaustion (or
    /// cancellation), flushing buffered documents through the driver
    /// adapter, and returns the final `WriteStats`.
    #[instrument(skip_all, fields(strategy = ?self.strategy))]
    pub async fn run(
        &self,
        mut stream: Box<dyn DocumentStream>,
        mut cancel: CancelToken,
        mut on_progress: impl FnMut(u64, &str),
    ) -> std::result::Result<WriterOutcome, WriterError> {
        let mut adapter_state = BatchSizeAdapter::new();
        let mut stats = WriteStats::default();
        let mut buffer: Vec<Document> = Vec::new();
        let mut buffer_bytes: usize = 0;
        let memory_limit_bytes = MEMORY_LIMIT_MB as usize * BYTES_PER_MB;

        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match stream.next().await {
                Some(doc) => {
                    buffer_bytes += doc.estimated_byte_len();
                    buffer.push(doc);

                    let threshold_hit = buffer.len() as u32 >= adapter_state.current_batch_size()
                        || buffer_bytes >= memory_limit_bytes;
                    if threshold_hit {
                        match self
                            .flush(
                                &mut buffer,
                                &mut buffer_bytes,
                                &mut adapter_state,
                                &mut stats,
                                &mut cancel,
                                &mut on_progress,
                            )
                            .await
                        {
                            Ok(true) => {}
                            Ok(false) => {
                                cancelled = true;
                                break;
                            }
                            Err(source) => {
                                stream.release();
                                return Err(WriterError::new(stats, source));
                            }
                        }
                    }
                }
                None => break,
            }
        }

        if !cancelled && !buffer.is_empty() {
            match self
                .flush(
                    &mut buffer,
                    &mut buffer_bytes,
                    &mut adapter_state,
                    &mut stats,
                    &mut cancel,
                    &mut on_progress,
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => cancelled = true,
                Err(source) => {
                    stream.release();
                    return Err(WriterError::new(stats, source));
                }
            }
        }

        stream.release();

        Ok(if cancelled {
            WriterOutcome::Cancelled(stats)
        } else {
            WriterOutcome::Completed(stats)
        })
    }

    /// Drains `buffer` through the driver in adapter-sized sub-batches.
    /// Returns `Ok(true)` on a normal completed flush, `Ok(false)` if
    /// cancellation stopped the flush between sub-batches, or `Err` on a
    /// fatal condition.
    async fn flush(
        &self,
        buffer: &mut Vec<Document>,
        buffer_bytes: &mut usize,
        adapter_state: &mut BatchSizeAdapter,
        stats: &mut WriteStats,
        cancel: &mut CancelToken,
        on_progress: &mut impl FnMut(u64, &str),
    ) -> std::result::Result<bool, Error> {
        let mut pending: VecDeque<Document> = std::mem::take(buffer).into();
        *buffer_bytes = 0;

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                return Ok(false);
            }

            let take_n = pending.len().min(adapter_state.current_batch_size() as usize);
            let sub_batch: Vec<Document> = pending.drain(..take_n).collect();

            let outcome = self
                .write_batch_with_retry(sub_batch, adapter_state, stats, cancel, on_progress)
                .await?;

            match outcome {
                SubBatchOutcome::Cancelled => return Ok(false),
                SubBatchOutcome::AbsorbedByPartialProgress => {
                    adapter_state.grow();
                }
                SubBatchOutcome::Written(result) => {
                    // Drive both the stats merge and the progress delta
                    // off the same per-field sum, so the invariant
                    // "final WriteStats equals the sum of all reported
                    // deltas" holds regardless of what a driver happens
                    // to put in `processed`.
                    let delta = result.success_count();
                    stats.merge_batch(&result);
                    if delta > 0 {
                        on_progress(delta, &result.format_summary());
                    }

                    for err in result.errors() {
                        debug!(id = ?err.id, message = %err.message, strategy = ?self.strategy, "non-fatal write conflict");
                    }

                    let has_conflicts = !result.errors().is_empty();
                    let fatal_on_conflict = matches!(
                        self.strategy,
                        ConflictStrategy::Abort | ConflictStrategy::Overwrite
                    );
                    if has_conflicts && fatal_on_conflict {
                        return Err(Error::Conflict(
                            result
                                .errors()
                                .first()
                                .map(|e| e.message.clone())
                                .unwrap_or_else(|| "conflict".to_string()),
                        ));
                    }

                    if !has_conflicts {
                        adapter_state.grow();
                    }
                }
            }
        }

        stats.record_flush();
        Ok(true)
    }

    /// Repeats `writeBatch` up to `maxAttempts`, resetting on progress
    /// (§4.3, §4.4 "writeBatchWithRetry").
    async fn write_batch_with_retry(
        &self,
        mut current_batch: Vec<Document>,
        adapter_state: &mut BatchSizeAdapter,
        stats: &mut WriteStats,
        cancel: &mut CancelToken,
        on_progress: &mut impl FnMut(u64, &str),
    ) -> std::result::Result<SubBatchOutcome, Error> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(SubBatchOutcome::Cancelled);
            }

            match self.adapter.write_batch(&current_batch, self.strategy).await {
                Ok(result) => return Ok(SubBatchOutcome::Written(result)),
                Err(driver_err) => {
                    let kind = self.adapter.classify_error(&driver_err);
                    match kind {
                        ErrorKind::Throttle => {
                            let partial = self
                                .adapter
                                .extract_partial_progress(&driver_err)
                                .unwrap_or_default();
                            let processed = partial.processed();
                            adapter_state.handle_throttle(processed as u32);

                            if processed > 0 {
                                stats.merge_partial(self.strategy, &partial);
                                on_progress(processed, &format!("partial progress: {processed} written before throttle"));
                                attempt = 0;

                                let remaining = (processed as usize).min(current_batch.len());
                                current_batch = current_batch.split_off(remaining);
                                if current_batch.is_empty() {
                                    return Ok(SubBatchOutcome::AbsorbedByPartialProgress);
                                }
                            } else {
                                attempt += 1;
                            }

                            if attempt > self.retry_config.max_attempts {
                                return Err(Error::MaxAttempts {
                                    attempts: self.retry_config.max_attempts,
                                });
                            }
                            sleep_cancellable(self.retry_config.delay_for_attempt(attempt), cancel).await;
                            if cancel.is_cancelled() {
                                return Ok(SubBatchOutcome::Cancelled);
                            }
                        }
                        ErrorKind::Network => {
                            attempt += 1;
                            if attempt > self.retry_config.max_attempts {
                                return Err(Error::MaxAttempts {
                                    attempts: self.retry_config.max_attempts,
                                });
                            }
                            sleep_cancellable(self.retry_config.delay_for_attempt(attempt), cancel).await;
                            if cancel.is_cancelled() {
                                return Ok(SubBatchOutcome::Cancelled);
                            }
                        }
                        _ if !is_retryable(kind) => {
                            warn!(strategy = ?self.strategy, "fatal driver error: {driver_err}");
                            return Err(classify_to_error(kind, driver_err));
                        }
                        _ => unreachable!("Throttle and Network are handled above and are the only retryable kinds"),
                    }
                }
            }
        }
    }
}

fn classify_to_error(kind: ErrorKind, err: DriverError) -> Error {
    match kind {
        ErrorKind::Conflict => Error::Conflict(err.to_string()),
        _ => Error::Driver(err),
    }
}

/// Convenience free function mirroring the library's narrow external
/// surface: construct a writer, run it, map the outcome into a plain
/// `CrateResult`. Prefer `StreamingWriter` directly when you need the
/// distinction between `Completed` and `Cancelled`.
pub async fn write_all(
    adapter: &dyn DriverAdapter,
    strategy: ConflictStrategy,
    stream: Box<dyn DocumentStream>,
    cancel: CancelToken,
    on_progress: impl FnMut(u64, &str),
) -> CrateResult<WriteStats> {
    let writer = StreamingWriter::new(adapter, strategy);
    match writer.run(stream, cancel, on_progress).await {
        Ok(outcome) => Ok(outcome.stats()),
        Err(writer_err) => Err(writer_err.source),
    }
}
