//! Strategy-tagged result and statistics types (§3).
//!
//! `BatchResult` and `PartialProgress` are sum types keyed by the
//! conflict strategy in effect for the operation; field names follow the
//! semantics the spec calls out ("named by semantics, not by driver
//! fields") rather than whatever the wire protocol happens to call them.

use bson::Bson;

/// Chosen once per operation; drives the shape of the batch result and
/// the failure semantics (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictStrategy {
    Abort,
    Skip,
    Overwrite,
    GenerateNewIds,
}

/// A single non-fatal conflict recorded against a batch (duplicate
/// skipped, or the one conflicting document under Abort).
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictError {
    pub id: Bson,
    pub message: String,
}

/// Strategy-tagged sum type; every variant also carries
/// `{ processed, errors }` per §3.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Skip {
        inserted: u64,
        skipped: u64,
        processed: u64,
        errors: Vec<ConflictError>,
    },
    Abort {
        inserted: u64,
        aborted: u8,
        processed: u64,
        errors: Vec<ConflictError>,
    },
    Overwrite {
        replaced: u64,
        created: u64,
        processed: u64,
        errors: Vec<ConflictError>,
    },
    GenerateNewIds {
        inserted: u64,
        processed: u64,
        errors: Vec<ConflictError>,
    },
}

impl BatchResult {
    pub fn processed(&self) -> u64 {
        match self {
            BatchResult::Skip { processed, .. }
            | BatchResult::Abort { processed, .. }
            | BatchResult::Overwrite { processed, .. }
            | BatchResult::GenerateNewIds { processed, .. } => *processed,
        }
    }

    pub fn errors(&self) -> &[ConflictError] {
        match self {
            BatchResult::Skip { errors, .. }
            | BatchResult::Abort { errors, .. }
            | BatchResult::Overwrite { errors, .. }
            | BatchResult::GenerateNewIds { errors, .. } => errors,
        }
    }

    /// Count of documents this result reports as successfully written,
    /// summed across the variant's semantic fields.
    pub fn success_count(&self) -> u64 {
        match self {
            BatchResult::Skip { inserted, skipped, .. } => inserted + skipped,
            BatchResult::Abort { inserted, aborted, .. } => inserted + *aborted as u64,
            BatchResult::Overwrite { replaced, created, .. } => replaced + created,
            BatchResult::GenerateNewIds { inserted, .. } => *inserted,
        }
    }

    /// Human-readable strategy-tagged progress summary, passed to
    /// `onProgress` alongside the delta (§4.4, §6).
    pub fn format_summary(&self) -> String {
        match self {
            BatchResult::Skip { inserted, skipped, .. } => {
                format!("inserted {inserted}, skipped {skipped}")
            }
            BatchResult::Abort { inserted, aborted, .. } => {
                format!("inserted {inserted}, aborted {aborted}")
            }
            BatchResult::Overwrite { replaced, created, .. } => {
                format!("replaced {replaced}, created {created}")
            }
            BatchResult::GenerateNewIds { inserted, .. } => {
                format!("inserted {inserted} (new ids)")
            }
        }
    }
}

/// Counts recovered from a thrown throttle/network error, used both to
/// report progress immediately and to slice the retry batch (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialProgress {
    pub inserted: u64,
    pub skipped: u64,
    pub replaced: u64,
    pub created: u64,
}

impl PartialProgress {
    pub fn processed(&self) -> u64 {
        self.inserted + self.skipped + self.replaced + self.created
    }
}

/// Cumulative per-operation counters. Invariants (§3):
/// `total_processed == sum(inserted + skipped + replaced + created +
/// aborted)` across batches; monotonically non-decreasing; never mutated
/// after the operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteStats {
    pub inserted: u64,
    pub skipped: u64,
    pub replaced: u64,
    pub created: u64,
    pub aborted: u64,
    pub total_processed: u64,
    pub flush_count: u64,
}

impl WriteStats {
    /// Merge a batch result's counts in, keeping `total_processed` equal
    /// to the sum of the semantic success fields across all merges.
    pub fn merge_batch(&mut self, result: &BatchResult) {
        match result {
            BatchResult::Skip { inserted, skipped, .. } => {
                self.inserted += inserted;
                self.skipped += skipped;
                self.total_processed += inserted + skipped;
            }
            BatchResult::Abort { inserted, aborted, .. } => {
                self.inserted += inserted;
                self.aborted += *aborted as u64;
                self.total_processed += inserted + *aborted as u64;
            }
            BatchResult::Overwrite { replaced, created, .. } => {
                self.replaced += replaced;
                self.created += created;
                self.total_processed += replaced + created;
            }
            BatchResult::GenerateNewIds { inserted, .. } => {
                self.inserted += inserted;
                self.total_processed += inserted;
            }
        }
    }

    /// Merge partial progress recovered mid-throttle, tagged by the
    /// active strategy so the right semantic field advances.
    pub fn merge_partial(&mut self, strategy: ConflictStrategy, partial: &PartialProgress) {
        match strategy {
            ConflictStrategy::Skip => {
                self.inserted += partial.inserted;
                self.skipped += partial.skipped;
            }
            ConflictStrategy::Abort => {
                self.inserted += partial.inserted;
            }
            ConflictStrategy::Overwrite => {
                self.replaced += partial.replaced;
                self.created += partial.created;
            }
            ConflictStrategy::GenerateNewIds => {
                self.inserted += partial.inserted;
            }
        }
        self.total_processed += partial.processed();
    }

    pub fn record_flush(&mut self) {
        self.flush_count += 1;
    }
}
