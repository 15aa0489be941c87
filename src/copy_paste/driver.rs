//! The driver adapter boundary (§4.5, §6): four hooks any correct
//! implementation — MongoDB-wire driver, vCore driver, local engine —
//! plugs in without writer changes. The writer treats the adapter as an
//! opaque collaborator and never inspects its connection state (§5).

use async_trait::async_trait;

use crate::document::Document;
use crate::error::{DriverError, ErrorKind};

use super::strategy::{BatchResult, ConflictStrategy, PartialProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnsureTargetResult {
    pub target_was_created: bool,
}

#[async_trait]
pub trait DriverAdapter: Send + Sync {
    /// Writes one batch under `strategy`. Throws only for
    /// Throttle/Network/unexpected-Conflict-in-fallback; expected
    /// conflicts (Skip duplicates, Abort first-conflict) are returned in
    /// `errors` with counts populated.
    async fn write_batch(
        &self,
        docs: &[Document],
        strategy: ConflictStrategy,
    ) -> Result<BatchResult, DriverError>;

    /// Classifies a thrown error for retry policy purposes.
    fn classify_error(&self, err: &DriverError) -> ErrorKind;

    /// Extracts proven-written counts from a throttle/network error's
    /// envelope, if the driver's response shape makes that possible.
    fn extract_partial_progress(&self, err: &DriverError) -> Option<PartialProgress>;

    /// Looks up the target collection; creates it if absent.
    async fn ensure_target_exists(&self) -> Result<EnsureTargetResult, DriverError>;
}
