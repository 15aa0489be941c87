//! The operator registry (§4.7, §6, §9).
//!
//! Redesigned from a global mutable catalog into process-wide state with
//! an explicit init phase: a single vector built once at first access
//! and never mutated afterward. Tests build their own registry image
//! rather than reaching into the process-wide one, so they start from a
//! fresh, isolated catalog (§9).

use lazy_static::lazy_static;

use super::generate::default_entries;
use super::model::OperatorEntry;

lazy_static! {
    /// The process-wide catalog, built once on first access by
    /// `generate::default_entries`. Never mutated after construction.
    static ref REGISTRY: Vec<OperatorEntry> = default_entries();
}

/// Borrows the process-wide registry.
pub fn entries() -> &'static [OperatorEntry] {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_non_empty_and_stable_across_accesses() {
        let first = entries().len();
        let second = entries().len();
        assert_eq!(first, second);
        assert!(first > 0);
    }
}
