//! Completion filter (§4.8): a pure function over the registry.

use super::model::{BsonTypeSet, OperatorEntry};

/// `filter(metaPrefixes, bsonTypes?)`: entries whose meta matches any of
/// `meta_prefixes`, and — if `bson_types` is non-empty — that are either
/// universal or intersect the requested type set. Registration order is
/// preserved (§4.8, §8 purity invariant).
pub fn filter<'a>(
    entries: &'a [OperatorEntry],
    meta_prefixes: &[&str],
    bson_types: &BsonTypeSet,
) -> Vec<&'a OperatorEntry> {
    entries
        .iter()
        .filter(|e| meta_prefixes.iter().any(|p| e.meta.matches_prefix(p)))
        .filter(|e| {
            bson_types.is_empty()
                || e.is_universal()
                || !e.applicable_bson_types.is_disjoint(bson_types)
        })
        .collect()
}
