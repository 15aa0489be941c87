//! Static meta/directory tables (§4.7 doc-link emission, phase 2
//! directory fallback (a)). Hand-enumerated from the compatibility
//! page's category structure; extended as new categories are scraped.

use super::model::MetaTag;

/// Lowercases and hyphenates a scraped category name into the key used
/// by both tables below (`"Variable Expressions"` ->
/// `"variable-expressions"`).
pub fn normalize_category_key(category: &str) -> String {
    category.to_ascii_lowercase().replace(' ', "-")
}

/// Maps a normalized category key to the meta tag root entries scraped
/// under it are registered with (§4.7, §8 scenario 7).
pub fn meta_root_for_category(category_key: &str) -> Option<&'static str> {
    match category_key {
        "comparison" => Some("query:comparison"),
        "logical" => Some("query:logical"),
        "element" => Some("query:element"),
        "evaluation" => Some("query:evaluation"),
        "array" => Some("query:array"),
        "update-operators" => Some("update:field"),
        "accumulators" => Some("aggregation:accumulator"),
        "arithmetic-expressions" => Some("aggregation:arithmetic"),
        "string-expressions" => Some("aggregation:string"),
        "date-expressions" => Some("aggregation:date"),
        "type-expressions" => Some("aggregation:type"),
        "boolean-expressions" => Some("aggregation:boolean"),
        "variable-expressions" => Some("aggregation:variable"),
        _ => None,
    }
}

/// Maps a normalized category key to the docs-tree directory segment
/// used to compute `base/dir/lowercased-operator-name` (§4.7).
pub fn directory_for_category(category_key: &str) -> Option<&'static str> {
    match category_key {
        "comparison" | "logical" | "element" | "evaluation" | "array" => Some("query"),
        "update-operators" => Some("update"),
        "accumulators"
        | "arithmetic-expressions"
        | "string-expressions"
        | "date-expressions"
        | "type-expressions"
        | "boolean-expressions"
        | "variable-expressions" => Some("aggregation"),
        _ => None,
    }
}

/// Convenience wrapper combining the two tables into a `MetaTag`, for
/// callers that only have the raw scraped category string.
pub fn meta_tag_for_category(category: &str) -> Option<MetaTag> {
    let key = normalize_category_key(category);
    meta_root_for_category(&key).and_then(MetaTag::new)
}
