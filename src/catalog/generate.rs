//! Generator (§4.7 Phase 3 / doc-link emission, snippet resolution):
//! turns merged `ScrapedOperator` records into registry-ready
//! `OperatorEntry` records.

use std::collections::HashMap;

use tracing::warn;

use super::meta_map::{directory_for_category, meta_tag_for_category, normalize_category_key};
use super::model::{BsonTypeSet, OperatorEntry};
use super::scrape::ScrapedOperator;

/// Per-operator and per-category-default snippet sources (§4.7 snippet
/// resolution).
#[derive(Debug, Clone, Default)]
pub struct SnippetConfig {
    pub per_operator: HashMap<String, String>,
    /// Keyed by normalized category key; template contains `{{VALUE}}`.
    pub per_category_default: HashMap<String, String>,
}

/// Deterministic precedence: explicit override > per-operator snippet >
/// category DEFAULT template > none (§8 invariant).
pub fn resolve_snippet(
    operator: &str,
    category_key: &str,
    explicit_override: Option<&str>,
    config: &SnippetConfig,
) -> Option<String> {
    if let Some(s) = explicit_override {
        return Some(s.to_string());
    }
    if let Some(s) = config.per_operator.get(operator) {
        return Some(s.clone());
    }
    config
        .per_category_default
        .get(category_key)
        .map(|template| template.replace("{{VALUE}}", operator))
}

/// Outcome of doc-link emission (§4.7): whether the link was computed
/// from the static map, taken verbatim from the scrape, or inferred
/// cross-category (and so emitted with an explanatory comment).
#[derive(Debug, Clone, PartialEq)]
pub enum DocLink {
    Computed(String),
    Literal(String),
    CrossCategory(String),
}

impl DocLink {
    pub fn url(&self) -> &str {
        match self {
            DocLink::Computed(s) | DocLink::Literal(s) | DocLink::CrossCategory(s) => s,
        }
    }
}

/// Computes `base/dir/lowercased-operator-name` and compares it against
/// the scraped URL (§4.7).
pub fn resolve_doc_link(
    category_key: &str,
    operator: &str,
    base_url: &str,
    scraped_url: Option<&str>,
    is_cross_category_inference: bool,
) -> Option<DocLink> {
    let dir = directory_for_category(category_key)?;
    let slug = operator.trim_start_matches('$').to_ascii_lowercase();
    let computed = format!("{base_url}/{dir}/{slug}");

    Some(match scraped_url {
        None => DocLink::Computed(computed),
        Some(url) if url == computed => DocLink::Computed(computed),
        Some(url) if is_cross_category_inference => DocLink::CrossCategory(url.to_string()),
        Some(url) => DocLink::Literal(url.to_string()),
    })
}

/// Builds registry entries from merged scraped operators. Entries whose
/// category has no meta-tag mapping are skipped with a warning (§6 exit
/// conditions: "warnings... for unmapped override categories").
pub fn build_operator_entries(
    scraped: &[ScrapedOperator],
    base_url: &str,
    snippet_config: &SnippetConfig,
) -> Vec<OperatorEntry> {
    let mut entries = Vec::with_capacity(scraped.len());
    for op in scraped {
        let category_key = normalize_category_key(&op.category);
        let Some(meta) = meta_tag_for_category(&op.category) else {
            warn!(category = %op.category, operator = %op.operator, "unmapped category, skipping");
            continue;
        };

        let link = resolve_doc_link(&category_key, &op.operator, base_url, op.link.as_deref(), false)
            .map(|dl| dl.url().to_string());
        let snippet = resolve_snippet(&op.operator, &category_key, None, snippet_config);

        entries.push(OperatorEntry {
            value: op.operator.clone(),
            meta,
            description: op.description.clone(),
            snippet,
            link,
            applicable_bson_types: BsonTypeSet::new(),
            return_type: None,
        });
    }
    entries
}

/// The process-wide registry's bootstrap content (§6 "a single
/// in-memory vector registered at module initialization"): a small
/// built-in catalog, not derived from a live scrape. A full catalog is
/// produced by running the `scrape-operators`/`generate-catalog`
/// binaries against a live docs site and replacing this list.
pub fn default_entries() -> Vec<OperatorEntry> {
    let scraped = vec![
        ScrapedOperator {
            category: "Comparison".into(),
            operator: "$eq".into(),
            description: "Matches values equal to a specified value.".into(),
            syntax: Some("{ $eq: [ <expr1>, <expr2> ] }".into()),
            link: None,
        },
        ScrapedOperator {
            category: "Comparison".into(),
            operator: "$gt".into(),
            description: "Matches values greater than a specified value.".into(),
            syntax: Some("{ $gt: [ <expr1>, <expr2> ] }".into()),
            link: None,
        },
        ScrapedOperator {
            category: "Logical".into(),
            operator: "$and".into(),
            description: "Joins clauses with a logical AND.".into(),
            syntax: Some("{ $and: [ <expr1>, <expr2>, ... ] }".into()),
            link: None,
        },
        ScrapedOperator {
            category: "Accumulators".into(),
            operator: "$sum".into(),
            description: "Sums numeric values across a group.".into(),
            syntax: Some("{ $sum: <expr> }".into()),
            link: None,
        },
    ];

    let snippet_config = SnippetConfig {
        per_operator: HashMap::new(),
        per_category_default: HashMap::from([(
            "comparison".to_string(),
            "{ {{VALUE}}: [ <expr1>, <expr2> ] }".to_string(),
        )]),
    };

    build_operator_entries(&scraped, "https://docs.example.com", &snippet_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_resolution_follows_precedence() {
        let mut config = SnippetConfig::default();
        config.per_operator.insert("$gt".to_string(), "per-op snippet".to_string());
        config
            .per_category_default
            .insert("comparison".to_string(), "{ {{VALUE}}: 1 }".to_string());

        assert_eq!(
            resolve_snippet("$eq", "comparison", Some("explicit"), &config),
            Some("explicit".to_string())
        );
        assert_eq!(
            resolve_snippet("$gt", "comparison", None, &config),
            Some("per-op snippet".to_string())
        );
        assert_eq!(
            resolve_snippet("$lt", "comparison", None, &config),
            Some("{ $lt: 1 }".to_string())
        );
        assert_eq!(resolve_snippet("$lt", "unmapped", None, &config), None);
    }

    #[test]
    fn doc_link_prefers_computed_form_when_it_matches_scraped_url() {
        let link = resolve_doc_link(
            "comparison",
            "$eq",
            "https://docs.example.com",
            Some("https://docs.example.com/query/eq"),
            false,
        )
        .unwrap();
        assert_eq!(link, DocLink::Computed("https://docs.example.com/query/eq".into()));
    }

    #[test]
    fn doc_link_falls_back_to_literal_when_urls_differ() {
        let link = resolve_doc_link(
            "comparison",
            "$eq",
            "https://docs.example.com",
            Some("https://docs.example.com/weird/path"),
            false,
        )
        .unwrap();
        assert_eq!(link, DocLink::Literal("https://docs.example.com/weird/path".into()));
    }

    #[test]
    fn build_entries_skips_unmapped_categories() {
        let scraped = vec![ScrapedOperator {
            category: "Unmapped Category".into(),
            operator: "$weird".into(),
            description: "desc".into(),
            syntax: None,
            link: None,
        }];
        let entries = build_operator_entries(&scraped, "https://docs.example.com", &SnippetConfig::default());
        assert!(entries.is_empty());
    }

    #[test]
    fn default_entries_are_non_empty_and_have_unique_value_meta_pairs() {
        let entries = default_entries();
        assert!(!entries.is_empty());
        let mut seen = std::collections::HashSet::new();
        for e in &entries {
            assert!(seen.insert((e.value.clone(), e.meta.clone())));
            assert!(!e.description.is_empty());
        }
    }
}
