//! Override merger (§4.7): parses a second Markdown file using the same
//! grammar as the scraper's dump and layers field-level overrides onto
//! the scraped operators.

use super::scrape::ScrapedOperator;

/// A parsed override record. Only the fields actually present in the
/// source file are `Some`; an empty string field is treated the same as
/// absent (§4.7 "empty strings do not override").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverrideEntry {
    pub category: String,
    pub operator: String,
    pub description: Option<String>,
    pub syntax: Option<String>,
    pub link: Option<String>,
}

/// Parses the `## Category` / `### Operator` / `- **Field:** value`
/// grammar shared with the scraper's dump output.
pub fn parse_overrides(markdown: &str) -> Vec<OverrideEntry> {
    let mut entries = Vec::new();
    let mut current_category = String::new();
    let mut current: Option<OverrideEntry> = None;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(category) = trimmed.strip_prefix("## ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current_category = category.trim().to_string();
            continue;
        }
        if let Some(operator) = trimmed.strip_prefix("### ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(OverrideEntry {
                category: current_category.clone(),
                operator: operator.trim().to_string(),
                ..Default::default()
            });
            continue;
        }
        let Some(entry) = current.as_mut() else { continue };
        if let Some(value) = field_value(trimmed, "Description") {
            entry.description = non_empty(value);
        } else if let Some(value) = field_value(trimmed, "Syntax") {
            entry.syntax = non_empty(value);
        } else if let Some(value) = field_value(trimmed, "Doc Link") {
            entry.link = non_empty(value);
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries
}

fn field_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let prefix = format!("- **{label}:**");
    line.strip_prefix(&prefix).map(|rest| rest.trim())
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// For each `(category, operator, field)` present in `overrides`,
/// overrides the scraped value; entries with no matching override pass
/// through unchanged (§4.7, §8 round-trip law).
pub fn merge(scraped: &[ScrapedOperator], overrides: &[OverrideEntry]) -> Vec<ScrapedOperator> {
    scraped
        .iter()
        .map(|op| {
            let mut merged = op.clone();
            if let Some(ov) = overrides
                .iter()
                .find(|o| o.category == op.category && o.operator == op.operator)
            {
                if let Some(desc) = &ov.description {
                    merged.description = desc.clone();
                }
                if let Some(syntax) = &ov.syntax {
                    merged.syntax = Some(syntax.clone());
                }
                if let Some(link) = &ov.link {
                    merged.link = Some(link.clone());
                }
            }
            merged
        })
        .collect()
}

/// Composes two override passes into one, favoring `second` field-by-
/// field (§8 round-trip law: `merge(merge(s,o1),o2) ==
/// merge(s, compose(o1,o2))`).
pub fn compose(first: &[OverrideEntry], second: &[OverrideEntry]) -> Vec<OverrideEntry> {
    let mut composed = first.to_vec();
    for entry in second {
        match composed
            .iter_mut()
            .find(|e| e.category == entry.category && e.operator == entry.operator)
        {
            Some(existing) => {
                if entry.description.is_some() {
                    existing.description = entry.description.clone();
                }
                if entry.syntax.is_some() {
                    existing.syntax = entry.syntax.clone();
                }
                if entry.link.is_some() {
                    existing.link = entry.link.clone();
                }
            }
            None => composed.push(entry.clone()),
        }
    }
    composed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped_op() -> ScrapedOperator {
        ScrapedOperator {
            category: "Comparison".into(),
            operator: "$eq".into(),
            description: "Matches equal values.".into(),
            syntax: Some("{ $eq: [a, b] }".into()),
            link: Some("https://docs.example/query/eq".into()),
        }
    }

    #[test]
    fn merge_with_empty_overrides_is_identity() {
        let scraped = vec![scraped_op()];
        let merged = merge(&scraped, &[]);
        assert_eq!(merged, scraped);
    }

    #[test]
    fn empty_override_field_does_not_override() {
        let scraped = vec![scraped_op()];
        let overrides = vec![OverrideEntry {
            category: "Comparison".into(),
            operator: "$eq".into(),
            description: Some("Better description.".into()),
            syntax: None,
            link: None,
        }];
        let merged = merge(&scraped, &overrides);
        assert_eq!(merged[0].description, "Better description.");
        assert_eq!(merged[0].syntax, scraped[0].syntax);
    }

    #[test]
    fn parses_override_grammar() {
        let markdown = "\
## Comparison

### $eq

- **Description:** Better description.
- **Doc Link:** https://docs.example/custom/eq
";
        let overrides = parse_overrides(markdown);
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].description.as_deref(), Some("Better description."));
        assert_eq!(overrides[0].link.as_deref(), Some("https://docs.example/custom/eq"));
        assert_eq!(overrides[0].syntax, None);
    }

    #[test]
    fn sequential_merges_match_merge_of_composed_overrides() {
        let scraped = vec![scraped_op()];
        let o1 = vec![OverrideEntry {
            category: "Comparison".into(),
            operator: "$eq".into(),
            description: Some("From o1.".into()),
            syntax: None,
            link: None,
        }];
        let o2 = vec![OverrideEntry {
            category: "Comparison".into(),
            operator: "$eq".into(),
            description: Some("From o2.".into()),
            syntax: Some("{ $eq: [x, y] }".into()),
            link: None,
        }];

        let sequential = merge(&merge(&scraped, &o1), &o2);
        let composed = merge(&scraped, &compose(&o1, &o2));
        assert_eq!(sequential, composed);
    }
}
