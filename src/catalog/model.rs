//! Operator catalog data model (§3): the registry record and the
//! meta-tag prefix-match rule the completion filter builds on.

use std::collections::BTreeSet;
use std::fmt;

/// A coarse BSON type grouping, used to narrow completion suggestions by
/// the type of the expression under the cursor. Not the full BSON type
/// tag set — just the buckets operators actually discriminate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BsonTypeTag {
    String,
    Number,
    Bool,
    Date,
    Array,
    Object,
    Null,
    ObjectId,
}

/// A set of BSON type tags an operator applies to. Empty/absent means
/// "applies to every type" (§3 "universal" entries).
pub type BsonTypeSet = BTreeSet<BsonTypeTag>;

/// A hierarchical category string of the form `root` or `root:sub`
/// (§3, GLOSSARY). Stored pre-validated; construction rejects an empty
/// root segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetaTag(String);

impl MetaTag {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let root = raw.split(':').next().unwrap_or("");
        if root.is_empty() {
            return None;
        }
        Some(MetaTag(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filter `p` matches entry meta `m` iff `m == p` or `m` begins with
    /// `p:` (§3, §4.8).
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.0 == prefix || self.0.starts_with(&format!("{prefix}:"))
    }
}

impl fmt::Display for MetaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single operator reference entry (§3). `(value, meta)` is unique
/// across the registry; `description` is always non-empty; `link`, when
/// present, always begins with `https://`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorEntry {
    pub value: String,
    pub meta: MetaTag,
    pub description: String,
    pub snippet: Option<String>,
    pub link: Option<String>,
    pub applicable_bson_types: BsonTypeSet,
    pub return_type: Option<String>,
}

impl OperatorEntry {
    /// Entries with an empty `applicable_bson_types` set apply to every
    /// type (§3 "universal").
    pub fn is_universal(&self) -> bool {
        self.applicable_bson_types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_tag_prefix_matching() {
        let m = MetaTag::new("query:comparison").unwrap();
        assert!(m.matches_prefix("query"));
        assert!(m.matches_prefix("query:comparison"));
        assert!(!m.matches_prefix("quer"));
        assert!(!m.matches_prefix("query:comp"));
    }

    #[test]
    fn empty_root_segment_is_rejected() {
        assert!(MetaTag::new(":sub").is_none());
        assert!(MetaTag::new("").is_none());
    }

    #[test]
    fn universal_entry_has_no_bson_types() {
        let entry = OperatorEntry {
            value: "$eq".into(),
            meta: MetaTag::new("query:comparison").unwrap(),
            description: "Matches values equal to a specified value.".into(),
            snippet: None,
            link: None,
            applicable_bson_types: BsonTypeSet::new(),
            return_type: None,
        };
        assert!(entry.is_universal());
    }
}
