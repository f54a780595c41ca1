//! Equality filters for record queries
//!
//! A filter is a map of field name to expected value, matched against the
//! decoded record's JSON representation with AND logic. The `type` field is
//! special-cased so short kind aliases (`episodic`, `sensory`) match the
//! full on-disk discriminants.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::record::{Record, RecordKind};

/// Exact-field-equality filter criteria.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    fields: BTreeMap<String, Value>,
}

impl RecordFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    /// Require exact equality on a field.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Restrict to one record kind. Equivalent to filtering on `type`.
    pub fn with_kind(self, kind: RecordKind) -> Self {
        self.with_field("type", kind.discriminant())
    }

    /// The kind this filter restricts to, if a `type` entry is present
    /// and names a known kind or alias.
    pub fn kind(&self) -> Option<RecordKind> {
        self.fields
            .get("type")
            .and_then(Value::as_str)
            .and_then(RecordKind::parse)
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Match a decoded record. All entries must hold.
    pub fn matches(&self, record: &Record) -> bool {
        if self.fields.is_empty() {
            return true;
        }
        let Ok(Value::Object(map)) = serde_json::to_value(record) else {
            return false;
        };
        self.fields.iter().all(|(field, expected)| {
            if field == "type" {
                return expected
                    .as_str()
                    .and_then(RecordKind::parse)
                    .is_some_and(|kind| kind == record.kind());
            }
            map.get(field) == Some(expected)
        })
    }

    /// Match against an index entry's scalar metadata. Used by similarity
    /// backends, which carry flattened scalar fields instead of full
    /// records.
    pub fn matches_metadata(&self, metadata: &BTreeMap<String, Value>) -> bool {
        self.fields.iter().all(|(field, expected)| {
            if field == "type" {
                let filter_kind = expected.as_str().and_then(RecordKind::parse);
                let meta_kind = metadata
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(RecordKind::parse);
                return filter_kind.is_some() && filter_kind == meta_kind;
            }
            metadata.get(field) == Some(expected)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Episode, Semantic};

    #[test]
    fn empty_filter_matches_everything() {
        let filter = RecordFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&Record::Episode(Episode::new())));
    }

    #[test]
    fn kind_filter_uses_aliases() {
        let filter = RecordFilter::new().with_field("type", "episodic");
        assert_eq!(filter.kind(), Some(RecordKind::Episode));
        assert!(filter.matches(&Record::Episode(Episode::new())));
        assert!(!filter.matches(&Record::Semantic(Semantic::new("a", "b", "c"))));
    }

    #[test]
    fn field_filter_requires_exact_equality() {
        let fact = Semantic::new("user", "likes", "rust");
        let record = Record::Semantic(fact);

        let hit = RecordFilter::new().with_field("subject", "user");
        assert!(hit.matches(&record));

        let miss = RecordFilter::new().with_field("subject", "agent");
        assert!(!miss.matches(&record));

        let unknown_field = RecordFilter::new().with_field("nonexistent", "x");
        assert!(!unknown_field.matches(&record));
    }

    #[test]
    fn combined_filters_use_and_logic() {
        let record = Record::Semantic(Semantic::new("user", "likes", "rust"));

        let both = RecordFilter::new()
            .with_field("subject", "user")
            .with_field("predicate", "likes");
        assert!(both.matches(&record));

        let one_wrong = RecordFilter::new()
            .with_field("subject", "user")
            .with_field("predicate", "dislikes");
        assert!(!one_wrong.matches(&record));
    }

    #[test]
    fn metadata_matching() {
        let mut metadata = BTreeMap::new();
        metadata.insert("type".to_string(), Value::from("semantic"));
        metadata.insert("subject".to_string(), Value::from("user"));

        let filter = RecordFilter::new()
            .with_kind(RecordKind::Semantic)
            .with_field("subject", "user");
        assert!(filter.matches_metadata(&metadata));

        let miss = RecordFilter::new().with_kind(RecordKind::Episode);
        assert!(!miss.matches_metadata(&metadata));
    }
}
