//! Similarity index adapter
//!
//! Bridges records to an external embedding/similarity engine. The engine
//! itself stays behind the [`VectorBackend`] trait; this module decides
//! which collection a record belongs to, what text it embeds, and which
//! scalar fields ride along as filterable metadata.
//!
//! The index is a derived secondary: every failure here is degraded to
//! "no index entry" or "no results" rather than aborting the caller's
//! write or search. The durable store is always authoritative.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::{Record, RecordKind};
use crate::storage::filter::RecordFilter;

/// Logical collection an embedding lives in. Episode summaries, turn
/// excerpts, and semantic triples embed differently, so each kind gets
/// its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Episodes,
    Turns,
    Semantic,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Episodes,
        Collection::Turns,
        Collection::Semantic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Episodes => "memory_episodes",
            Collection::Turns => "memory_turns",
            Collection::Semantic => "memory_semantic",
        }
    }
}

/// One ranked hit from a similarity query. Lower distance is closer.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub distance: f32,
    /// Scalar fields carried at index time; enough to identify the hit
    /// when the full record is no longer retrievable.
    pub metadata: BTreeMap<String, Value>,
}

/// The opaque embedding/similarity engine.
///
/// Implementations own embedding generation and nearest-neighbour search;
/// the adapter owns everything record-shaped. `remove` reports whether an
/// entry was actually dropped so callers can distinguish a miss from a
/// removal.
pub trait VectorBackend {
    fn index(
        &mut self,
        collection: Collection,
        id: &str,
        text: &str,
        metadata: &BTreeMap<String, Value>,
    ) -> Result<()>;

    /// Ranked ids by ascending distance. `filter` applies equality
    /// conditions against the indexed metadata.
    fn query(
        &self,
        collection: Collection,
        text: &str,
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<IndexHit>>;

    /// Returns true when an entry existed and was removed.
    fn remove(&mut self, collection: Collection, id: &str) -> Result<bool>;
}

/// Maintains per-kind searchable collections over an opaque backend.
pub struct SimilarityIndex {
    backend: Box<dyn VectorBackend>,
}

impl SimilarityIndex {
    pub fn new(backend: Box<dyn VectorBackend>) -> Self {
        Self { backend }
    }

    /// Index a record. Records without embeddable text (sensory records,
    /// empty summaries) are skipped, not erred.
    pub fn index_record(&mut self, record: &Record) -> Result<()> {
        let Some(collection) = collection_for(record.kind()) else {
            return Ok(());
        };
        let Some(text) = embeddable_text(record) else {
            debug!(id = record.id(), "no embeddable text, skipping index");
            return Ok(());
        };

        let metadata = scalar_metadata(record);
        self.backend
            .index(collection, record.id(), &text, &metadata)
    }

    /// Search all collections, merge by ascending distance, keep `k`.
    ///
    /// A failing collection contributes nothing; the query degrades to
    /// whatever the healthy collections return.
    pub fn search(&self, text: &str, k: usize, filter: Option<&RecordFilter>) -> Vec<IndexHit> {
        let mut hits = Vec::new();
        for collection in Collection::ALL {
            match self.backend.query(collection, text, k, filter) {
                Ok(mut collection_hits) => hits.append(&mut collection_hits),
                Err(e) => {
                    warn!(collection = collection.name(), error = %e, "index query failed");
                }
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        hits
    }

    /// Remove an id from every collection. Returns true when any
    /// collection held an entry.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let mut removed = false;
        for collection in Collection::ALL {
            removed |= self.backend.remove(collection, id)?;
        }
        Ok(removed)
    }
}

/// Which collection a record kind is indexed in. Sensory records carry no
/// embeddable text and are not indexed.
fn collection_for(kind: RecordKind) -> Option<Collection> {
    match kind {
        RecordKind::Episode => Some(Collection::Episodes),
        RecordKind::TurnUser | RecordKind::TurnLlm => Some(Collection::Turns),
        RecordKind::Semantic => Some(Collection::Semantic),
        RecordKind::Sensory => None,
    }
}

/// The text a record embeds, or None when it trims to empty.
fn embeddable_text(record: &Record) -> Option<String> {
    let text = match record {
        Record::Episode(e) => return e.embeddable_text(),
        Record::TurnUser(t) => t.text_excerpt.clone(),
        Record::TurnLlm(t) => t.text_excerpt.clone(),
        Record::Semantic(s) => s.as_triple(),
        Record::Sensory(_) => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Top-level scalar fields of the record's JSON form (strings, numbers,
/// booleans). These ride along in the index to support equality filters
/// and to stand in for the record if hydration later misses.
fn scalar_metadata(record: &Record) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    if let Ok(Value::Object(map)) = serde_json::to_value(record) {
        for (key, value) in map {
            if value.is_string() || value.is_number() || value.is_boolean() {
                metadata.insert(key, value);
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Episode, Semantic, Sensory, StructuredSummary, TurnUser};
    use crate::testing::MockVectorBackend;

    fn index() -> SimilarityIndex {
        SimilarityIndex::new(Box::new(MockVectorBackend::new()))
    }

    #[test]
    fn semantic_records_embed_the_triple() {
        let mut index = index();
        let fact = Semantic::new("user", "likes", "rust");
        let id = fact.id.clone();
        index.index_record(&Record::Semantic(fact)).unwrap();

        let hits = index.search("user likes rust", 5, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn sensory_records_are_not_indexed() {
        let mut index = index();
        index
            .index_record(&Record::Sensory(Sensory::new("ep_1", "image")))
            .unwrap();
        assert!(index.search("image", 5, None).is_empty());
    }

    #[test]
    fn empty_text_is_skipped_not_erred() {
        let mut index = index();
        let episode = Episode::new();
        index.index_record(&Record::Episode(episode)).unwrap();

        let mut blank = Episode::new();
        blank.summary = Some(StructuredSummary::new("   "));
        index.index_record(&Record::Episode(blank)).unwrap();

        assert!(index.search("anything", 5, None).is_empty());
    }

    #[test]
    fn search_merges_collections_sorted_by_distance() {
        let mut index = index();

        let mut episode = Episode::new();
        episode.summary = Some(StructuredSummary::new("planning the garden"));
        let episode_id = episode.episode_id.clone();
        index.index_record(&Record::Episode(episode)).unwrap();

        let turn = TurnUser::new("ep_x", "we talked about compilers");
        index.index_record(&Record::TurnUser(turn)).unwrap();

        let hits = index.search("planning the garden", 5, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, episode_id);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn filter_restricts_hits_by_metadata() {
        let mut index = index();
        let fact = Semantic::new("user", "likes", "rust");
        index.index_record(&Record::Semantic(fact)).unwrap();
        let turn = TurnUser::new("ep_x", "user likes rust");
        index.index_record(&Record::TurnUser(turn)).unwrap();

        let filter = RecordFilter::new().with_kind(RecordKind::Semantic);
        let hits = index.search("user likes rust", 5, Some(&filter));
        assert_eq!(hits.len(), 1);
        assert!(hits[0].id.starts_with("sem_"));
    }

    #[test]
    fn remove_reports_whether_anything_was_dropped() {
        let mut index = index();
        let fact = Semantic::new("user", "likes", "rust");
        let id = fact.id.clone();
        index.index_record(&Record::Semantic(fact)).unwrap();

        assert!(index.remove(&id).unwrap());
        assert!(!index.remove(&id).unwrap());
        assert!(index.search("user likes rust", 5, None).is_empty());
    }

    #[test]
    fn metadata_carries_scalars_only() {
        let fact = Semantic::new("user", "likes", "rust");
        let metadata = scalar_metadata(&Record::Semantic(fact));
        assert_eq!(metadata.get("subject"), Some(&Value::from("user")));
        assert_eq!(metadata.get("type"), Some(&Value::from("semantic")));
        assert!(!metadata.contains_key("episode_refs"));
    }
}
