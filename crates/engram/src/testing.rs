//! Test utilities for engram - mock similarity backends
//!
//! The real embedding/similarity engine lives outside this crate. Tests
//! run against [`MockVectorBackend`], which produces deterministic
//! hash-derived vectors (no network, no ML) so search results are
//! reproducible, and [`FailingVectorBackend`], which errors on every
//! call to exercise the best-effort degradation paths.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{EngramError, Result};
use crate::index::{Collection, IndexHit, VectorBackend};
use crate::storage::RecordFilter;

const DIMENSIONS: usize = 384;

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    vector: Vec<f32>,
    metadata: BTreeMap<String, Value>,
}

/// In-memory vector backend with deterministic hash-based embeddings.
///
/// The same text always embeds to the same vector, so indexing a text
/// and querying for it verbatim yields distance zero.
#[derive(Debug, Clone, Default)]
pub struct MockVectorBackend {
    collections: BTreeMap<&'static str, Vec<Entry>>,
}

impl MockVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently indexed in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .get(collection.name())
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Generate a deterministic "embedding" from text using hashing.
    /// Returns a vector in range [-1, 1], matching real model dimensions.
    pub fn embed(text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..DIMENSIONS)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect()
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl VectorBackend for MockVectorBackend {
    fn index(
        &mut self,
        collection: Collection,
        id: &str,
        text: &str,
        metadata: &BTreeMap<String, Value>,
    ) -> Result<()> {
        let entries = self.collections.entry(collection.name()).or_default();
        entries.retain(|entry| entry.id != id);
        entries.push(Entry {
            id: id.to_string(),
            vector: Self::embed(text),
            metadata: metadata.clone(),
        });
        Ok(())
    }

    fn query(
        &self,
        collection: Collection,
        text: &str,
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<IndexHit>> {
        let Some(entries) = self.collections.get(collection.name()) else {
            return Ok(Vec::new());
        };

        let needle = Self::embed(text);
        let mut hits: Vec<IndexHit> = entries
            .iter()
            .filter(|entry| filter.is_none_or(|f| f.matches_metadata(&entry.metadata)))
            .map(|entry| IndexHit {
                id: entry.id.clone(),
                distance: euclidean(&needle, &entry.vector),
                metadata: entry.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    fn remove(&mut self, collection: Collection, id: &str) -> Result<bool> {
        let Some(entries) = self.collections.get_mut(collection.name()) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        Ok(entries.len() < before)
    }
}

/// A backend that fails every call. Exercises the paths where the index
/// is down and the durable store must remain authoritative.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingVectorBackend;

impl VectorBackend for FailingVectorBackend {
    fn index(
        &mut self,
        _collection: Collection,
        _id: &str,
        _text: &str,
        _metadata: &BTreeMap<String, Value>,
    ) -> Result<()> {
        Err(EngramError::Index("backend unavailable".to_string()))
    }

    fn query(
        &self,
        _collection: Collection,
        _text: &str,
        _k: usize,
        _filter: Option<&RecordFilter>,
    ) -> Result<Vec<IndexHit>> {
        Err(EngramError::Index("backend unavailable".to_string()))
    }

    fn remove(&mut self, _collection: Collection, _id: &str) -> Result<bool> {
        Err(EngramError::Index("backend unavailable".to_string()))
    }
}
