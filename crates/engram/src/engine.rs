//! Memory engine - the store facade
//!
//! The single entry point other subsystems use. A write is sequenced as:
//! durable store (must succeed), then similarity index (best-effort),
//! then crosslink back-patching (best-effort). Only durable-store errors
//! fail a call; index and crosslink failures are logged and absorbed
//! here, never propagated as a failure of the primary write.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{error, warn};

use crate::config::Config;
use crate::crosslink::CrosslinkManager;
use crate::distiller::{Condenser, Distiller, DistillerConfig};
use crate::error::Result;
use crate::index::{SimilarityIndex, VectorBackend};
use crate::record::Record;
use crate::storage::{FileStore, RecordFilter};

/// The port consumed by upstream subsystems (conversation orchestration,
/// recall tools). Implemented by the full engine and, in degraded form,
/// by the bare durable store.
pub trait MemoryStore {
    /// Persist a record and return its id.
    fn store(&mut self, record: &Record) -> Result<String>;
    /// Fetch the full record for an id.
    fn retrieve(&self, id: &str) -> Result<Record>;
    /// Scan for records matching exact-equality filters.
    fn query(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>>;
    /// Retrieve by meaning; results carry a similarity distance.
    fn semantic_search(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SearchResult>>;
    /// Remove a record. True when anything was removed.
    fn delete(&mut self, id: &str) -> Result<bool>;
    /// Identifies the backing implementation.
    fn storage_type(&self) -> &'static str;
}

/// One semantic-search result with its index distance attached.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Similarity distance from the index; lower is closer.
    pub distance: f32,
    pub payload: SearchPayload,
}

/// What a search hit hydrated into.
#[derive(Debug, Clone)]
pub enum SearchPayload {
    /// The full record, hydrated from the durable store.
    Record(Record),
    /// The record was gone at hydration time; the index metadata carried
    /// at indexing time stands in rather than dropping the hit.
    Metadata {
        id: String,
        fields: BTreeMap<String, Value>,
    },
}

impl SearchResult {
    pub fn id(&self) -> &str {
        match &self.payload {
            SearchPayload::Record(record) => record.id(),
            SearchPayload::Metadata { id, .. } => id,
        }
    }

    /// The hydrated record, when hydration succeeded.
    pub fn record(&self) -> Option<&Record> {
        match &self.payload {
            SearchPayload::Record(record) => Some(record),
            SearchPayload::Metadata { .. } => None,
        }
    }
}

/// Central orchestrator for all memory operations: durable persistence,
/// similarity indexing, and crosslink maintenance behind one interface.
pub struct MemoryEngine {
    files: FileStore,
    index: SimilarityIndex,
    links: CrosslinkManager,
    config: Config,
}

impl MemoryEngine {
    /// Build an engine from configuration and an embedding backend.
    pub fn new(config: Config, backend: Box<dyn VectorBackend>) -> Result<Self> {
        let files = FileStore::new(config.storage.data_dir.clone())?;
        Ok(Self {
            files,
            index: SimilarityIndex::new(backend),
            links: CrosslinkManager::new(),
            config,
        })
    }

    /// Convenience constructor rooting the store at `base_dir` with
    /// defaults for everything else.
    pub fn open(base_dir: impl Into<std::path::PathBuf>, backend: Box<dyn VectorBackend>) -> Result<Self> {
        let mut config = Config::default();
        config.storage.data_dir = base_dir.into();
        Self::new(config, backend)
    }

    /// The underlying durable store.
    pub fn file_store(&self) -> &FileStore {
        &self.files
    }

    /// Build a distiller over this engine's base directory, honoring the
    /// configured fan-in.
    pub fn distiller<'a>(&self, condenser: &'a dyn Condenser) -> Result<Distiller<'a>> {
        Distiller::with_config(
            self.files.base_dir(),
            condenser,
            DistillerConfig {
                fan_in: self.config.distiller.fan_in,
            },
        )
    }
}

impl MemoryStore for MemoryEngine {
    /// Durable write, then best-effort indexing and crosslinking. The id
    /// is returned as soon as the durable write lands, regardless of how
    /// the side channels fare.
    fn store(&mut self, record: &Record) -> Result<String> {
        let id = self.files.store(record)?;

        if let Err(e) = self.index.index_record(record) {
            error!(id, error = %e, "failed to index record");
        }

        match self.links.sync_links(record, &mut self.files) {
            Ok(patched) => {
                // Patched episodes changed on disk; refresh their index
                // entries so metadata stays roughly in step.
                for episode_id in patched {
                    match self.files.retrieve(&episode_id) {
                        Ok(episode) => {
                            if let Err(e) = self.index.index_record(&episode) {
                                warn!(episode = episode_id, error = %e, "failed to re-index patched episode");
                            }
                        }
                        Err(e) => {
                            warn!(episode = episode_id, error = %e, "patched episode unreadable for re-index");
                        }
                    }
                }
            }
            Err(e) => {
                error!(id, error = %e, "failed to sync crosslinks");
            }
        }

        Ok(id)
    }

    fn retrieve(&self, id: &str) -> Result<Record> {
        self.files.retrieve(id)
    }

    fn query(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>> {
        let outcome = self.files.query(filter, limit)?;
        if outcome.corrupt_count > 0 {
            warn!(
                corrupt = outcome.corrupt_count,
                "query excluded corrupt records"
            );
        }
        Ok(outcome.records)
    }

    /// Index query, then hydration from the durable store. Degrades to an
    /// empty result set when the index is down; a hit whose record has
    /// vanished falls back to the index metadata.
    fn semantic_search(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SearchResult>> {
        let hits = self.index.search(text, limit, filter);

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.files.retrieve(&hit.id) {
                Ok(record) => results.push(SearchResult {
                    distance: hit.distance,
                    payload: SearchPayload::Record(record),
                }),
                Err(e) => {
                    warn!(id = hit.id, error = %e, "hydration miss, returning index metadata");
                    results.push(SearchResult {
                        distance: hit.distance,
                        payload: SearchPayload::Metadata {
                            id: hit.id,
                            fields: hit.metadata,
                        },
                    });
                }
            }
        }
        Ok(results)
    }

    /// Delete from both stores; the two are allowed to be transiently
    /// inconsistent, so either side succeeding counts.
    fn delete(&mut self, id: &str) -> Result<bool> {
        let file_removed = match self.files.delete(id) {
            Ok(removed) => removed,
            Err(e) => {
                error!(id, error = %e, "durable delete failed");
                false
            }
        };

        let index_removed = match self.index.remove(id) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(id, error = %e, "index removal failed");
                false
            }
        };

        Ok(file_removed || index_removed)
    }

    fn storage_type(&self) -> &'static str {
        "unified"
    }
}

impl MemoryStore for FileStore {
    fn store(&mut self, record: &Record) -> Result<String> {
        FileStore::store(self, record)
    }

    fn retrieve(&self, id: &str) -> Result<Record> {
        FileStore::retrieve(self, id)
    }

    fn query(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>> {
        Ok(FileStore::query(self, filter, limit)?.records)
    }

    /// The durable layer alone cannot search by meaning.
    fn semantic_search(
        &self,
        _text: &str,
        _limit: usize,
        _filter: Option<&RecordFilter>,
    ) -> Result<Vec<SearchResult>> {
        warn!("semantic search attempted on bare file store, returning empty");
        Ok(Vec::new())
    }

    fn delete(&mut self, id: &str) -> Result<bool> {
        FileStore::delete(self, id)
    }

    fn storage_type(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Episode, Semantic, StructuredSummary};
    use crate::testing::{FailingVectorBackend, MockVectorBackend};

    fn engine(dir: &std::path::Path) -> MemoryEngine {
        MemoryEngine::open(dir.join("memory"), Box::new(MockVectorBackend::new())).unwrap()
    }

    #[test]
    fn storage_types_identify_the_layers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert_eq!(engine.storage_type(), "unified");
        assert_eq!(engine.file_store().storage_type(), "filesystem");
    }

    #[test]
    fn store_succeeds_when_index_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MemoryEngine::open(
            dir.path().join("memory"),
            Box::new(FailingVectorBackend),
        )
        .unwrap();

        let mut episode = Episode::new();
        episode.summary = Some(StructuredSummary::new("indexing will fail"));
        let id = engine.store(&Record::Episode(episode)).unwrap();

        // Durable store is authoritative: the record is retrievable.
        assert_eq!(engine.retrieve(&id).unwrap().id(), id);
    }

    #[test]
    fn search_degrades_to_empty_when_index_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MemoryEngine::open(
            dir.path().join("memory"),
            Box::new(FailingVectorBackend),
        )
        .unwrap();

        let fact = Semantic::new("user", "likes", "rust");
        engine.store(&Record::Semantic(fact)).unwrap();

        let results = engine.semantic_search("user likes rust", 5, None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn bare_file_store_searches_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("memory")).unwrap();
        let results = store.semantic_search("anything", 5, None).unwrap();
        assert!(results.is_empty());
    }
}
