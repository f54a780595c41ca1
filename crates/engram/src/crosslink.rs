//! Crosslink manager - bidirectional integrity between record kinds
//!
//! Forward references (a sensory record's `episode_id`, a semantic fact's
//! `episode_refs`) are set by the record's creator. This module patches
//! the reverse side into the referenced episode after every successful
//! durable write, idempotently.
//!
//! Back-patching is best-effort enrichment, not a correctness gate: a
//! missing target is logged and skipped, and the episode's reference
//! lists converge once the manager has run for every referencing record.
//!
//! Precondition: a single in-process writer. The read-modify-write on the
//! target episode is not atomic; concurrent writers must serialize
//! back-patches per target episode id (a per-id mutex or a retry loop)
//! or updates can be lost.

use tracing::{debug, warn};

use crate::error::{EngramError, Result};
use crate::record::{Episode, Record, Semantic, Sensory};
use crate::storage::FileStore;

/// Synchronizes reverse references after durable writes.
#[derive(Debug, Default)]
pub struct CrosslinkManager;

impl CrosslinkManager {
    pub fn new() -> Self {
        Self
    }

    /// Inspect a freshly stored record and patch the reverse side of any
    /// links it declares. Returns the ids of episodes that were re-stored
    /// so the caller can refresh their index entries; each patched episode
    /// appears at most once.
    ///
    /// Idempotent: running twice for the same record changes nothing the
    /// second time.
    pub fn sync_links(&self, record: &Record, store: &mut FileStore) -> Result<Vec<String>> {
        match record {
            Record::Sensory(sensory) => self.link_sensory(sensory, store),
            Record::Semantic(fact) => self.link_semantic(fact, store),
            // Turns are leaf references owned by their episode's
            // turn_refs, populated by the creator. Episodes declare no
            // outbound links of their own.
            Record::Episode(_) | Record::TurnUser(_) | Record::TurnLlm(_) => Ok(Vec::new()),
        }
    }

    /// Sensory (`episode_id`) -> Episode (`sensory_refs`)
    fn link_sensory(&self, sensory: &Sensory, store: &mut FileStore) -> Result<Vec<String>> {
        let mut episode = match fetch_episode(store, &sensory.episode_id) {
            Ok(episode) => episode,
            Err(EngramError::CrosslinkTargetMissing(missing)) => {
                warn!(missing, sensory = sensory.sensory_id, "crosslink target missing, skipped");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if !episode.add_sensory_ref(&sensory.sensory_id) {
            return Ok(Vec::new());
        }
        let episode_id = episode.episode_id.clone();
        store.store(&Record::Episode(episode))?;
        debug!(
            sensory = sensory.sensory_id,
            episode = episode_id,
            "back-linked sensory record"
        );
        Ok(vec![episode_id])
    }

    /// Semantic (`episode_refs`) -> each Episode (`semantic_refs`)
    fn link_semantic(&self, fact: &Semantic, store: &mut FileStore) -> Result<Vec<String>> {
        let mut patched = Vec::new();
        for episode_id in &fact.episode_refs {
            let mut episode = match fetch_episode(store, episode_id) {
                Ok(episode) => episode,
                Err(EngramError::CrosslinkTargetMissing(missing)) => {
                    warn!(missing, fact = fact.id, "crosslink target missing, skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !episode.add_semantic_ref(&fact.id) {
                continue;
            }
            store.store(&Record::Episode(episode))?;
            debug!(
                fact = fact.id,
                episode = episode_id,
                "back-linked semantic fact"
            );
            patched.push(episode_id.clone());
        }
        Ok(patched)
    }
}

/// Resolve a back-patch target to an episode. A miss or a kind mismatch
/// is a `CrosslinkTargetMissing`, which `sync_links` absorbs.
fn fetch_episode(store: &FileStore, episode_id: &str) -> Result<Episode> {
    match store.retrieve(episode_id) {
        Ok(Record::Episode(episode)) => Ok(episode),
        Ok(other) => Err(EngramError::CrosslinkTargetMissing(format!(
            "{episode_id} is a {} record, not an episode",
            other.kind().discriminant()
        ))),
        Err(e) if e.is_not_found() => {
            Err(EngramError::CrosslinkTargetMissing(episode_id.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("memory")).unwrap();
        (dir, store)
    }

    fn stored_episode(store: &mut FileStore) -> String {
        let episode = Episode::new();
        store.store(&Record::Episode(episode)).unwrap()
    }

    #[test]
    fn sensory_back_patches_owning_episode() {
        let (_dir, mut store) = store();
        let episode_id = stored_episode(&mut store);

        let sensory = Sensory::new(episode_id.clone(), "image");
        let sensory_id = sensory.sensory_id.clone();
        store.store(&Record::Sensory(sensory.clone())).unwrap();

        let links = CrosslinkManager::new();
        let patched = links
            .sync_links(&Record::Sensory(sensory), &mut store)
            .unwrap();
        assert_eq!(patched, vec![episode_id.clone()]);

        let Record::Episode(episode) = store.retrieve(&episode_id).unwrap() else {
            panic!("expected episode");
        };
        assert!(episode.sensory_refs.contains(&sensory_id));
    }

    #[test]
    fn sync_is_idempotent() {
        let (_dir, mut store) = store();
        let episode_id = stored_episode(&mut store);

        let sensory = Sensory::new(episode_id.clone(), "audio");
        store.store(&Record::Sensory(sensory.clone())).unwrap();

        let links = CrosslinkManager::new();
        let record = Record::Sensory(sensory);
        links.sync_links(&record, &mut store).unwrap();
        let second = links.sync_links(&record, &mut store).unwrap();
        assert!(second.is_empty());

        let Record::Episode(episode) = store.retrieve(&episode_id).unwrap() else {
            panic!("expected episode");
        };
        assert_eq!(episode.sensory_refs.len(), 1);
    }

    #[test]
    fn semantic_back_patches_every_referenced_episode() {
        let (_dir, mut store) = store();
        let first = stored_episode(&mut store);
        let second = stored_episode(&mut store);

        let mut fact = Semantic::new("user", "likes", "rust");
        fact.add_episode_ref(&first);
        fact.add_episode_ref(&second);
        store.store(&Record::Semantic(fact.clone())).unwrap();

        let links = CrosslinkManager::new();
        let patched = links
            .sync_links(&Record::Semantic(fact.clone()), &mut store)
            .unwrap();
        assert_eq!(patched.len(), 2);

        for episode_id in [&first, &second] {
            let Record::Episode(episode) = store.retrieve(episode_id).unwrap() else {
                panic!("expected episode");
            };
            assert!(episode.semantic_refs.contains(&fact.id));
        }
    }

    #[test]
    fn missing_target_is_skipped_not_fatal() {
        let (_dir, mut store) = store();

        let sensory = Sensory::new("ep_nowhere", "image");
        let links = CrosslinkManager::new();
        let patched = links
            .sync_links(&Record::Sensory(sensory), &mut store)
            .unwrap();
        assert!(patched.is_empty());
    }

    #[test]
    fn wrong_kind_target_is_skipped() {
        let (_dir, mut store) = store();
        let turn = crate::record::TurnUser::new("ep_1", "hello");
        let turn_id = store.store(&Record::TurnUser(turn)).unwrap();

        let sensory = Sensory::new(turn_id, "image");
        let links = CrosslinkManager::new();
        let patched = links
            .sync_links(&Record::Sensory(sensory), &mut store)
            .unwrap();
        assert!(patched.is_empty());
    }

    #[test]
    fn turns_and_episodes_trigger_no_patching() {
        let (_dir, mut store) = store();
        let links = CrosslinkManager::new();

        let episode = Episode::new();
        assert!(
            links
                .sync_links(&Record::Episode(episode), &mut store)
                .unwrap()
                .is_empty()
        );

        let turn = crate::record::TurnLlm::new("ep_1", "hi");
        assert!(
            links
                .sync_links(&Record::TurnLlm(turn), &mut store)
                .unwrap()
                .is_empty()
        );
    }
}
