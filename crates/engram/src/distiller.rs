//! Tiered distillation - the 8-8-8 protocol
//!
//! Raw session snapshots compact into core narratives, and core
//! narratives into sphere wisdom, under a fixed fan-in: once a tier
//! holds 8 pending units, the oldest 8 are condensed into one unit of
//! the next tier. Partial tiers are left untouched indefinitely.
//!
//! Compaction is additive: consumed units are only marked, never
//! deleted, so raw history stays retrievable. Triggering is explicit -
//! callers invoke [`Distiller::run_once`] when a session completes, and
//! at most one batch per tier is produced per invocation; draining a
//! large backlog takes repeated calls.
//!
//! Precondition: a single in-process caller. Sequential unit ids are
//! assigned by scanning the tier directory; concurrent invocations must
//! be serialized or ids can collide.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngramError, Result};

/// The externally supplied content-reduction operation. Given the
/// concatenated content of a batch, it produces the condensed text for
/// the unit one tier up.
pub trait Condenser {
    fn condense(&self, combined: &str) -> Result<String>;
}

/// A sentence-extracting condenser: keeps the first N sentences of the
/// combined content, falling back to a character truncation when no
/// sentence boundary is found. A stand-in for an LLM-backed condenser.
#[derive(Debug, Clone)]
pub struct ExtractiveCondenser {
    pub max_sentences: usize,
}

impl Default for ExtractiveCondenser {
    fn default() -> Self {
        Self { max_sentences: 3 }
    }
}

impl Condenser for ExtractiveCondenser {
    fn condense(&self, combined: &str) -> Result<String> {
        let sentences: Vec<&str> = if combined.contains(['.', '!', '?']) {
            combined
                .split(|c| c == '.' || c == '!' || c == '?')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .take(self.max_sentences)
                .collect()
        } else {
            Vec::new()
        };

        if sentences.is_empty() {
            let truncated: String = combined.chars().take(200).collect();
            if truncated.chars().count() < combined.chars().count() {
                Ok(format!("{truncated}..."))
            } else {
                Ok(truncated)
            }
        } else {
            Ok(sentences.join(". ") + ".")
        }
    }
}

/// A raw snapshot of one completed conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionUnit {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub consumed: bool,
}

/// A narrative distilled from exactly `fan_in` session units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreUnit {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub narrative: String,
    pub source_sessions: Vec<String>,
    #[serde(default)]
    pub consumed: bool,
}

/// Wisdom distilled from exactly `fan_in` core units. The terminal tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SphereUnit {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub wisdom: String,
    pub source_cores: Vec<String>,
}

/// Fan-in threshold configuration.
#[derive(Debug, Clone)]
pub struct DistillerConfig {
    /// Units consumed per compaction batch at every tier
    pub fan_in: usize,
}

impl Default for DistillerConfig {
    fn default() -> Self {
        Self { fan_in: 8 }
    }
}

/// What one invocation produced.
#[derive(Debug, Clone, Default)]
pub struct DistillOutcome {
    pub core_id: Option<String>,
    pub sphere_id: Option<String>,
}

/// Runs the tiered compaction pipeline over unit files stored beside the
/// record subtrees.
pub struct Distiller<'a> {
    session_dir: PathBuf,
    core_dir: PathBuf,
    sphere_dir: PathBuf,
    condenser: &'a dyn Condenser,
    config: DistillerConfig,
}

impl<'a> Distiller<'a> {
    /// Create a distiller over `base_dir` with the default fan-in.
    pub fn new(base_dir: impl AsRef<Path>, condenser: &'a dyn Condenser) -> Result<Self> {
        Self::with_config(base_dir, condenser, DistillerConfig::default())
    }

    pub fn with_config(
        base_dir: impl AsRef<Path>,
        condenser: &'a dyn Condenser,
        config: DistillerConfig,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let distiller = Self {
            session_dir: base_dir.join("session_memory"),
            core_dir: base_dir.join("core_memory"),
            sphere_dir: base_dir.join("sphere_memory"),
            condenser,
            config,
        };
        fs::create_dir_all(&distiller.session_dir)?;
        fs::create_dir_all(&distiller.core_dir)?;
        fs::create_dir_all(&distiller.sphere_dir)?;
        Ok(distiller)
    }

    pub fn config(&self) -> &DistillerConfig {
        &self.config
    }

    /// Append a session snapshot with the next sequential id.
    pub fn record_session(&self, content: &str) -> Result<SessionUnit> {
        let unit = SessionUnit {
            id: self.next_id(&self.session_dir, "session")?,
            created_at: Utc::now(),
            content: content.to_string(),
            consumed: false,
        };
        write_unit(&self.session_dir, &unit.id, &unit)?;
        debug!(session = unit.id, "recorded session unit");
        Ok(unit)
    }

    /// All session units, oldest first, including consumed ones.
    pub fn sessions(&self) -> Result<Vec<SessionUnit>> {
        let mut units: Vec<SessionUnit> = load_units(&self.session_dir)?;
        units.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(units)
    }

    /// Session units not yet consumed by a core distillation, oldest first.
    pub fn pending_sessions(&self) -> Result<Vec<SessionUnit>> {
        Ok(self
            .sessions()?
            .into_iter()
            .filter(|unit| !unit.consumed)
            .collect())
    }

    /// All core units, oldest first, including consumed ones.
    pub fn cores(&self) -> Result<Vec<CoreUnit>> {
        let mut units: Vec<CoreUnit> = load_units(&self.core_dir)?;
        units.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(units)
    }

    /// Core units not yet consumed by a sphere distillation, oldest first.
    pub fn pending_cores(&self) -> Result<Vec<CoreUnit>> {
        Ok(self
            .cores()?
            .into_iter()
            .filter(|unit| !unit.consumed)
            .collect())
    }

    /// All sphere units, oldest first.
    pub fn spheres(&self) -> Result<Vec<SphereUnit>> {
        let mut units: Vec<SphereUnit> = load_units(&self.sphere_dir)?;
        units.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(units)
    }

    /// Check both tier thresholds and compact at most one batch per tier.
    pub fn run_once(&self) -> Result<DistillOutcome> {
        let core_id = self.distill_sessions()?;
        let sphere_id = self.distill_cores()?;
        Ok(DistillOutcome { core_id, sphere_id })
    }

    /// Session -> Core, when at least `fan_in` sessions are pending.
    fn distill_sessions(&self) -> Result<Option<String>> {
        let pending = self.pending_sessions()?;
        if pending.len() < self.config.fan_in {
            return Ok(None);
        }

        let batch = &pending[..self.config.fan_in];
        let combined = batch
            .iter()
            .map(|unit| unit.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let narrative = self.condenser.condense(&combined)?;

        let core = CoreUnit {
            id: self.next_id(&self.core_dir, "core")?,
            created_at: Utc::now(),
            narrative,
            source_sessions: batch.iter().map(|unit| unit.id.clone()).collect(),
            consumed: false,
        };
        write_unit(&self.core_dir, &core.id, &core)?;

        for unit in batch {
            let mut consumed = unit.clone();
            consumed.consumed = true;
            write_unit(&self.session_dir, &consumed.id, &consumed)?;
        }

        info!(
            core = core.id,
            sessions = self.config.fan_in,
            "distilled sessions into core unit"
        );
        Ok(Some(core.id))
    }

    /// Core -> Sphere, when at least `fan_in` cores are pending.
    fn distill_cores(&self) -> Result<Option<String>> {
        let pending = self.pending_cores()?;
        if pending.len() < self.config.fan_in {
            return Ok(None);
        }

        let batch = &pending[..self.config.fan_in];
        let combined = batch
            .iter()
            .map(|unit| unit.narrative.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let wisdom = self.condenser.condense(&combined)?;

        let sphere = SphereUnit {
            id: self.next_id(&self.sphere_dir, "sphere")?,
            created_at: Utc::now(),
            wisdom,
            source_cores: batch.iter().map(|unit| unit.id.clone()).collect(),
        };
        write_unit(&self.sphere_dir, &sphere.id, &sphere)?;

        for unit in batch {
            let mut consumed = unit.clone();
            consumed.consumed = true;
            write_unit(&self.core_dir, &consumed.id, &consumed)?;
        }

        info!(
            sphere = sphere.id,
            cores = self.config.fan_in,
            "distilled cores into sphere unit"
        );
        Ok(Some(sphere.id))
    }

    /// Next sequential id scoped to a tier directory: `{prefix}_{n+1:03}`.
    /// Consumed units still occupy their numbers; ids are never reused.
    fn next_id(&self, dir: &Path, prefix: &str) -> Result<String> {
        let mut max = 0u32;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Some(number) = stem
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('_'))
                .and_then(|digits| digits.parse::<u32>().ok())
            {
                max = max.max(number);
            }
        }
        Ok(format!("{prefix}_{:03}", max + 1))
    }
}

fn write_unit<T: Serialize>(dir: &Path, id: &str, unit: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(unit)
        .map_err(|e| EngramError::Serialization(e.to_string()))?;
    fs::write(dir.join(format!("{id}.json")), json)?;
    Ok(())
}

/// Load every unit file in a tier directory. A corrupt unit is an error:
/// silently skipping one would skew the fan-in count.
fn load_units<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut units = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let raw = fs::read_to_string(&path)?;
        let unit = serde_json::from_str(&raw).map_err(|e| EngramError::CorruptRecord {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        units.push(unit);
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, ExtractiveCondenser) {
        (tempfile::tempdir().unwrap(), ExtractiveCondenser::default())
    }

    mod condenser {
        use super::*;

        #[test]
        fn keeps_first_sentences() {
            let condenser = ExtractiveCondenser { max_sentences: 2 };
            let combined = "First thing happened. Second thing followed. Third got dropped.";
            let out = condenser.condense(combined).unwrap();
            assert_eq!(out, "First thing happened. Second thing followed.");
        }

        #[test]
        fn truncates_when_no_sentence_boundary() {
            let condenser = ExtractiveCondenser::default();
            let combined = "";
            assert_eq!(condenser.condense(combined).unwrap(), "");

            let long = "x".repeat(300);
            let out = condenser.condense(&long).unwrap();
            assert!(out.ends_with("..."));
            assert_eq!(out.chars().count(), 203);
        }
    }

    mod ids {
        use super::*;

        #[test]
        fn sequential_ids_scoped_per_tier() {
            let (dir, condenser) = setup();
            let distiller = Distiller::new(dir.path(), &condenser).unwrap();

            let first = distiller.record_session("one").unwrap();
            let second = distiller.record_session("two").unwrap();
            assert_eq!(first.id, "session_001");
            assert_eq!(second.id, "session_002");
        }
    }

    mod pending {
        use super::*;

        #[test]
        fn pending_excludes_consumed_and_sorts_oldest_first() {
            let (dir, condenser) = setup();
            let config = DistillerConfig { fan_in: 2 };
            let distiller = Distiller::with_config(dir.path(), &condenser, config).unwrap();

            distiller.record_session("first session.").unwrap();
            distiller.record_session("second session.").unwrap();
            distiller.record_session("third session.").unwrap();

            let outcome = distiller.run_once().unwrap();
            assert!(outcome.core_id.is_some());

            let pending = distiller.pending_sessions().unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, "session_003");

            // Raw history remains on disk.
            assert_eq!(distiller.sessions().unwrap().len(), 3);
        }
    }

    mod distillation {
        use super::*;

        #[test]
        fn below_threshold_produces_nothing() {
            let (dir, condenser) = setup();
            let distiller = Distiller::new(dir.path(), &condenser).unwrap();

            for i in 0..7 {
                distiller.record_session(&format!("session {i}.")).unwrap();
            }
            let outcome = distiller.run_once().unwrap();
            assert!(outcome.core_id.is_none());
            assert!(outcome.sphere_id.is_none());
        }

        #[test]
        fn core_records_its_sources() {
            let (dir, condenser) = setup();
            let config = DistillerConfig { fan_in: 2 };
            let distiller = Distiller::with_config(dir.path(), &condenser, config).unwrap();

            distiller.record_session("alpha happened.").unwrap();
            distiller.record_session("beta happened.").unwrap();

            let outcome = distiller.run_once().unwrap();
            let core_id = outcome.core_id.unwrap();
            assert_eq!(core_id, "core_001");

            let cores = distiller.cores().unwrap();
            assert_eq!(cores.len(), 1);
            assert_eq!(cores[0].source_sessions, vec!["session_001", "session_002"]);
            assert!(cores[0].narrative.contains("alpha happened"));
        }

        #[test]
        fn corrupt_unit_file_is_an_error() {
            let (dir, condenser) = setup();
            let distiller = Distiller::new(dir.path(), &condenser).unwrap();
            distiller.record_session("fine.").unwrap();

            fs::write(
                dir.path().join("session_memory").join("session_bad.json"),
                "{ nope",
            )
            .unwrap();

            let err = distiller.pending_sessions().unwrap_err();
            assert!(matches!(err, EngramError::CorruptRecord { .. }));
        }
    }
}
