//! Record schemas for the Engram store
//!
//! Defines the closed set of record kinds persisted by the durable store.
//! Every record serializes as a single JSON object carrying a `type`
//! discriminant; decoding rejects unknown fields and missing required
//! fields so that on-disk corruption is detected rather than papered over.

mod episode;
mod semantic;
mod sensory;
mod turn;

pub use episode::{Episode, SituationContext, StructuredSummary};
pub use semantic::Semantic;
pub use sensory::{Qualia, Sensory};
pub use turn::{EpistemicMode, TurnLlm, TurnUser};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored memory record, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Record {
    /// Autobiographical metadata for one conversational unit
    #[serde(rename = "episodic_v3")]
    Episode(Episode),
    /// One user utterance
    #[serde(rename = "turn_user")]
    TurnUser(TurnUser),
    /// One agent utterance
    #[serde(rename = "turn_llm")]
    TurnLlm(TurnLlm),
    /// A perceptual snapshot tied to one episode
    #[serde(rename = "sensory_v1")]
    Sensory(Sensory),
    /// A subject-predicate-object fact
    #[serde(rename = "semantic")]
    Semantic(Semantic),
}

impl Record {
    /// The record's stable identifier.
    pub fn id(&self) -> &str {
        match self {
            Record::Episode(e) => &e.episode_id,
            Record::TurnUser(t) => &t.turn_id,
            Record::TurnLlm(t) => &t.turn_id,
            Record::Sensory(s) => &s.sensory_id,
            Record::Semantic(s) => &s.id,
        }
    }

    /// The record's kind discriminant.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Episode(_) => RecordKind::Episode,
            Record::TurnUser(_) => RecordKind::TurnUser,
            Record::TurnLlm(_) => RecordKind::TurnLlm,
            Record::Sensory(_) => RecordKind::Sensory,
            Record::Semantic(_) => RecordKind::Semantic,
        }
    }

    /// Creation timestamp used for date-based path derivation.
    /// Semantic facts use their `learned_at` stamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Record::Episode(e) => e.created_at,
            Record::TurnUser(t) => t.created_at,
            Record::TurnLlm(t) => t.created_at,
            Record::Sensory(s) => s.created_at,
            Record::Semantic(s) => s.learned_at,
        }
    }
}

/// Kind discriminant for the closed record union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Episode,
    TurnUser,
    TurnLlm,
    Sensory,
    Semantic,
}

impl RecordKind {
    /// The on-disk `type` discriminant. This string is a persisted contract.
    pub fn discriminant(self) -> &'static str {
        match self {
            RecordKind::Episode => "episodic_v3",
            RecordKind::TurnUser => "turn_user",
            RecordKind::TurnLlm => "turn_llm",
            RecordKind::Sensory => "sensory_v1",
            RecordKind::Semantic => "semantic",
        }
    }

    /// Parse a kind from either the full discriminant or its short alias
    /// (`episodic`, `sensory`). Query filters accept both forms.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "episodic" | "episodic_v3" | "episode" => Some(RecordKind::Episode),
            "turn_user" => Some(RecordKind::TurnUser),
            "turn_llm" => Some(RecordKind::TurnLlm),
            "sensory" | "sensory_v1" => Some(RecordKind::Sensory),
            "semantic" => Some(RecordKind::Semantic),
            _ => None,
        }
    }
}

/// Generate a fresh record id: `{prefix}_{8 hex chars}`.
///
/// Ids are assigned once at creation and never reused.
pub(crate) fn fresh_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

/// Append `id` to `refs` unless already present. Returns true when appended.
///
/// Reference fields are sets: one entry per distinct target.
pub(crate) fn push_unique(refs: &mut Vec<String>, id: &str) -> bool {
    if refs.iter().any(|r| r == id) {
        false
    } else {
        refs.push(id.to_string());
        true
    }
}
