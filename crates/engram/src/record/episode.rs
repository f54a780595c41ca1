//! Episodic records - autobiographical metadata
//!
//! An episode is a lightweight container: turn, sensory, and semantic
//! content live in their own records and are referenced by id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{fresh_id, push_unique};

/// Context of the interaction an episode took place in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SituationContext {
    pub context_id: String,
    /// small_talk, deep_discussion, ...
    pub interaction_mode: String,
    /// low, medium, high
    pub stakes_level: String,
    /// low, medium, high
    pub time_pressure: String,
    /// local_dev, mobile_ssh, cloud_prod, ...
    #[serde(default)]
    pub location_context: Option<String>,
    #[serde(default)]
    pub domain_area: Option<String>,
    /// Macro goal, e.g. "Apply for job"
    #[serde(default)]
    pub mission_goal: Option<String>,
    /// "Senior Dev", "Friend", ...
    #[serde(default)]
    pub agent_role: Option<String>,
}

/// Structured summary of an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredSummary {
    pub content: String,
    #[serde(default)]
    pub action_taken: String,
    #[serde(default)]
    pub key_outcome: String,
    #[serde(default)]
    pub future_implication: String,
}

impl StructuredSummary {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            action_taken: String::new(),
            key_outcome: String::new(),
            future_implication: String::new(),
        }
    }
}

/// An autobiographical memory record.
///
/// Stored at `episodes/{year}/{month}/{episode_id}.json`. The reference
/// lists are sets: each target id appears at most once. `turn_refs` is
/// populated by the episode's creator; `sensory_refs` and `semantic_refs`
/// are back-patched by the crosslink manager and converge once it has run
/// for every referencing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Episode {
    pub episode_id: String,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,

    #[serde(default)]
    pub turn_refs: Vec<String>,
    #[serde(default)]
    pub sensory_refs: Vec<String>,
    #[serde(default)]
    pub semantic_refs: Vec<String>,

    #[serde(default)]
    pub situation_context: Option<SituationContext>,
    #[serde(default)]
    pub summary: Option<StructuredSummary>,
    #[serde(default)]
    pub state_snapshot: BTreeMap<String, Value>,

    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub cues: Vec<String>,
}

impl Episode {
    /// Create an empty episode with a fresh id.
    pub fn new() -> Self {
        Self {
            episode_id: fresh_id("ep"),
            created_at: Utc::now(),
            persona_id: None,
            user_id: None,
            session_id: None,
            event_id: None,
            turn_refs: Vec::new(),
            sensory_refs: Vec::new(),
            semantic_refs: Vec::new(),
            situation_context: None,
            summary: None,
            state_snapshot: BTreeMap::new(),
            tags: Vec::new(),
            cues: Vec::new(),
        }
    }

    /// Record a turn reference. Returns true when newly added.
    pub fn add_turn_ref(&mut self, turn_id: &str) -> bool {
        push_unique(&mut self.turn_refs, turn_id)
    }

    /// Record a sensory reference. Returns true when newly added.
    pub fn add_sensory_ref(&mut self, sensory_id: &str) -> bool {
        push_unique(&mut self.sensory_refs, sensory_id)
    }

    /// Record a semantic reference. Returns true when newly added.
    pub fn add_semantic_ref(&mut self, semantic_id: &str) -> bool {
        push_unique(&mut self.semantic_refs, semantic_id)
    }

    /// Text embedded for similarity search: summary content plus the action
    /// and outcome fields. None when there is nothing to embed.
    pub fn embeddable_text(&self) -> Option<String> {
        let summary = self.summary.as_ref()?;
        let text = format!(
            "{} {} {}",
            summary.content, summary.action_taken, summary.key_outcome
        );
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl Default for Episode {
    fn default() -> Self {
        Self::new()
    }
}
