//! Turn records - single utterances belonging to one episode

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fresh_id;

/// Epistemic stance of an agent turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EpistemicMode {
    Explore,
    Hypothesize,
    #[default]
    Assert,
    Caution,
    Reflect,
}

/// A user's turn in a conversation.
///
/// Stored at `turns/user/{year}/{month}/{turn_id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnUser {
    pub turn_id: String,
    /// Owning episode. Required; a turn belongs to exactly one episode.
    pub episode_id: String,

    #[serde(default = "default_user_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub text_excerpt: String,
    #[serde(default)]
    pub emotion_signal: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub salience_anchor: Vec<String>,
    pub created_at: DateTime<Utc>,
}

fn default_user_speaker() -> String {
    "user".to_string()
}

impl TurnUser {
    pub fn new(episode_id: impl Into<String>, text_excerpt: impl Into<String>) -> Self {
        Self {
            turn_id: fresh_id("tu"),
            episode_id: episode_id.into(),
            speaker: default_user_speaker(),
            username: None,
            user_id: None,
            text_excerpt: text_excerpt.into(),
            emotion_signal: None,
            intent: None,
            salience_anchor: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// The agent's turn in a conversation.
///
/// Stored at `turns/llm/{year}/{month}/{turn_id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnLlm {
    pub turn_id: String,
    /// Owning episode. Required; a turn belongs to exactly one episode.
    pub episode_id: String,

    #[serde(default = "default_llm_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub text_excerpt: String,
    #[serde(default)]
    pub epistemic_mode: EpistemicMode,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

fn default_llm_speaker() -> String {
    "llm".to_string()
}

fn default_confidence() -> f32 {
    0.5
}

impl TurnLlm {
    pub fn new(episode_id: impl Into<String>, text_excerpt: impl Into<String>) -> Self {
        Self {
            turn_id: fresh_id("tl"),
            episode_id: episode_id.into(),
            speaker: default_llm_speaker(),
            text_excerpt: text_excerpt.into(),
            epistemic_mode: EpistemicMode::default(),
            confidence: default_confidence(),
            created_at: Utc::now(),
        }
    }
}
