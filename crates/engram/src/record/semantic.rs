//! Semantic records - subject-predicate-object facts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{fresh_id, push_unique};

/// A learned fact: "what I know" rather than "what happened".
///
/// Stored at `semantic/{2-char subject bucket}/{id}.json`. The forward
/// links in `episode_refs` name the episodes that evidence this fact; the
/// reverse links in each episode's `semantic_refs` are back-patched by the
/// crosslink manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Semantic {
    pub id: String,
    /// What or who this fact is about
    pub subject: String,
    /// The relationship or property
    pub predicate: String,
    /// The value or target
    pub object: String,

    /// How certain we are, 0.0 - 1.0
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_source")]
    pub source: String,

    pub learned_at: DateTime<Utc>,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_count: u32,

    /// Episodes in which this fact was learned or reinforced
    #[serde(default)]
    pub episode_refs: Vec<String>,
}

fn default_confidence() -> f32 {
    0.8
}

fn default_source() -> String {
    "conversation".to_string()
}

impl Semantic {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            id: fresh_id("sem"),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence: default_confidence(),
            source: default_source(),
            learned_at: Utc::now(),
            last_accessed: None,
            access_count: 0,
            episode_refs: Vec::new(),
        }
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    /// Link an evidencing episode. Returns true when newly added.
    pub fn add_episode_ref(&mut self, episode_id: &str) -> bool {
        push_unique(&mut self.episode_refs, episode_id)
    }

    /// Mark this fact as recalled, updating access stats.
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Some(Utc::now());
    }

    /// The fact formatted as a sentence, which is also the text embedded
    /// for similarity search.
    pub fn as_triple(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults() {
        let fact = Semantic::new("user", "likes", "rust");
        assert!(fact.id.starts_with("sem_"));
        assert_eq!(fact.confidence, 0.8);
        assert_eq!(fact.source, "conversation");
        assert_eq!(fact.access_count, 0);
        assert!(fact.last_accessed.is_none());
    }

    #[test]
    fn as_triple_formats_sentence() {
        let fact = Semantic::new("user", "prefers", "dark mode");
        assert_eq!(fact.as_triple(), "user prefers dark mode");
    }

    #[test]
    fn mark_accessed_updates_stats() {
        let mut fact = Semantic::new("user", "likes", "rust");
        fact.mark_accessed();
        fact.mark_accessed();
        assert_eq!(fact.access_count, 2);
        assert!(fact.last_accessed.is_some());
    }

    #[test]
    fn confidence_clamps() {
        let mut fact = Semantic::new("a", "b", "c");
        fact.set_confidence(1.7);
        assert_eq!(fact.confidence, 1.0);
        fact.set_confidence(-0.3);
        assert_eq!(fact.confidence, 0.0);
    }

    #[test]
    fn episode_refs_are_sets() {
        let mut fact = Semantic::new("a", "b", "c");
        assert!(fact.add_episode_ref("ep_1"));
        assert!(!fact.add_episode_ref("ep_1"));
        assert_eq!(fact.episode_refs.len(), 1);
    }
}
