//! Sensory records - perceptual snapshots and qualia

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{fresh_id, push_unique};

/// Subjective sensory experience at the moment of perception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Qualia {
    #[serde(default = "default_color_hex")]
    pub color_hex: String,
    #[serde(default = "default_neutral")]
    pub texture: String,
    #[serde(default)]
    pub soundscape: Option<String>,
    #[serde(default = "default_neutral")]
    pub temperature_feel: String,
    /// 0.0 - 1.0
    #[serde(default = "default_intensity")]
    pub intensity: f32,
}

fn default_color_hex() -> String {
    "#808080".to_string()
}

fn default_neutral() -> String {
    "neutral".to_string()
}

fn default_intensity() -> f32 {
    0.5
}

impl Default for Qualia {
    fn default() -> Self {
        Self {
            color_hex: default_color_hex(),
            texture: default_neutral(),
            soundscape: None,
            temperature_feel: default_neutral(),
            intensity: default_intensity(),
        }
    }
}

/// A perceptual memory record: what was perceived and how it felt.
///
/// Stored at `turns/sensory/{year}/{month}/{sensory_id}.json`. The forward
/// link to the owning episode is set here; the reverse link in the episode's
/// `sensory_refs` is back-patched by the crosslink manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sensory {
    pub sensory_id: String,
    /// Episode in which this was perceived. Required.
    pub episode_id: String,

    /// image, audio, visual_pattern, text_visual, ...
    pub data_type: String,
    /// URI or relative path to the raw asset
    #[serde(default)]
    pub raw_data_ref: Option<String>,

    #[serde(default)]
    pub qualia: Option<Qualia>,
    #[serde(default)]
    pub extracted_features: BTreeMap<String, Value>,

    /// Links to semantic facts this perception evidences
    #[serde(default)]
    pub concept_refs: Vec<String>,

    /// Biological state at the time of perception
    #[serde(default)]
    pub physio_snapshot: BTreeMap<String, Value>,

    pub created_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "perception".to_string()
}

impl Sensory {
    pub fn new(episode_id: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            sensory_id: fresh_id("sn"),
            episode_id: episode_id.into(),
            data_type: data_type.into(),
            raw_data_ref: None,
            qualia: None,
            extracted_features: BTreeMap::new(),
            concept_refs: Vec::new(),
            physio_snapshot: BTreeMap::new(),
            created_at: Utc::now(),
            source: default_source(),
        }
    }

    /// Record a link to a semantic fact. Returns true when newly added.
    pub fn add_concept_ref(&mut self, semantic_id: &str) -> bool {
        push_unique(&mut self.concept_refs, semantic_id)
    }
}
