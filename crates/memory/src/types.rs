//! Record types for the observation memory.

use serde::{Deserialize, Serialize};

/// What kind of memory a record is. Closed set; unknown strings normalize
/// to [`MemoryKind::Observation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Observation,
    Conversation,
    Feeling,
    Curiosity,
    SelfModel,
}

impl MemoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Observation => "observation",
            MemoryKind::Conversation => "conversation",
            MemoryKind::Feeling => "feeling",
            MemoryKind::Curiosity => "curiosity",
            MemoryKind::SelfModel => "self_model",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "conversation" => MemoryKind::Conversation,
            "feeling" => MemoryKind::Feeling,
            "curiosity" => MemoryKind::Curiosity,
            "self_model" => MemoryKind::SelfModel,
            _ => MemoryKind::Observation,
        }
    }
}

/// Emotion label attached to a record. Closed set; unknown strings normalize
/// to [`Emotion::Neutral`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Curious,
    Excited,
    Moved,
}

impl Emotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Curious => "curious",
            Emotion::Excited => "excited",
            Emotion::Moved => "moved",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "curious" => Emotion::Curious,
            "excited" => Emotion::Excited,
            "moved" => Emotion::Moved,
            _ => Emotion::Neutral,
        }
    }
}

/// One remembered record, as returned by recall operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    /// ISO-8601 wall time of the save.
    pub timestamp: String,
    /// `YYYY-MM-DD`, denormalized for display.
    pub date: String,
    /// `HH:MM`, denormalized for display.
    pub time: String,
    /// Spatial context label (e.g. which way the camera was facing).
    pub direction: String,
    pub kind: MemoryKind,
    pub emotion: Emotion,
    /// Base64 JPEG thumbnail, when the record was saved with an image.
    pub image_data: Option<String>,
    /// Cosine similarity against the recall query; only present on the
    /// vector-search path.
    pub score: Option<f32>,
}
