//! Data models for the training catalog

use serde::{Deserialize, Serialize};

/// A trainable conversational concept
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    /// Stable slug, used as the schedule key
    pub id: String,
    pub label: String,
    /// Domain label (calibration, framing, storytelling, boundaries)
    pub domain: String,
    /// One-paragraph teaching summary
    pub summary: String,
    /// The fixed recall question asked during the retrieval check
    pub recall_question: String,
}

/// A roleplay counterpart the user trains against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub label: String,
    pub description: String,
    /// 1 (forgiving) to 5 (hostile)
    pub difficulty: i32,
}
