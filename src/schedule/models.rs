//! Data models for the review schedule

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum ease factor allowed
pub const MIN_EASE_FACTOR: f32 = 1.3;

/// Maximum ease factor allowed
pub const MAX_EASE_FACTOR: f32 = 5.0;

/// Seed ease factor for a concept's first practice
pub const SEED_EASE_FACTOR: f32 = 2.5;

/// Review state for one concept, created on first practice and updated on
/// every practice after that. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewScheduleEntry {
    pub concept_id: String,
    pub last_practiced: NaiveDate,
    /// SM-2 style multiplier controlling interval growth
    #[serde(default = "default_ease_factor")]
    pub ease_factor: f32,
    /// Current interval in days
    pub interval: i64,
    /// Always last_practiced + interval; stored for the status surface but
    /// re-derived on every update so the two can never drift apart
    pub next_review: NaiveDate,
    #[serde(default)]
    pub practice_count: u32,
    /// Mean session score of the most recent practice
    pub last_average: f32,
}

fn default_ease_factor() -> f32 {
    SEED_EASE_FACTOR
}

impl ReviewScheduleEntry {
    /// Check if the concept is due for review
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review <= today
    }

    /// Mastery is a reporting classification only; it never affects scheduling
    pub fn is_mastered(&self) -> bool {
        self.ease_factor >= 3.5 && self.practice_count >= 3
    }
}

/// Aggregate counts for the status surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub tracked_concepts: usize,
    pub due_count: usize,
    pub mastered_count: usize,
}
