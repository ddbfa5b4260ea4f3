//! Data models for the session ledger

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The five scored dimensions of a completed session, each 1-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScores {
    pub technique_application: i32,
    pub tactical_awareness: i32,
    pub frame_control: i32,
    pub emotional_regulation: i32,
    pub strategic_outcome: i32,
}

impl SessionScores {
    /// A flat score set with every dimension at the same value
    pub fn uniform(value: i32) -> Self {
        let v = value.clamp(1, 5);
        Self {
            technique_application: v,
            tactical_awareness: v,
            frame_control: v,
            emotional_regulation: v,
            strategic_outcome: v,
        }
    }

    /// Mean of the five dimensions
    pub fn average(&self) -> f32 {
        (self.technique_application
            + self.tactical_awareness
            + self.frame_control
            + self.emotional_regulation
            + self.strategic_outcome) as f32
            / 5.0
    }

    /// True when every dimension sits in the 1-5 range
    pub fn is_valid(&self) -> bool {
        [
            self.technique_application,
            self.tactical_awareness,
            self.frame_control,
            self.emotional_regulation,
            self.strategic_outcome,
        ]
        .iter()
        .all(|v| (1..=5).contains(v))
    }
}

/// Outcome of yesterday's mission, reported during check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissionOutcome {
    /// Not yet reported (the day after has not checked in)
    Pending,
    /// Carried out, with a clear read on how it went
    ExecutedClear,
    /// Carried out, but the result was ambiguous
    ExecutedUnclear,
    /// Not attempted
    Skipped,
}

impl Default for MissionOutcome {
    fn default() -> Self {
        Self::Pending
    }
}

impl MissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ExecutedClear => "executed-clear",
            Self::ExecutedUnclear => "executed-unclear",
            Self::Skipped => "skipped",
        }
    }
}

/// In-band flow signals the user can issue during roleplay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlToken {
    /// Side-channel advice request; the transcript is untouched
    Coach,
    /// Discard the transcript and restart the scene
    Reset,
    /// Bail out of the scene early
    Skip,
    /// End the scene deliberately
    Finish,
}

/// One completed training day, appended to the ledger at mission time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// 1-based day index, assigned as ledger-count + 1 at append time
    pub day: u32,
    pub date: NaiveDate,
    pub concept_id: String,
    pub concept_label: String,
    pub domain: String,
    pub persona: String,
    pub difficulty: i32,
    pub scores: SessionScores,
    pub weakness_summary: String,
    pub key_moment: String,
    pub mission: String,
    #[serde(default)]
    pub mission_outcome: MissionOutcome,
    #[serde(default)]
    pub control_tokens_used: Vec<ControlToken>,
    #[serde(default)]
    pub completed: bool,
}
