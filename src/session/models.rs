//! Data models for the session lifecycle.
//!
//! The server side is stateless between calls: every phase request carries
//! the caller-held `PhaseSnapshot`, and every response hands back the
//! updated snapshot to store for the next call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concepts::{Concept, Persona};
use crate::ledger::{ControlToken, SessionRecord, SessionScores};
use crate::schedule::ScheduleSummary;

/// Ordered phases of one training day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    CheckIn,
    Lesson,
    RetrievalCheck,
    Roleplay,
    Debrief,
    Mission,
    Complete,
}

/// Who spoke a roleplay turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnRole {
    User,
    Partner,
}

/// One turn in the roleplay transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleplayTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl RoleplayTurn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Caller-held state of an in-progress session.
///
/// Snapshots expire: one older than the staleness threshold is rejected
/// and the lifecycle restarts from `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    /// Day number this session will record (ledger count + 1 at start time)
    pub day: u32,
    pub concept_id: String,
    pub concept_label: String,
    pub domain: String,
    pub persona: String,
    pub difficulty: i32,
    pub is_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson: Option<String>,
    #[serde(default)]
    pub transcript: Vec<RoleplayTurn>,
    #[serde(default)]
    pub retrieval_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<SessionScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weakness_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_moment: Option<String>,
    #[serde(default)]
    pub control_tokens_used: Vec<ControlToken>,
    pub captured_at: DateTime<Utc>,
}

impl PhaseSnapshot {
    /// Record a control token, keeping the set free of duplicates
    pub fn note_token(&mut self, token: ControlToken) {
        if !self.control_tokens_used.contains(&token) {
            self.control_tokens_used.push(token);
        }
    }

    pub fn user_turns(&self) -> usize {
        self.transcript
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .count()
    }
}

/// Mission outcome category as reported at check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeReport {
    ExecutedClear,
    ExecutedUnclear,
    Skipped,
}

// ===== Phase Requests =====

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Restrict persona selection to this difficulty, when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_difficulty: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub snapshot: PhaseSnapshot,
    pub outcome: OutcomeReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRequest {
    pub snapshot: PhaseSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    pub snapshot: PhaseSnapshot,
    /// The student's recall answer; required unless overriding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Explicit manual override after the allowed attempts are spent
    #[serde(default)]
    pub manual_override: bool,
}

/// What the user did this roleplay turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoleplayAction {
    /// Open the scene (only valid while the transcript is empty)
    Open,
    /// A spoken line
    Say { text: String },
    /// Ask the coach for advice; the scene itself is untouched
    Coach,
    /// Throw the scene away and restart it
    Reset,
    /// Bail out to the debrief
    Skip,
    /// End the scene deliberately and debrief
    Finish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleplayRequest {
    pub snapshot: PhaseSnapshot,
    pub action: RoleplayAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebriefRequest {
    pub snapshot: PhaseSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionRequest {
    pub snapshot: PhaseSnapshot,
}

// ===== Phase Responses =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub snapshot: PhaseSnapshot,
    pub concept: Concept,
    pub persona: Persona,
    /// Yesterday's mission, present when the session opens with check-in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_mission: Option<String>,
    pub streak: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub snapshot: PhaseSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonResponse {
    pub snapshot: PhaseSnapshot,
    pub lesson: String,
    pub recall_question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResponse {
    pub snapshot: PhaseSnapshot,
    pub ready: bool,
    pub feedback: String,
    pub attempts_used: u32,
    /// True once the manual override is permitted
    pub override_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleplayResponse {
    pub snapshot: PhaseSnapshot,
    /// The partner's new turn, when the scene moved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<RoleplayTurn>,
    /// Side-channel advice for a coach request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coach_advice: Option<String>,
    /// Advisory only: the soft exchange cap has been reached
    pub wrap_suggested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebriefResponse {
    pub snapshot: PhaseSnapshot,
    pub scores: SessionScores,
    pub weakness_summary: String,
    pub key_moment: String,
    /// True when the activity-derived fallback replaced a failed call
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionResponse {
    pub snapshot: PhaseSnapshot,
    pub record: SessionRecord,
    pub directive: String,
    pub rationale: String,
    /// True when the fixed neutral directive replaced a failed call
    pub fallback_used: bool,
}

/// Everything the status surface reports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub day_number: u32,
    pub streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_session: Option<SessionRecord>,
    pub recent_scores: Vec<SessionScores>,
    pub schedule: ScheduleSummary,
}
