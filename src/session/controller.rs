//! The phase controller: drives the ordered session lifecycle.
//!
//! Stateless between calls: every request carries the caller's
//! `PhaseSnapshot` and every response returns the updated one. The only
//! state kept here is the set of session ids with a call currently in
//! flight, which exists to reject (not queue) racing submissions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{Duration, Local, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::concepts::{
    get_builtin_concepts, get_builtin_personas, pick_concept, pick_persona, Concept, Persona,
};
use crate::ledger::{
    ControlToken, LedgerStorage, MissionOutcome, SessionRecord, DEFAULT_DIGEST_ENTRIES,
};
use crate::llm::{prompts, ChatMessage, GenerateOptions, GenerativeClient, LlmError};
use crate::schedule::ScheduleStorage;
use crate::storage::StorageError;

use super::extractor::{
    extract_debrief, extract_mission, extract_readiness, fallback_scores, RoleplayActivity,
    UNEXTRACTED,
};
use super::models::*;

/// Snapshots older than this are rejected and the lifecycle restarts
const SNAPSHOT_MAX_AGE_HOURS: i64 = 24;

/// Recall attempts allowed before the manual override unlocks
const RETRIEVAL_ATTEMPTS_BEFORE_OVERRIDE: u32 = 2;

/// Advisory soft cap on user exchanges in a scene
const SOFT_EXCHANGE_CAP: usize = 8;

/// Consecutive failed generation attempts before Debrief/Mission fall back
const GENERATION_ATTEMPTS: u32 = 2;

/// Interactive phases get the short external-call timeout
const SHORT_TIMEOUT: StdDuration = StdDuration::from_secs(20);

/// Content-heavy phases get the long one
const LONG_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Directive substituted when the mission call keeps failing
const NEUTRAL_MISSION: &str =
    "Start one short, low-stakes conversation today and pay attention to how it opens.";
const NEUTRAL_MISSION_WHY: &str =
    "A default mission so the day still ends with a rep, even without the coach.";

/// Narrative substituted when the debrief call keeps failing
const FALLBACK_WEAKNESS: &str =
    "The debrief service was unavailable; scores were estimated from session activity.";

#[derive(Error, Debug)]
pub enum SessionError {
    /// The generative call failed after its own bounded retry. Retryable
    /// for phases before Debrief; Debrief and Mission replace it with a
    /// deterministic fallback instead of surfacing it twice.
    #[error("External service error: {0}")]
    External(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Session snapshot is stale; start a new session")]
    StaleSnapshot,

    #[error("Another request for this session is already in flight")]
    SessionBusy,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Drives the CheckIn → ... → Complete phase sequence
pub struct PhaseController {
    ledger: Mutex<LedgerStorage>,
    schedule: Mutex<ScheduleStorage>,
    client: Arc<dyn GenerativeClient>,
    concepts: Vec<Concept>,
    personas: Vec<Persona>,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl PhaseController {
    pub fn new(
        ledger: LedgerStorage,
        schedule: ScheduleStorage,
        client: Arc<dyn GenerativeClient>,
    ) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            schedule: Mutex::new(schedule),
            client,
            concepts: get_builtin_concepts(),
            personas: get_builtin_personas(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    // ===== Phase: Start =====

    /// Open a new session: pick today's concept and persona and decide
    /// whether check-in applies.
    pub fn start(&self, request: StartRequest) -> Result<StartResponse> {
        if let Some(difficulty) = request.preferred_difficulty {
            if !(1..=5).contains(&difficulty) {
                return Err(SessionError::Validation(
                    "preferredDifficulty must be between 1 and 5".to_string(),
                ));
            }
        }

        let (last, day, streak) = {
            let ledger = lock(&self.ledger);
            (ledger.last(), ledger.day_number(), ledger.streak())
        };
        let schedule_entries = lock(&self.schedule).read_all();

        let mut rng = rand::thread_rng();
        let selection = pick_concept(
            &self.concepts,
            &schedule_entries,
            last.as_ref().map(|r| r.domain.as_str()),
            Local::now().date_naive(),
            &mut rng,
        );

        let pool: Vec<Persona> = match request.preferred_difficulty {
            Some(difficulty) => {
                let filtered: Vec<Persona> = self
                    .personas
                    .iter()
                    .filter(|p| p.difficulty == difficulty)
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    self.personas.clone()
                } else {
                    filtered
                }
            }
            None => self.personas.clone(),
        };
        let persona = pick_persona(&pool, &mut rng);

        // Check-in only exists when there is a mission to report on
        let pending = last
            .as_ref()
            .filter(|r| r.mission_outcome == MissionOutcome::Pending);
        let phase = if pending.is_some() {
            Phase::CheckIn
        } else {
            Phase::Lesson
        };

        let snapshot = PhaseSnapshot {
            session_id: Uuid::new_v4(),
            phase,
            day,
            concept_id: selection.concept.id.clone(),
            concept_label: selection.concept.label.clone(),
            domain: selection.concept.domain.clone(),
            persona: persona.label.clone(),
            difficulty: persona.difficulty,
            is_review: selection.is_review,
            lesson: None,
            transcript: Vec::new(),
            retrieval_attempts: 0,
            scores: None,
            weakness_summary: None,
            key_moment: None,
            control_tokens_used: Vec::new(),
            captured_at: Utc::now(),
        };

        log::info!(
            "Session {} started: day {}, concept {} ({}), persona {}",
            snapshot.session_id,
            day,
            selection.concept.id,
            if selection.is_review { "review" } else { "new" },
            persona.label
        );

        Ok(StartResponse {
            pending_mission: pending.map(|r| r.mission.clone()),
            snapshot,
            concept: selection.concept,
            persona,
            streak,
        })
    }

    // ===== Phase: CheckIn =====

    /// Record yesterday's mission outcome. The category never blocks
    /// progress; whatever happened, the session moves on to the lesson.
    pub fn check_in(&self, request: CheckInRequest) -> Result<CheckInResponse> {
        let mut snapshot = request.snapshot;
        self.validate(&snapshot, Phase::CheckIn)?;
        let _guard = self.claim(snapshot.session_id)?;

        let outcome = match request.outcome {
            OutcomeReport::ExecutedClear => MissionOutcome::ExecutedClear,
            OutcomeReport::ExecutedUnclear => MissionOutcome::ExecutedUnclear,
            OutcomeReport::Skipped => MissionOutcome::Skipped,
        };

        match lock(&self.ledger).mutate_last_outcome(outcome) {
            Ok(record) => {
                log::info!("Check-in: day {} mission marked {}", record.day, outcome.as_str())
            }
            // A missing or already-reported record is logged, not fatal;
            // check-in never blocks the day's session.
            Err(StorageError::NotFound(reason)) | Err(StorageError::InvalidOperation(reason)) => {
                log::warn!("Check-in skipped outcome write: {}", reason)
            }
            Err(e) => return Err(e.into()),
        }

        snapshot.phase = Phase::Lesson;
        touch(&mut snapshot);
        Ok(CheckInResponse { snapshot })
    }

    // ===== Phase: Lesson =====

    pub async fn lesson(&self, request: LessonRequest) -> Result<LessonResponse> {
        let mut snapshot = request.snapshot;
        self.validate(&snapshot, Phase::Lesson)?;
        let _guard = self.claim(snapshot.session_id)?;
        let concept = self.concept_for(&snapshot)?;

        let digest = lock(&self.ledger).compact(DEFAULT_DIGEST_ENTRIES);
        let (system, messages) = prompts::lesson(concept, &digest, snapshot.is_review);
        let text = self
            .client
            .generate(&system, &messages, &options(0.7, 1024, LONG_TIMEOUT))
            .await?;

        snapshot.lesson = Some(text.clone());
        snapshot.phase = Phase::RetrievalCheck;
        touch(&mut snapshot);

        Ok(LessonResponse {
            recall_question: concept.recall_question.clone(),
            snapshot,
            lesson: text,
        })
    }

    // ===== Phase: RetrievalCheck =====

    /// Evaluate a recall answer. Non-readiness allows one more attempt,
    /// after which an explicit manual override may proceed.
    pub async fn retrieval(&self, request: RetrievalRequest) -> Result<RetrievalResponse> {
        let mut snapshot = request.snapshot;
        self.validate(&snapshot, Phase::RetrievalCheck)?;
        let _guard = self.claim(snapshot.session_id)?;
        let concept = self.concept_for(&snapshot)?;

        if request.manual_override {
            if snapshot.retrieval_attempts < RETRIEVAL_ATTEMPTS_BEFORE_OVERRIDE {
                return Err(SessionError::Validation(format!(
                    "Manual override unlocks after {} attempts",
                    RETRIEVAL_ATTEMPTS_BEFORE_OVERRIDE
                )));
            }
            log::info!("Session {}: retrieval check overridden", snapshot.session_id);
            snapshot.phase = Phase::Roleplay;
            touch(&mut snapshot);
            return Ok(RetrievalResponse {
                attempts_used: snapshot.retrieval_attempts,
                snapshot,
                ready: true,
                feedback: "Override accepted; moving on to practice.".to_string(),
                override_available: false,
            });
        }

        let answer = request
            .answer
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SessionError::Validation("answer is required".to_string()))?;

        let (system, messages) = prompts::retrieval_evaluation(concept, answer);
        let text = self
            .client
            .generate(&system, &messages, &options(0.3, 300, SHORT_TIMEOUT))
            .await?;
        let verdict = extract_readiness(&text);

        snapshot.retrieval_attempts += 1;
        if verdict.ready {
            snapshot.phase = Phase::Roleplay;
        }
        let attempts = snapshot.retrieval_attempts;
        let override_available =
            !verdict.ready && attempts >= RETRIEVAL_ATTEMPTS_BEFORE_OVERRIDE;
        touch(&mut snapshot);

        Ok(RetrievalResponse {
            snapshot,
            ready: verdict.ready,
            feedback: verdict.feedback,
            attempts_used: attempts,
            override_available,
        })
    }

    // ===== Phase: Roleplay =====

    /// One roleplay interaction. Termination is driven only by explicit
    /// control tokens; the soft exchange cap is reported, never enforced.
    pub async fn roleplay(&self, request: RoleplayRequest) -> Result<RoleplayResponse> {
        let mut snapshot = request.snapshot;
        self.validate(&snapshot, Phase::Roleplay)?;
        let _guard = self.claim(snapshot.session_id)?;
        let concept = self.concept_for(&snapshot)?;
        let persona = self.persona_for(&snapshot)?;
        let system = prompts::roleplay_system(concept, persona);

        let mut reply = None;
        let mut coach_advice = None;

        match request.action {
            RoleplayAction::Open => {
                if !snapshot.transcript.is_empty() {
                    return Err(SessionError::Validation(
                        "scene is already open".to_string(),
                    ));
                }
                let turn = self.partner_turn(&system, prompts::roleplay_opening()).await?;
                snapshot.transcript.push(turn.clone());
                reply = Some(turn);
            }
            RoleplayAction::Say { text } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(SessionError::Validation("text must not be empty".to_string()));
                }
                let mut transcript = snapshot.transcript.clone();
                transcript.push(RoleplayTurn::new(TurnRole::User, text));
                let turn = self
                    .partner_turn(&system, prompts::roleplay_continue(&transcript))
                    .await?;
                transcript.push(turn.clone());
                snapshot.transcript = transcript;
                reply = Some(turn);
            }
            RoleplayAction::Coach => {
                snapshot.note_token(ControlToken::Coach);
                let (coach_system, messages) =
                    prompts::coach_advice(concept, &snapshot.transcript);
                let advice = self
                    .client
                    .generate(&coach_system, &messages, &options(0.7, 200, SHORT_TIMEOUT))
                    .await?;
                coach_advice = Some(advice);
            }
            RoleplayAction::Reset => {
                snapshot.note_token(ControlToken::Reset);
                snapshot.transcript.clear();
                let turn = self.partner_turn(&system, prompts::roleplay_opening()).await?;
                snapshot.transcript.push(turn.clone());
                reply = Some(turn);
            }
            RoleplayAction::Skip => {
                snapshot.note_token(ControlToken::Skip);
                snapshot.phase = Phase::Debrief;
            }
            RoleplayAction::Finish => {
                snapshot.note_token(ControlToken::Finish);
                snapshot.phase = Phase::Debrief;
            }
        }

        let wrap_suggested =
            snapshot.phase == Phase::Roleplay && snapshot.user_turns() >= SOFT_EXCHANGE_CAP;
        touch(&mut snapshot);

        Ok(RoleplayResponse {
            snapshot,
            reply,
            coach_advice,
            wrap_suggested,
        })
    }

    // ===== Phase: Debrief =====

    /// Score the finished scene. Two consecutive external failures
    /// substitute the activity-derived fallback so the session is never
    /// stuck here.
    pub async fn debrief(&self, request: DebriefRequest) -> Result<DebriefResponse> {
        let mut snapshot = request.snapshot;
        self.validate(&snapshot, Phase::Debrief)?;
        let _guard = self.claim(snapshot.session_id)?;
        let concept = self.concept_for(&snapshot)?;
        let persona = self.persona_for(&snapshot)?;

        let (system, messages) = prompts::debrief(concept, persona, &snapshot.transcript);
        let generated = self
            .generate_with_fallback(&system, &messages, &options(0.5, 800, LONG_TIMEOUT))
            .await;

        let (scores, weakness, key_moment, fallback_used) = match generated {
            Some(text) => {
                let outcome = extract_debrief(&text);
                (
                    outcome.scores,
                    outcome.weakness_summary,
                    outcome.key_moment,
                    false,
                )
            }
            None => {
                let activity = activity_of(&snapshot);
                log::warn!(
                    "Session {}: debrief fell back to activity-derived scores",
                    snapshot.session_id
                );
                (
                    fallback_scores(&activity),
                    FALLBACK_WEAKNESS.to_string(),
                    UNEXTRACTED.to_string(),
                    true,
                )
            }
        };

        snapshot.scores = Some(scores);
        snapshot.weakness_summary = Some(weakness.clone());
        snapshot.key_moment = Some(key_moment.clone());
        snapshot.phase = Phase::Mission;
        touch(&mut snapshot);

        Ok(DebriefResponse {
            snapshot,
            scores,
            weakness_summary: weakness,
            key_moment,
            fallback_used,
        })
    }

    // ===== Phase: Mission =====

    /// Assign today's real-world mission, then persist the day: ledger
    /// append first, schedule update second, Complete last.
    pub async fn mission(&self, request: MissionRequest) -> Result<MissionResponse> {
        let mut snapshot = request.snapshot;
        self.validate(&snapshot, Phase::Mission)?;
        let _guard = self.claim(snapshot.session_id)?;
        let concept = self.concept_for(&snapshot)?;

        let scores = snapshot.scores.ok_or_else(|| {
            SessionError::Validation("snapshot carries no debrief scores".to_string())
        })?;
        let weakness = snapshot
            .weakness_summary
            .clone()
            .unwrap_or_else(|| UNEXTRACTED.to_string());

        let digest = lock(&self.ledger).compact(DEFAULT_DIGEST_ENTRIES);
        let (system, messages) = prompts::mission(concept, &weakness, &digest);
        let generated = self
            .generate_with_fallback(&system, &messages, &options(0.7, 300, LONG_TIMEOUT))
            .await;

        let (directive, rationale, fallback_used) = match generated {
            Some(text) => {
                let brief = extract_mission(&text);
                (brief.directive, brief.rationale, false)
            }
            None => {
                log::warn!(
                    "Session {}: mission fell back to the neutral directive",
                    snapshot.session_id
                );
                (
                    NEUTRAL_MISSION.to_string(),
                    NEUTRAL_MISSION_WHY.to_string(),
                    true,
                )
            }
        };

        let record = {
            let ledger = lock(&self.ledger);
            // A retried call after a partial failure must not double-append
            match ledger.last().filter(|r| r.day == snapshot.day) {
                Some(existing) => existing,
                None => ledger.append(SessionRecord {
                    day: 0,
                    date: Local::now().date_naive(),
                    concept_id: snapshot.concept_id.clone(),
                    concept_label: snapshot.concept_label.clone(),
                    domain: snapshot.domain.clone(),
                    persona: snapshot.persona.clone(),
                    difficulty: snapshot.difficulty,
                    scores,
                    weakness_summary: weakness.clone(),
                    key_moment: snapshot
                        .key_moment
                        .clone()
                        .unwrap_or_else(|| UNEXTRACTED.to_string()),
                    mission: directive.clone(),
                    mission_outcome: MissionOutcome::Pending,
                    control_tokens_used: snapshot.control_tokens_used.clone(),
                    completed: false,
                })?,
            }
        };

        lock(&self.schedule).record_practice(&snapshot.concept_id, scores.average())?;

        snapshot.phase = Phase::Complete;
        touch(&mut snapshot);

        Ok(MissionResponse {
            snapshot,
            record,
            directive,
            rationale,
            fallback_used,
        })
    }

    // ===== Status =====

    /// The read-only status surface
    pub fn status(&self, last_n: usize) -> StatusReport {
        let (records, streak, day_number) = {
            let ledger = lock(&self.ledger);
            (ledger.read_all(), ledger.streak(), ledger.day_number())
        };
        let schedule = lock(&self.schedule).summary();

        let start = records.len().saturating_sub(last_n);
        let recent_scores = records[start..].iter().map(|r| r.scores).collect();

        StatusReport {
            day_number,
            streak,
            last_session: records.last().cloned(),
            recent_scores,
            schedule,
        }
    }

    // ===== Internals =====

    fn validate(&self, snapshot: &PhaseSnapshot, expected: Phase) -> Result<()> {
        if snapshot.phase != expected {
            return Err(SessionError::Validation(format!(
                "snapshot is in phase {:?}, endpoint expects {:?}",
                snapshot.phase, expected
            )));
        }
        if Utc::now() - snapshot.captured_at > Duration::hours(SNAPSHOT_MAX_AGE_HOURS) {
            return Err(SessionError::StaleSnapshot);
        }
        Ok(())
    }

    /// Mark a session as having a call in flight; racing calls are
    /// rejected, not queued.
    fn claim(&self, session_id: Uuid) -> Result<FlightGuard<'_>> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(session_id) {
            return Err(SessionError::SessionBusy);
        }
        Ok(FlightGuard {
            set: &self.in_flight,
            session_id,
        })
    }

    fn concept_for(&self, snapshot: &PhaseSnapshot) -> Result<&Concept> {
        self.concepts
            .iter()
            .find(|c| c.id == snapshot.concept_id)
            .ok_or_else(|| {
                SessionError::Validation(format!("unknown concept: {}", snapshot.concept_id))
            })
    }

    fn persona_for(&self, snapshot: &PhaseSnapshot) -> Result<&Persona> {
        self.personas
            .iter()
            .find(|p| p.label == snapshot.persona)
            .ok_or_else(|| {
                SessionError::Validation(format!("unknown persona: {}", snapshot.persona))
            })
    }

    async fn partner_turn(
        &self,
        system: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<RoleplayTurn> {
        let text = self
            .client
            .generate(system, &messages, &options(0.9, 256, SHORT_TIMEOUT))
            .await?;
        Ok(RoleplayTurn::new(TurnRole::Partner, text))
    }

    /// Bounded attempts for the phases that must never stay stuck.
    /// Returns `None` once every attempt has failed; the caller
    /// substitutes its deterministic fallback.
    async fn generate_with_fallback(
        &self,
        system: &str,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> Option<String> {
        for attempt in 1..=GENERATION_ATTEMPTS {
            match self.client.generate(system, messages, opts).await {
                Ok(text) => return Some(text),
                Err(e) => log::warn!(
                    "Generation attempt {}/{} failed: {}",
                    attempt,
                    GENERATION_ATTEMPTS,
                    e
                ),
            }
        }
        None
    }
}

fn options(temperature: f32, max_tokens: u32, timeout: StdDuration) -> GenerateOptions {
    GenerateOptions {
        temperature,
        max_tokens,
        timeout,
    }
}

fn touch(snapshot: &mut PhaseSnapshot) {
    snapshot.captured_at = Utc::now();
}

fn activity_of(snapshot: &PhaseSnapshot) -> RoleplayActivity {
    RoleplayActivity {
        total_turns: snapshot.transcript.len(),
        user_turns: snapshot.user_turns(),
        used_coach: snapshot.control_tokens_used.contains(&ControlToken::Coach),
        used_skip: snapshot.control_tokens_used.contains(&ControlToken::Skip),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock means a panic elsewhere; the collections on disk are
    // still consistent, so keep serving.
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct FlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    session_id: Uuid,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    use crate::llm::TextStream;

    enum MockReply {
        Text(&'static str),
        Fail,
    }

    struct MockClient {
        script: Mutex<VecDeque<MockReply>>,
    }

    impl MockClient {
        fn scripted(replies: Vec<MockReply>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl GenerativeClient for MockClient {
        async fn generate(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
            _options: &GenerateOptions,
        ) -> std::result::Result<String, LlmError> {
            match self.script.lock().unwrap().pop_front() {
                Some(MockReply::Text(text)) => Ok(text.to_string()),
                Some(MockReply::Fail) => Err(LlmError::Status {
                    status: 500,
                    message: "service down".to_string(),
                }),
                None => Ok("Unscripted reply.".to_string()),
            }
        }

        async fn generate_stream(
            &self,
            system: &str,
            messages: &[ChatMessage],
            options: &GenerateOptions,
        ) -> std::result::Result<TextStream, LlmError> {
            let text = self.generate(system, messages, options).await?;
            let chunks: Vec<std::result::Result<String, LlmError>> = vec![Ok(text)];
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }

    const READY_EVAL: &str = "VERDICT: ready\nFEEDBACK:\nGood recall.";
    const AGAIN_EVAL: &str = "VERDICT: again\nFEEDBACK:\nMissing the mechanism.";
    const DEBRIEF_TEXT: &str = "\
SCORES:
technique application: 4
tactical awareness: 4
frame control: 5
emotional regulation: 4
strategic outcome: 4

WEAKNESS:
Too many questions in a row.

KEY MOMENT:
The reframe at the interruption.";
    const MISSION_TEXT: &str = "MISSION:\nOpen with an observation in line.\n\nWHY:\nIt drills openers.";

    fn controller_with(replies: Vec<MockReply>) -> (PhaseController, TempDir) {
        let temp = TempDir::new().unwrap();
        let ledger = LedgerStorage::new(temp.path().to_path_buf()).unwrap();
        let schedule = ScheduleStorage::new(temp.path().to_path_buf()).unwrap();
        let controller = PhaseController::new(ledger, schedule, MockClient::scripted(replies));
        (controller, temp)
    }

    #[test]
    fn test_fresh_install_skips_checkin() {
        let (controller, _temp) = controller_with(Vec::new());
        let response = controller.start(StartRequest::default()).unwrap();

        assert_eq!(response.snapshot.phase, Phase::Lesson);
        assert_eq!(response.snapshot.day, 1);
        assert_eq!(response.streak, 0);
        assert!(response.pending_mission.is_none());
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let (controller, _temp) = controller_with(vec![
            MockReply::Text("Today we learn warm openers."),
            MockReply::Text(READY_EVAL),
            MockReply::Text("[At a cafe] Oh — is this seat taken?"),
            MockReply::Text("Ha, fair enough. So what brings you here?"),
            MockReply::Text(DEBRIEF_TEXT),
            MockReply::Text(MISSION_TEXT),
        ]);

        let started = controller.start(StartRequest::default()).unwrap();
        let lesson = controller
            .lesson(LessonRequest {
                snapshot: started.snapshot,
            })
            .await
            .unwrap();
        assert_eq!(lesson.snapshot.phase, Phase::RetrievalCheck);
        assert!(!lesson.recall_question.is_empty());

        let retrieval = controller
            .retrieval(RetrievalRequest {
                snapshot: lesson.snapshot,
                answer: Some("It should feel effortless to answer.".to_string()),
                manual_override: false,
            })
            .await
            .unwrap();
        assert!(retrieval.ready);
        assert_eq!(retrieval.snapshot.phase, Phase::Roleplay);

        let opened = controller
            .roleplay(RoleplayRequest {
                snapshot: retrieval.snapshot,
                action: RoleplayAction::Open,
            })
            .await
            .unwrap();
        assert_eq!(opened.snapshot.transcript.len(), 1);

        let said = controller
            .roleplay(RoleplayRequest {
                snapshot: opened.snapshot,
                action: RoleplayAction::Say {
                    text: "Only if you make it interesting.".to_string(),
                },
            })
            .await
            .unwrap();
        assert_eq!(said.snapshot.transcript.len(), 3);
        assert!(said.reply.is_some());

        let finished = controller
            .roleplay(RoleplayRequest {
                snapshot: said.snapshot,
                action: RoleplayAction::Finish,
            })
            .await
            .unwrap();
        assert_eq!(finished.snapshot.phase, Phase::Debrief);

        let debriefed = controller
            .debrief(DebriefRequest {
                snapshot: finished.snapshot,
            })
            .await
            .unwrap();
        assert!(!debriefed.fallback_used);
        assert_eq!(debriefed.scores.frame_control, 5);
        assert_eq!(debriefed.snapshot.phase, Phase::Mission);

        let mission = controller
            .mission(MissionRequest {
                snapshot: debriefed.snapshot,
            })
            .await
            .unwrap();
        assert_eq!(mission.snapshot.phase, Phase::Complete);
        assert_eq!(mission.record.day, 1);
        assert!(mission.record.completed);
        assert_eq!(mission.directive, "Open with an observation in line.");

        // The day is durably recorded and scheduled for review
        let status = controller.status(7);
        assert_eq!(status.day_number, 2);
        assert_eq!(status.schedule.tracked_concepts, 1);
    }

    #[tokio::test]
    async fn test_second_day_opens_with_checkin() {
        let (controller, _temp) = controller_with(vec![
            MockReply::Text("lesson"),
            MockReply::Text(READY_EVAL),
            MockReply::Text(DEBRIEF_TEXT),
            MockReply::Text(MISSION_TEXT),
        ]);

        // Complete a first day with the minimum number of calls
        let started = controller.start(StartRequest::default()).unwrap();
        let lesson = controller
            .lesson(LessonRequest {
                snapshot: started.snapshot,
            })
            .await
            .unwrap();
        let retrieval = controller
            .retrieval(RetrievalRequest {
                snapshot: lesson.snapshot,
                answer: Some("answer".to_string()),
                manual_override: false,
            })
            .await
            .unwrap();
        let mut snapshot = retrieval.snapshot;
        let skipped = controller
            .roleplay(RoleplayRequest {
                snapshot,
                action: RoleplayAction::Skip,
            })
            .await
            .unwrap();
        let debriefed = controller
            .debrief(DebriefRequest {
                snapshot: skipped.snapshot,
            })
            .await
            .unwrap();
        controller
            .mission(MissionRequest {
                snapshot: debriefed.snapshot,
            })
            .await
            .unwrap();

        // The next session must now start at check-in
        let next = controller.start(StartRequest::default()).unwrap();
        assert_eq!(next.snapshot.phase, Phase::CheckIn);
        assert_eq!(next.pending_mission.as_deref(), Some("Open with an observation in line."));

        snapshot = next.snapshot;
        let checked = controller
            .check_in(CheckInRequest {
                snapshot,
                outcome: OutcomeReport::ExecutedClear,
            })
            .unwrap();
        assert_eq!(checked.snapshot.phase, Phase::Lesson);

        // Outcome landed on yesterday's record, and check-in never repeats
        let status = controller.status(7);
        assert_eq!(
            status.last_session.unwrap().mission_outcome,
            MissionOutcome::ExecutedClear
        );
        let again = controller.start(StartRequest::default()).unwrap();
        assert_eq!(again.snapshot.phase, Phase::Lesson);
    }

    #[tokio::test]
    async fn test_retrieval_allows_one_retry_then_override() {
        let (controller, _temp) = controller_with(vec![
            MockReply::Text("lesson"),
            MockReply::Text(AGAIN_EVAL),
            MockReply::Text(AGAIN_EVAL),
        ]);

        let started = controller.start(StartRequest::default()).unwrap();
        let lesson = controller
            .lesson(LessonRequest {
                snapshot: started.snapshot,
            })
            .await
            .unwrap();

        // Override before any attempt is rejected
        let premature = controller
            .retrieval(RetrievalRequest {
                snapshot: lesson.snapshot.clone(),
                answer: None,
                manual_override: true,
            })
            .await;
        assert!(matches!(premature, Err(SessionError::Validation(_))));

        let first = controller
            .retrieval(RetrievalRequest {
                snapshot: lesson.snapshot,
                answer: Some("wrong".to_string()),
                manual_override: false,
            })
            .await
            .unwrap();
        assert!(!first.ready);
        assert!(!first.override_available);

        let second = controller
            .retrieval(RetrievalRequest {
                snapshot: first.snapshot,
                answer: Some("still wrong".to_string()),
                manual_override: false,
            })
            .await
            .unwrap();
        assert!(!second.ready);
        assert!(second.override_available);

        let overridden = controller
            .retrieval(RetrievalRequest {
                snapshot: second.snapshot,
                answer: None,
                manual_override: true,
            })
            .await
            .unwrap();
        assert!(overridden.ready);
        assert_eq!(overridden.snapshot.phase, Phase::Roleplay);
    }

    #[tokio::test]
    async fn test_coach_and_reset_do_not_leak_into_transcript() {
        let (controller, _temp) = controller_with(vec![
            MockReply::Text("opening line"),
            MockReply::Text("try naming the mood shift"),
            MockReply::Text("fresh opening line"),
        ]);

        let mut snapshot = roleplay_snapshot();
        let opened = controller
            .roleplay(RoleplayRequest {
                snapshot,
                action: RoleplayAction::Open,
            })
            .await
            .unwrap();

        let coached = controller
            .roleplay(RoleplayRequest {
                snapshot: opened.snapshot,
                action: RoleplayAction::Coach,
            })
            .await
            .unwrap();
        assert_eq!(coached.coach_advice.as_deref(), Some("try naming the mood shift"));
        assert_eq!(coached.snapshot.transcript.len(), 1);

        snapshot = coached.snapshot;
        let reset = controller
            .roleplay(RoleplayRequest {
                snapshot,
                action: RoleplayAction::Reset,
            })
            .await
            .unwrap();
        assert_eq!(reset.snapshot.transcript.len(), 1);
        assert_eq!(reset.snapshot.transcript[0].text, "fresh opening line");
        assert!(reset
            .snapshot
            .control_tokens_used
            .contains(&ControlToken::Reset));
    }

    #[tokio::test]
    async fn test_debrief_falls_back_after_two_failures() {
        let (controller, _temp) = controller_with(vec![MockReply::Fail, MockReply::Fail]);

        let mut snapshot = roleplay_snapshot();
        snapshot.phase = Phase::Debrief;
        snapshot.transcript = vec![
            RoleplayTurn::new(TurnRole::User, "hi"),
            RoleplayTurn::new(TurnRole::User, "hello?"),
            RoleplayTurn::new(TurnRole::User, "anyone?"),
        ];
        snapshot.note_token(ControlToken::Skip);

        let debriefed = controller
            .debrief(DebriefRequest { snapshot })
            .await
            .unwrap();
        assert!(debriefed.fallback_used);
        // 3 turns, 3 user turns, skip used: every dimension bottoms out
        assert_eq!(debriefed.scores, crate::ledger::SessionScores::uniform(1));
        assert_eq!(debriefed.snapshot.phase, Phase::Mission);
    }

    #[tokio::test]
    async fn test_mission_falls_back_to_neutral_directive() {
        let (controller, _temp) = controller_with(vec![MockReply::Fail, MockReply::Fail]);

        let mut snapshot = roleplay_snapshot();
        snapshot.phase = Phase::Mission;
        snapshot.scores = Some(crate::ledger::SessionScores::uniform(3));
        snapshot.weakness_summary = Some("rushed".to_string());

        let mission = controller
            .mission(MissionRequest { snapshot })
            .await
            .unwrap();
        assert!(mission.fallback_used);
        assert_eq!(mission.directive, NEUTRAL_MISSION);
        assert_eq!(mission.record.day, 1);
        assert_eq!(mission.snapshot.phase, Phase::Complete);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_rejected() {
        let (controller, _temp) = controller_with(Vec::new());

        let mut snapshot = roleplay_snapshot();
        snapshot.phase = Phase::Lesson;
        snapshot.captured_at = Utc::now() - Duration::hours(SNAPSHOT_MAX_AGE_HOURS + 1);

        let result = controller.lesson(LessonRequest { snapshot }).await;
        assert!(matches!(result, Err(SessionError::StaleSnapshot)));
    }

    #[tokio::test]
    async fn test_wrong_phase_is_rejected() {
        let (controller, _temp) = controller_with(Vec::new());

        let snapshot = roleplay_snapshot(); // phase: Roleplay
        let result = controller.debrief(DebriefRequest { snapshot }).await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
    }

    #[test]
    fn test_racing_call_is_rejected_not_queued() {
        let (controller, _temp) = controller_with(Vec::new());
        let id = Uuid::new_v4();

        let guard = controller.claim(id).unwrap();
        assert!(matches!(controller.claim(id), Err(SessionError::SessionBusy)));
        drop(guard);

        // Released on drop
        assert!(controller.claim(id).is_ok());
    }

    fn roleplay_snapshot() -> PhaseSnapshot {
        PhaseSnapshot {
            session_id: Uuid::new_v4(),
            phase: Phase::Roleplay,
            day: 1,
            concept_id: "warm-openers".to_string(),
            concept_label: "Warm Openers".to_string(),
            domain: "calibration".to_string(),
            persona: "The Skeptic".to_string(),
            difficulty: 3,
            is_review: false,
            lesson: Some("lesson text".to_string()),
            transcript: Vec::new(),
            retrieval_attempts: 0,
            scores: None,
            weakness_summary: None,
            key_moment: None,
            control_tokens_used: Vec::new(),
            captured_at: Utc::now(),
        }
    }
}
