//! Prompt construction for each phase.
//!
//! Pure functions from session data to instruction text. Anything the
//! extractor later parses is pinned to the exact header grammar here, so
//! the two files have to move together.

use crate::concepts::{Concept, Persona};
use crate::session::{RoleplayTurn, TurnRole};

use super::client::ChatMessage;

const COACH_IDENTITY: &str = "You are a direct, warm conversation coach running a \
    daily training session. You never lecture for more than a few paragraphs and you \
    always speak to one specific person, not an audience.";

/// Lesson phase: teach today's concept against the recent session history
pub fn lesson(concept: &Concept, digest: &str, is_review: bool) -> (String, Vec<ChatMessage>) {
    let system = COACH_IDENTITY.to_string();
    let framing = if is_review {
        "This is a review day: the student has trained this before, so sharpen and \
         deepen rather than introduce."
    } else {
        "This is new material for the student."
    };
    let user = format!(
        "Today's concept: {} (domain: {}).\n\nConcept summary: {}\n\n{}\n\n\
         Recent training history:\n{}\n\n\
         Teach this concept in 3 short sections: the core idea, one concrete worked \
         example of it going well, and the single most common way people get it wrong.",
        concept.label, concept.domain, concept.summary, framing, digest
    );
    (system, vec![ChatMessage::user(user)])
}

/// Retrieval check: judge the student's recall answer
pub fn retrieval_evaluation(concept: &Concept, answer: &str) -> (String, Vec<ChatMessage>) {
    let system = format!(
        "{} You are grading a one-question recall check. Respond using exactly this \
         format:\n\nVERDICT: ready|again\nFEEDBACK:\n<two sentences at most>",
        COACH_IDENTITY
    );
    let user = format!(
        "Concept: {}\nQuestion: {}\nStudent answer: {}\n\n\
         Mark ready if the answer shows they grasp the mechanism, even in their own \
         words. Mark again only if the core idea is missing.",
        concept.label, concept.recall_question, answer
    );
    (system, vec![ChatMessage::user(user)])
}

/// System prompt for the roleplay scene
pub fn roleplay_system(concept: &Concept, persona: &Persona) -> String {
    format!(
        "You are playing a character in a conversational training scene. Stay in \
         character for every reply; never break the fourth wall or coach.\n\n\
         Character: {} — {}\nDifficulty: {}/5.\n\n\
         The student is practicing: {} ({}). Give them realistic openings to use it, \
         and realistic resistance when they fumble it. Keep replies under 80 words.",
        persona.label, persona.description, persona.difficulty, concept.label, concept.summary
    )
}

/// Opening turn of a scene: the character speaks first, no user utterance yet
pub fn roleplay_opening() -> Vec<ChatMessage> {
    vec![ChatMessage::user(
        "Begin the scene. Describe where we are in one bracketed stage direction, then \
         say your character's first line.",
    )]
}

/// Continue the scene from the transcript so far
pub fn roleplay_continue(transcript: &[RoleplayTurn]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(turn.text.clone()),
            TurnRole::Partner => ChatMessage::assistant(turn.text.clone()),
        })
        .collect()
}

/// Side-channel coaching advice; never enters the transcript
pub fn coach_advice(concept: &Concept, transcript: &[RoleplayTurn]) -> (String, Vec<ChatMessage>) {
    let system = COACH_IDENTITY.to_string();
    let user = format!(
        "Mid-scene coaching request. The student is practicing {}.\n\n\
         Transcript so far:\n{}\n\n\
         In three sentences or fewer: what should their very next line try to do?",
        concept.label,
        render_transcript(transcript)
    );
    (system, vec![ChatMessage::user(user)])
}

/// Debrief: score the finished scene using the extractor's grammar
pub fn debrief(concept: &Concept, persona: &Persona, transcript: &[RoleplayTurn]) -> (String, Vec<ChatMessage>) {
    let system = format!(
        "{} You are writing a post-scene debrief. Respond using exactly this format:\n\n\
         SCORES:\ntechnique application: <1-5>\ntactical awareness: <1-5>\n\
         frame control: <1-5>\nemotional regulation: <1-5>\nstrategic outcome: <1-5>\n\n\
         WEAKNESS:\n<the one pattern most worth fixing, two sentences>\n\n\
         KEY MOMENT:\n<the single most instructive moment, quoted or paraphrased>",
        COACH_IDENTITY
    );
    let user = format!(
        "Concept practiced: {}.\nScene partner: {} ({}).\n\nTranscript:\n{}",
        concept.label,
        persona.label,
        persona.description,
        render_transcript(transcript)
    );
    (system, vec![ChatMessage::user(user)])
}

/// Mission: one real-world directive for today
pub fn mission(concept: &Concept, weakness: &str, digest: &str) -> (String, Vec<ChatMessage>) {
    let system = format!(
        "{} You are assigning one small real-world mission. Respond using exactly this \
         format:\n\nMISSION:\n<one concrete directive, one sentence>\n\nWHY:\n<one \
         sentence tying it to today's weakness>",
        COACH_IDENTITY
    );
    let user = format!(
        "Concept practiced today: {}.\nWeakness to target: {}\n\nRecent history:\n{}\n\n\
         The mission must be doable by one person, today, in under ten minutes, with \
         no preparation.",
        concept.label, weakness, digest
    );
    (system, vec![ChatMessage::user(user)])
}

fn render_transcript(transcript: &[RoleplayTurn]) -> String {
    if transcript.is_empty() {
        return "(scene had not started)".to_string();
    }
    transcript
        .iter()
        .map(|turn| {
            let who = match turn.role {
                TurnRole::User => "Student",
                TurnRole::Partner => "Partner",
            };
            format!("{}: {}", who, turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
