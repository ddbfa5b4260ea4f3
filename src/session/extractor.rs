//! Structured extraction from generated text.
//!
//! The generative service is asked to emit a fixed "HEADER:" line grammar;
//! everything here parses that grammar into typed results with per-field
//! defaults. These functions are pure and never fail: a malformed response
//! degrades field by field, it does not surface an error.
//!
//! The fallback score computation lives here too. It is used only when the
//! external call itself failed (not when it returned malformed text) and
//! derives a complete, schema-valid score set from session activity alone.

use regex::Regex;

use crate::ledger::SessionScores;

/// Placeholder for a narrative field the response did not contain
pub const UNEXTRACTED: &str = "(unable to extract)";

/// Parsed debrief response
#[derive(Debug, Clone)]
pub struct DebriefOutcome {
    pub scores: SessionScores,
    pub weakness_summary: String,
    pub key_moment: String,
}

/// Parsed mission response
#[derive(Debug, Clone)]
pub struct MissionBrief {
    pub directive: String,
    pub rationale: String,
}

/// Parsed retrieval-check evaluation
#[derive(Debug, Clone)]
pub struct ReadinessVerdict {
    pub ready: bool,
    pub feedback: String,
}

/// Counters describing what actually happened during roleplay, used by the
/// fallback score computation
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleplayActivity {
    pub total_turns: usize,
    pub user_turns: usize,
    pub used_coach: bool,
    pub used_skip: bool,
}

// ===== Debrief =====

/// Extract scores and narrative fields from a debrief response.
///
/// Score lines follow a "name: digit" grammar inside the SCORES section;
/// a dimension that is missing or outside 1-5 defaults to 3. Narrative
/// sub-sections that cannot be located yield the placeholder text.
pub fn extract_debrief(text: &str) -> DebriefOutcome {
    let scores_section = named_section(text, "SCORES").unwrap_or_else(|| text.to_string());

    let scores = SessionScores {
        technique_application: score_line(&scores_section, r"technique[\s_-]*application"),
        tactical_awareness: score_line(&scores_section, r"tactical[\s_-]*awareness"),
        frame_control: score_line(&scores_section, r"frame[\s_-]*control"),
        emotional_regulation: score_line(&scores_section, r"emotional[\s_-]*regulation"),
        strategic_outcome: score_line(&scores_section, r"strategic[\s_-]*outcome"),
    };

    DebriefOutcome {
        scores,
        weakness_summary: named_section(text, "WEAKNESS")
            .unwrap_or_else(|| UNEXTRACTED.to_string()),
        key_moment: named_section(text, "KEY MOMENT")
            .unwrap_or_else(|| UNEXTRACTED.to_string()),
    }
}

// ===== Mission =====

/// Extract the mission directive and rationale
pub fn extract_mission(text: &str) -> MissionBrief {
    MissionBrief {
        directive: named_section(text, "MISSION").unwrap_or_else(|| UNEXTRACTED.to_string()),
        rationale: named_section(text, "WHY").unwrap_or_else(|| UNEXTRACTED.to_string()),
    }
}

// ===== Retrieval check =====

/// Extract the readiness verdict from a retrieval-check evaluation.
///
/// The verdict is an explicit `VERDICT: ready|again` line; anything else,
/// including a missing line, reads as not ready.
pub fn extract_readiness(text: &str) -> ReadinessVerdict {
    let re = Regex::new(r"(?im)^\s*VERDICT\s*:\s*(ready|again)\b").unwrap();
    let ready = re
        .captures(text)
        .map(|c| c[1].eq_ignore_ascii_case("ready"))
        .unwrap_or(false);

    let feedback = named_section(text, "FEEDBACK").unwrap_or_else(|| {
        let stripped = strip_header_lines(text);
        if stripped.is_empty() {
            UNEXTRACTED.to_string()
        } else {
            stripped
        }
    });

    ReadinessVerdict { ready, feedback }
}

// ===== Fallback scoring =====

/// Deterministic score set derived from session activity, used only when
/// the debrief call itself failed
pub fn fallback_scores(activity: &RoleplayActivity) -> SessionScores {
    let base = (2
        + i32::from(activity.user_turns > 4)
        + i32::from(activity.used_coach)
        - i32::from(activity.used_skip))
    .clamp(1, 5);

    SessionScores {
        technique_application: (base - i32::from(activity.total_turns < 4)).max(1),
        tactical_awareness: base,
        frame_control: (base - i32::from(activity.used_skip)).max(1),
        emotional_regulation: (base + i32::from(activity.user_turns > 6)).min(5),
        strategic_outcome: (base - i32::from(activity.total_turns < 6)).max(1),
    }
}

// ===== Line grammar helpers =====

/// Read a "name: digit" score line, defaulting to 3 when absent or invalid
fn score_line(section: &str, name_pattern: &str) -> i32 {
    let re = Regex::new(&format!(r"(?im)^\s*{}\s*:\s*(\d+)", name_pattern)).unwrap();
    re.captures(section)
        .and_then(|c| c[1].parse::<i32>().ok())
        .filter(|v| (1..=5).contains(v))
        .unwrap_or(3)
}

/// Capture the body of a `HEADER:` section, ending at the next all-caps
/// header line or end of text. The terminator stays case-sensitive so
/// lowercase "name: digit" score lines never end a section early.
fn named_section(text: &str, header: &str) -> Option<String> {
    let pattern = format!(
        r"(?ms)^\s*(?i:{})\s*:\s*(.*?)(?=^\s*[A-Z][A-Z ]{{2,}}\s*:|\z)",
        regex::escape(header)
    );
    let re = Regex::new(&pattern).unwrap();
    re.captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Drop header-grammar lines, keeping any free prose
fn strip_header_lines(text: &str) -> String {
    let header_re = Regex::new(r"^\s*[A-Z][A-Z ]{2,}\s*:").unwrap();
    text.lines()
        .filter(|line| !header_re.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
