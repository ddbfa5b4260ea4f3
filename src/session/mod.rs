//! The session lifecycle: phase state machine, typed phase requests, and
//! structured extraction of generated output

mod controller;
mod extractor;
mod models;

pub use controller::{PhaseController, SessionError};
pub use extractor::{
    extract_debrief, extract_mission, extract_readiness, fallback_scores, DebriefOutcome,
    MissionBrief, ReadinessVerdict, RoleplayActivity, UNEXTRACTED,
};
pub use models::*;
