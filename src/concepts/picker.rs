//! Concept and persona selection for a new session.
//!
//! Policy: when the due-set is non-empty, a due review is chosen with fixed
//! probability; otherwise an unpracticed concept, preferring a domain change
//! from the previous session, then same-domain, then a full-pool random pick
//! once everything has been practiced at least once.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;

use super::models::{Concept, Persona};
use crate::schedule::ReviewScheduleEntry;

/// Chance of picking a due review over new material
const REVIEW_PROBABILITY: f64 = 0.3;

/// The concept chosen for today's session
#[derive(Debug, Clone)]
pub struct ConceptSelection {
    pub concept: Concept,
    /// True when the pick came from the due-set
    pub is_review: bool,
}

/// Pick today's concept according to the selection policy
pub fn pick_concept<R: Rng>(
    catalog: &[Concept],
    schedule: &[ReviewScheduleEntry],
    last_domain: Option<&str>,
    today: NaiveDate,
    rng: &mut R,
) -> ConceptSelection {
    // Due reviews win a fixed fraction of sessions
    let mut due: Vec<&ReviewScheduleEntry> =
        schedule.iter().filter(|e| e.is_due(today)).collect();
    due.sort_by(|a, b| a.next_review.cmp(&b.next_review));

    if !due.is_empty() && rng.gen_bool(REVIEW_PROBABILITY) {
        // Most overdue first; skip ids that fell out of the catalog
        for entry in &due {
            if let Some(concept) = catalog.iter().find(|c| c.id == entry.concept_id) {
                return ConceptSelection {
                    concept: concept.clone(),
                    is_review: true,
                };
            }
        }
    }

    let fresh: Vec<&Concept> = catalog
        .iter()
        .filter(|c| !schedule.iter().any(|e| e.concept_id == c.id))
        .collect();

    if !fresh.is_empty() {
        // Prefer switching domains from yesterday's session
        let switched: Vec<&&Concept> = fresh
            .iter()
            .filter(|c| last_domain.map_or(true, |d| c.domain != d))
            .collect();

        let picked = if let Some(concept) = switched.choose(rng) {
            (**concept).clone()
        } else {
            (*fresh.choose(rng).expect("fresh pool is non-empty")).clone()
        };
        return ConceptSelection {
            concept: picked,
            is_review: false,
        };
    }

    // Everything has been practiced: random reset over the full pool
    let concept = catalog
        .choose(rng)
        .expect("built-in catalog is never empty")
        .clone();
    ConceptSelection {
        concept,
        is_review: false,
    }
}

/// Pick a persona for today's roleplay
pub fn pick_persona<R: Rng>(personas: &[Persona], rng: &mut R) -> Persona {
    personas
        .choose(rng)
        .expect("built-in persona roster is never empty")
        .clone()
}
