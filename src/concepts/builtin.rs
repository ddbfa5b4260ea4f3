//! Built-in Training Catalog
//!
//! The concept pool and persona roster shipped with the engine. Concept ids
//! are stable slugs; the review schedule keys on them, so renaming an id
//! orphans its schedule entry.

use super::models::{Concept, Persona};

/// Create the full built-in concept pool
pub fn get_builtin_concepts() -> Vec<Concept> {
    vec![
        concept(
            "warm-openers",
            "Warm Openers",
            "calibration",
            "Opening a conversation with situational observations instead of canned lines. \
             The first ten seconds only need to establish that talking to you is easy; \
             aim for a remark the other person can answer without effort.",
            "What should the first ten seconds of a conversation establish, and what kind \
             of remark gets you there?",
        ),
        concept(
            "active-calibration",
            "Active Calibration",
            "calibration",
            "Reading verbal and postural feedback mid-conversation and adjusting pace, \
             volume, and topic before the other person has to signal discomfort twice. \
             One missed signal is data; two is a pattern you created.",
            "What is the rule about missed feedback signals, and what three things do you \
             adjust when you catch one?",
        ),
        concept(
            "graceful-exits",
            "Graceful Exits",
            "calibration",
            "Ending an interaction on a high note instead of letting it decay. A good exit \
             names something concrete from the conversation and leaves a clean opening for \
             the next one.",
            "What two things does a good conversation exit contain?",
        ),
        concept(
            "frame-holding",
            "Frame Holding",
            "framing",
            "Keeping your premise intact under pushback without escalating. Restate your \
             frame once in the same calm register; if it gets steamrolled a second time, \
             name the dynamic instead of arguing the content.",
            "When your premise gets pushed back on twice, what do you do differently the \
             second time?",
        ),
        concept(
            "reframing-tests",
            "Reframing Tests",
            "framing",
            "Treating challenges and teasing as bids for a reaction, not attacks. Agreeing \
             and amplifying, or answering the playful layer instead of the literal one, \
             shows the test cost you nothing.",
            "What are two ways to answer a test without defending yourself literally?",
        ),
        concept(
            "assumption-leads",
            "Assumption Leads",
            "framing",
            "Replacing interview questions with playful assumptions the other person can \
             correct. A wrong guess delivered with confidence generates more conversation \
             than a right question.",
            "Why does a confidently wrong assumption outperform an accurate question?",
        ),
        concept(
            "story-spine",
            "Story Spine",
            "storytelling",
            "Structuring an anecdote as setup, tension, payoff in under ninety seconds. \
             Cut every detail that does not feed the tension; land the payoff and stop \
             talking.",
            "What are the three beats of a told-well anecdote, and what is the time budget?",
        ),
        concept(
            "emotional-color",
            "Emotional Color",
            "storytelling",
            "Narrating how moments felt, not just what happened. One emotion word per \
             beat keeps a story alive; zero turns it into a report.",
            "What is the minimum emotional seasoning a story beat needs to not read as a \
             report?",
        ),
        concept(
            "callback-weaving",
            "Callback Weaving",
            "storytelling",
            "Planting small details early and calling them back later to create a sense \
             of shared history inside a single conversation.",
            "What does a callback reuse, and what feeling does it manufacture?",
        ),
        concept(
            "clean-no",
            "Clean No",
            "boundaries",
            "Declining without apology stacking or invented excuses. One honest sentence, \
             one beat of silence, no backfill. The discomfort you tolerate is the boundary \
             itself.",
            "What are the three parts of a clean refusal, and what do you not add after it?",
        ),
        concept(
            "price-naming",
            "Price Naming",
            "boundaries",
            "Stating the cost of a repeated behavior without threatening. Describe the \
             behavior, name what it costs you, say what you will do next time it happens, \
             in one even tone.",
            "What three elements go into naming a price, and what tone carries them?",
        ),
        concept(
            "repair-attempts",
            "Repair Attempts",
            "boundaries",
            "Noticing when a conversation has gone sideways and making the first repair \
             move without surrendering the point. A repair names the mood shift, not the \
             argument.",
            "What does a repair attempt address, and what does it deliberately leave alone?",
        ),
    ]
}

/// Create the built-in persona roster
pub fn get_builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            label: "The Friendly Regular".to_string(),
            description: "Warm, chatty, gives you every opening. Punishes nothing, \
                          rewards momentum."
                .to_string(),
            difficulty: 1,
        },
        Persona {
            label: "The Distracted Colleague".to_string(),
            description: "Half-listening, checks their phone, needs to be earned back \
                          every few exchanges."
                .to_string(),
            difficulty: 2,
        },
        Persona {
            label: "The Skeptic".to_string(),
            description: "Polite but unconvinced. Questions your premises and notices \
                          canned material instantly."
                .to_string(),
            difficulty: 3,
        },
        Persona {
            label: "The Tester".to_string(),
            description: "Playful and provocative. Throws teasing challenges to see \
                          whether you wobble."
                .to_string(),
            difficulty: 3,
        },
        Persona {
            label: "The Brick Wall".to_string(),
            description: "Short answers, no questions back, zero rescue. Everything has \
                          to come from you."
                .to_string(),
            difficulty: 4,
        },
        Persona {
            label: "The Steamroller".to_string(),
            description: "Interrupts, redirects, talks over you. Holding any frame here \
                          is the whole exercise."
                .to_string(),
            difficulty: 5,
        },
    ]
}

fn concept(id: &str, label: &str, domain: &str, summary: &str, recall_question: &str) -> Concept {
    Concept {
        id: id.to_string(),
        label: label.to_string(),
        domain: domain.to_string(),
        summary: summary.to_string(),
        recall_question: recall_question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_ids_are_unique() {
        let concepts = get_builtin_concepts();
        let mut ids: Vec<&str> = concepts.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), concepts.len());
    }

    #[test]
    fn test_every_concept_has_a_recall_question() {
        for concept in get_builtin_concepts() {
            assert!(
                !concept.recall_question.trim().is_empty(),
                "{} has no recall question",
                concept.id
            );
        }
    }

    #[test]
    fn test_persona_difficulties_in_range() {
        for persona in get_builtin_personas() {
            assert!((1..=5).contains(&persona.difficulty));
        }
    }
}
