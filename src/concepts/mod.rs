//! Built-in training catalog and daily concept selection

pub mod builtin;
mod models;
mod picker;

pub use builtin::{get_builtin_concepts, get_builtin_personas};
pub use models::{Concept, Persona};
pub use picker::{pick_concept, pick_persona, ConceptSelection};
