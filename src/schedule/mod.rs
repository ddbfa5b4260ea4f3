//! Spaced-repetition review scheduling for practiced concepts

mod algorithm;
mod models;
mod storage;

pub use algorithm::apply_practice;
pub use models::{
    ReviewScheduleEntry, ScheduleSummary, MAX_EASE_FACTOR, MIN_EASE_FACTOR, SEED_EASE_FACTOR,
};
pub use storage::ScheduleStorage;
