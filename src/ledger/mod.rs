//! Append-only journal of completed training sessions

mod models;
mod storage;

pub use models::{ControlToken, MissionOutcome, SessionRecord, SessionScores};
pub use storage::{LedgerStorage, DEFAULT_DIGEST_ENTRIES, EMPTY_LEDGER_DIGEST};
