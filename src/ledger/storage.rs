//! Storage for the append-only session ledger.
//!
//! Layout: `{data_dir}/ledger.json`, the ordered list of every completed
//! session. The ledger is the sole source of truth for the day number
//! (count + 1). Records are immutable after append except for the mission
//! outcome, which check-in sets exactly once the following day.

use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDate};

use super::models::{MissionOutcome, SessionRecord};
use crate::storage::{load_collection, save_collection, Result, StorageError};

/// Digest returned by `compact` when the ledger has no entries yet
pub const EMPTY_LEDGER_DIGEST: &str = "No completed sessions yet.";

/// Default number of recent entries folded into the context digest
pub const DEFAULT_DIGEST_ENTRIES: usize = 7;

/// Storage for session records
pub struct LedgerStorage {
    ledger_dir: PathBuf,
}

impl LedgerStorage {
    /// Create a new ledger storage, creating the directory if needed
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { ledger_dir: data_dir })
    }

    /// Get the path to the ledger file
    fn ledger_file(&self) -> PathBuf {
        self.ledger_dir.join("ledger.json")
    }

    // ===== Read Operations =====

    /// All records in append order. Corruption degrades to an empty ledger.
    pub fn read_all(&self) -> Vec<SessionRecord> {
        load_collection(&self.ledger_file())
    }

    /// The most recent record, if any
    pub fn last(&self) -> Option<SessionRecord> {
        self.read_all().into_iter().last()
    }

    /// Number of completed sessions
    pub fn count(&self) -> usize {
        self.read_all().len()
    }

    /// The day number the next session will carry
    pub fn day_number(&self) -> u32 {
        self.count() as u32 + 1
    }

    // ===== Write Operations =====

    /// Append a completed session. The day index and completed flag are
    /// stamped here, not by the caller.
    pub fn append(&self, record: SessionRecord) -> Result<SessionRecord> {
        let mut records = self.read_all();

        let mut record = record;
        record.day = records.len() as u32 + 1;
        record.completed = true;

        records.push(record.clone());
        save_collection(&self.ledger_file(), &records)?;

        log::info!("Ledger: appended day {} ({})", record.day, record.concept_label);
        Ok(record)
    }

    /// Set the mission outcome on the most recent record.
    ///
    /// This is the only in-place mutation the ledger permits, and it is
    /// allowed exactly once per record.
    pub fn mutate_last_outcome(&self, outcome: MissionOutcome) -> Result<SessionRecord> {
        let mut records = self.read_all();

        let last = records
            .last_mut()
            .ok_or_else(|| StorageError::NotFound("No session to update".to_string()))?;

        if last.mission_outcome != MissionOutcome::Pending {
            return Err(StorageError::InvalidOperation(format!(
                "Mission outcome for day {} already recorded",
                last.day
            )));
        }

        last.mission_outcome = outcome;
        let updated = last.clone();
        save_collection(&self.ledger_file(), &records)?;
        Ok(updated)
    }

    // ===== Derived Views =====

    /// Condensed text summary of the last `n` sessions for reuse as
    /// generative-call context. Scores and metadata are deliberately left
    /// out to bound the digest size.
    pub fn compact(&self, n: usize) -> String {
        let records = self.read_all();
        if records.is_empty() {
            return EMPTY_LEDGER_DIGEST.to_string();
        }

        // Only concept, weakness, and mission outcome: scores and the rest
        // of the metadata stay out to bound the digest size.
        let start = records.len().saturating_sub(n);
        let lines: Vec<String> = records[start..]
            .iter()
            .map(|r| {
                format!(
                    "- {}: weakness: {}; mission: {}",
                    r.concept_label,
                    r.weakness_summary,
                    r.mission_outcome.as_str()
                )
            })
            .collect();

        lines.join("\n")
    }

    /// Consecutive training days ending at the most recent record.
    ///
    /// Returns 0 when the most recent record is more than one day old;
    /// any gap of 2+ calendar days breaks the count.
    pub fn streak(&self) -> u32 {
        self.streak_on(Local::now().date_naive())
    }

    fn streak_on(&self, today: NaiveDate) -> u32 {
        let records = self.read_all();
        let Some(last) = records.last() else {
            return 0;
        };

        if today - last.date > Duration::days(1) {
            return 0;
        }

        let mut streak = 1u32;
        let mut prev = last.date;

        for record in records.iter().rev().skip(1) {
            if prev - record.date > Duration::days(1) {
                break;
            }
            if record.date < prev {
                streak += 1;
            }
            prev = record.date;
        }

        streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::SessionScores;
    use tempfile::TempDir;

    fn create_test_storage() -> (LedgerStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path().to_path_buf()).unwrap();
        (storage, temp_dir)
    }

    fn record_on(date: NaiveDate) -> SessionRecord {
        SessionRecord {
            day: 0,
            date,
            concept_id: "warm-openers".to_string(),
            concept_label: "Warm Openers".to_string(),
            domain: "calibration".to_string(),
            persona: "The Skeptic".to_string(),
            difficulty: 2,
            scores: SessionScores::uniform(3),
            weakness_summary: "rushed transitions".to_string(),
            key_moment: "recovered after a cold open".to_string(),
            mission: "Open one conversation in line today".to_string(),
            mission_outcome: MissionOutcome::Pending,
            control_tokens_used: Vec::new(),
            completed: false,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_append_assigns_day_numbers() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.day_number(), 1);

        let first = storage.append(record_on(date("2026-03-01"))).unwrap();
        let second = storage.append(record_on(date("2026-03-02"))).unwrap();

        assert_eq!(first.day, 1);
        assert_eq!(second.day, 2);
        assert!(second.completed);
        assert_eq!(storage.day_number(), 3);
    }

    #[test]
    fn test_compact_empty_sentinel() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.compact(7), EMPTY_LEDGER_DIGEST);
    }

    #[test]
    fn test_compact_bounds_and_content() {
        let (storage, _temp) = create_test_storage();
        for i in 1..=10 {
            let mut record = record_on(date(&format!("2026-03-{:02}", i)));
            record.weakness_summary = format!("weakness number {}", i);
            storage.append(record).unwrap();
        }

        let digest = storage.compact(3);
        assert_eq!(digest.lines().count(), 3);
        assert!(digest.contains("weakness number 10"));
        assert!(!digest.contains("weakness number 7"));
        // The digest carries concept, weakness, and outcome only
        assert!(!digest.to_lowercase().contains("technique"));
        assert!(digest.contains("Warm Openers"));
        assert!(digest.contains("mission: pending"));
    }

    #[test]
    fn test_mutate_last_outcome_once() {
        let (storage, _temp) = create_test_storage();
        storage.append(record_on(date("2026-03-01"))).unwrap();

        let updated = storage
            .mutate_last_outcome(MissionOutcome::ExecutedClear)
            .unwrap();
        assert_eq!(updated.mission_outcome, MissionOutcome::ExecutedClear);

        // Second mutation is refused
        let err = storage.mutate_last_outcome(MissionOutcome::Skipped);
        assert!(matches!(err, Err(StorageError::InvalidOperation(_))));
    }

    #[test]
    fn test_mutate_outcome_on_empty_ledger() {
        let (storage, _temp) = create_test_storage();
        let err = storage.mutate_last_outcome(MissionOutcome::Skipped);
        assert!(matches!(err, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_streak_consecutive_days() {
        let (storage, _temp) = create_test_storage();
        for day in ["2026-03-01", "2026-03-02", "2026-03-03"] {
            storage.append(record_on(date(day))).unwrap();
        }
        assert_eq!(storage.streak_on(date("2026-03-03")), 3);
        // Still intact the morning after
        assert_eq!(storage.streak_on(date("2026-03-04")), 3);
    }

    #[test]
    fn test_streak_broken_by_gap() {
        let (storage, _temp) = create_test_storage();
        for day in ["2026-03-01", "2026-03-02", "2026-03-05", "2026-03-06"] {
            storage.append(record_on(date(day))).unwrap();
        }
        assert_eq!(storage.streak_on(date("2026-03-06")), 2);
    }

    #[test]
    fn test_streak_zero_when_stale() {
        let (storage, _temp) = create_test_storage();
        storage.append(record_on(date("2026-03-01"))).unwrap();
        assert_eq!(storage.streak_on(date("2026-03-04")), 0);
    }

    #[test]
    fn test_corrupt_ledger_reads_empty() {
        let (storage, temp) = create_test_storage();
        std::fs::write(temp.path().join("ledger.json"), "][ garbage").unwrap();
        assert!(storage.read_all().is_empty());
        assert_eq!(storage.day_number(), 1);
    }
}
