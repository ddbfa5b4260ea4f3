//! Storage for the review schedule.
//!
//! Layout: `{data_dir}/schedule.json`, one entry per concept ever
//! practiced. Entries are upserted on practice and never deleted.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};

use super::algorithm::apply_practice;
use super::models::{ReviewScheduleEntry, ScheduleSummary};
use crate::storage::{load_collection, save_collection, Result};

/// Storage for review schedule entries
pub struct ScheduleStorage {
    schedule_dir: PathBuf,
}

impl ScheduleStorage {
    /// Create a new schedule storage, creating the directory if needed
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { schedule_dir: data_dir })
    }

    /// Get the path to the schedule file
    fn schedule_file(&self) -> PathBuf {
        self.schedule_dir.join("schedule.json")
    }

    /// All entries. Corruption degrades to an empty schedule.
    pub fn read_all(&self) -> Vec<ReviewScheduleEntry> {
        load_collection(&self.schedule_file())
    }

    /// Look up one concept's entry
    pub fn get(&self, concept_id: &str) -> Option<ReviewScheduleEntry> {
        self.read_all()
            .into_iter()
            .find(|e| e.concept_id == concept_id)
    }

    /// Record a practice of a concept and persist the updated entry
    pub fn record_practice(&self, concept_id: &str, average: f32) -> Result<ReviewScheduleEntry> {
        self.record_practice_on(concept_id, average, Local::now().date_naive())
    }

    fn record_practice_on(
        &self,
        concept_id: &str,
        average: f32,
        today: NaiveDate,
    ) -> Result<ReviewScheduleEntry> {
        let mut entries = self.read_all();

        let previous = entries.iter().find(|e| e.concept_id == concept_id);
        let updated = apply_practice(previous, concept_id, average, today);

        match entries.iter_mut().find(|e| e.concept_id == concept_id) {
            Some(slot) => *slot = updated.clone(),
            None => entries.push(updated.clone()),
        }

        save_collection(&self.schedule_file(), &entries)?;

        log::info!(
            "Schedule: {} practiced (avg {:.1}), next review in {} days",
            concept_id,
            average,
            updated.interval
        );
        Ok(updated)
    }

    /// Concepts whose review date has arrived, most overdue first
    pub fn due_entries(&self, today: NaiveDate) -> Vec<ReviewScheduleEntry> {
        let mut due: Vec<ReviewScheduleEntry> = self
            .read_all()
            .into_iter()
            .filter(|e| e.is_due(today))
            .collect();
        due.sort_by(|a, b| a.next_review.cmp(&b.next_review));
        due
    }

    /// Counts for the status surface
    pub fn summary(&self) -> ScheduleSummary {
        self.summary_on(Local::now().date_naive())
    }

    fn summary_on(&self, today: NaiveDate) -> ScheduleSummary {
        let entries = self.read_all();
        ScheduleSummary {
            tracked_concepts: entries.len(),
            due_count: entries.iter().filter(|e| e.is_due(today)).count(),
            mastered_count: entries.iter().filter(|e| e.is_mastered()).count(),
        }
    }
}
