//! SM-2 derived review scheduling.
//!
//! Unlike card-grade SM-2 this operates on the mean of a session's five
//! score dimensions (1.0-5.0) rather than a 0-5 recall grade:
//! - avg >= 4: the concept is landing; grow the ease and the interval
//! - 3 <= avg < 4: hold the ease, grow the interval
//! - avg < 3: shrink the ease and fall back to a one-day interval

use chrono::{Duration, NaiveDate};

use super::models::{
    ReviewScheduleEntry, MAX_EASE_FACTOR, MIN_EASE_FACTOR, SEED_EASE_FACTOR,
};

/// Compute the updated schedule entry for one practice of a concept.
///
/// `previous` is `None` on first practice, which seeds the ease factor and
/// picks the starting interval from the score band alone.
pub fn apply_practice(
    previous: Option<&ReviewScheduleEntry>,
    concept_id: &str,
    average: f32,
    today: NaiveDate,
) -> ReviewScheduleEntry {
    let (ease_factor, interval, practice_count) = match previous {
        None => {
            let interval = if average >= 4.0 {
                7
            } else if average >= 3.0 {
                3
            } else {
                1
            };
            (SEED_EASE_FACTOR, interval, 1)
        }
        Some(prev) => {
            let (ease, interval) = if average >= 4.0 {
                let ease = (prev.ease_factor * 1.3).min(MAX_EASE_FACTOR);
                (ease, grow_interval(prev.interval, ease))
            } else if average >= 3.0 {
                (prev.ease_factor, grow_interval(prev.interval, prev.ease_factor))
            } else {
                ((prev.ease_factor * 0.8).max(MIN_EASE_FACTOR), 1)
            };
            (ease, interval, prev.practice_count + 1)
        }
    };

    ReviewScheduleEntry {
        concept_id: concept_id.to_string(),
        last_practiced: today,
        ease_factor,
        interval,
        next_review: today + Duration::days(interval),
        practice_count,
        last_average: average,
    }
}

/// Interval growth never produces less than one day
fn grow_interval(interval: i64, ease_factor: f32) -> i64 {
    ((interval as f32 * ease_factor).round() as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_first_practice_strong() {
        let today = date("2026-03-01");
        let entry = apply_practice(None, "warm-openers", 4.2, today);

        assert!((entry.ease_factor - 2.5).abs() < f32::EPSILON);
        assert_eq!(entry.interval, 7);
        assert_eq!(entry.next_review, date("2026-03-08"));
        assert_eq!(entry.practice_count, 1);
    }

    #[test]
    fn test_first_practice_middle_and_weak() {
        let today = date("2026-03-01");
        assert_eq!(apply_practice(None, "c", 3.4, today).interval, 3);
        assert_eq!(apply_practice(None, "c", 2.0, today).interval, 1);
    }

    #[test]
    fn test_second_practice_strong_grows_ease_and_interval() {
        let first = apply_practice(None, "warm-openers", 4.2, date("2026-03-01"));
        let second = apply_practice(Some(&first), "warm-openers", 4.5, date("2026-03-08"));

        assert!((second.ease_factor - 3.25).abs() < 0.001);
        assert_eq!(second.interval, 23); // round(7 * 3.25)
        assert_eq!(second.next_review, date("2026-03-31"));
        assert_eq!(second.practice_count, 2);
    }

    #[test]
    fn test_middle_band_holds_ease() {
        let first = apply_practice(None, "c", 4.2, date("2026-03-01"));
        let second = apply_practice(Some(&first), "c", 3.2, date("2026-03-08"));

        assert!((second.ease_factor - 2.5).abs() < f32::EPSILON);
        assert_eq!(second.interval, 18); // round(7 * 2.5)
    }

    #[test]
    fn test_weak_practice_resets_interval() {
        let first = apply_practice(None, "c", 4.2, date("2026-03-01"));
        let second = apply_practice(Some(&first), "c", 2.4, date("2026-03-08"));

        assert!((second.ease_factor - 2.0).abs() < 0.001);
        assert_eq!(second.interval, 1);
        assert_eq!(second.next_review, date("2026-03-09"));
    }

    #[test]
    fn test_ease_stays_bounded_over_long_runs() {
        let today = date("2026-03-01");
        let mut entry = apply_practice(None, "c", 5.0, today);
        for i in 1..40 {
            let day = today + Duration::days(i);
            entry = apply_practice(Some(&entry), "c", 5.0, day);
            assert!(entry.ease_factor <= MAX_EASE_FACTOR);
            assert!(entry.next_review >= day + Duration::days(1));
        }
        let mut entry = apply_practice(None, "c", 1.0, today);
        for i in 1..40 {
            let day = today + Duration::days(i);
            entry = apply_practice(Some(&entry), "c", 1.0, day);
            assert!(entry.ease_factor >= MIN_EASE_FACTOR);
            assert!(entry.next_review >= day + Duration::days(1));
        }
    }
}
