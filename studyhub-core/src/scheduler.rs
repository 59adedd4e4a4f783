use crate::{CardSchedule, DayBoundary, Quality, EF_MIN};
use chrono::{DateTime, Days, NaiveDate, Utc};

#[derive(Clone, Debug)]
pub struct ReviewOutcome {
    pub previous: CardSchedule,
    pub updated: CardSchedule,
    pub quality: Quality,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewOutcome {
    pub fn message(&self) -> String {
        review_message(self.updated.interval_days)
    }
}

fn next_ease(ef: f64, q: Quality) -> f64 {
    let miss = (5 - q.value()) as f64;
    let delta = 0.1 - miss * (0.08 + miss * 0.02);
    (ef + delta).max(EF_MIN)
}

/// One SM-2 step. Pure: the caller supplies the review date.
pub fn advance(schedule: &CardSchedule, quality: Quality, review_date: NaiveDate) -> CardSchedule {
    let new_ef = next_ease(schedule.ease_factor, quality);

    let (new_reps, new_interval) = if !quality.is_passing() {
        (0, 1)
    } else {
        let reps = schedule.repetitions + 1;
        let interval = match reps {
            1 => 1,
            2 => 6,
            _ => {
                let base = schedule.interval_days.max(1) as f64;
                (base * new_ef).round() as u32
            }
        };
        (reps, interval)
    };

    CardSchedule {
        ease_factor: new_ef,
        interval_days: new_interval,
        repetitions: new_reps,
        next_review_date: review_date
            .checked_add_days(Days::new(new_interval as u64))
            .unwrap_or(NaiveDate::MAX),
        last_quality: Some(quality),
        ..schedule.clone()
    }
}

/// Applies a review submitted at `now`, stamping the review time and
/// resolving the review date through `boundary`.
pub fn review(
    schedule: &CardSchedule,
    quality: Quality,
    now: DateTime<Utc>,
    boundary: DayBoundary,
) -> ReviewOutcome {
    let mut updated = advance(schedule, quality, boundary.date_of(now));
    updated.last_reviewed_at = Some(now);
    ReviewOutcome {
        previous: schedule.clone(),
        updated,
        quality,
        reviewed_at: now,
    }
}

pub fn review_message(interval_days: u32) -> String {
    match interval_days {
        0 => "Review again today".to_string(),
        1 => "Review tomorrow".to_string(),
        d if d < 7 => format!("Review in {d} days"),
        d if d < 21 => format!("Review in {} week(s)", d / 7),
        d => format!("Card mastered! Review in {d} days"),
    }
}
