use crate::{CardId, CardSchedule, DayBoundary, DeckCard, EF_DEFAULT};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Anything that carries a schedule can be selected for review.
pub trait Schedulable {
    fn schedule(&self) -> &CardSchedule;

    fn card_id(&self) -> CardId {
        self.schedule().card_id
    }

    fn is_suspended(&self) -> bool {
        false
    }
}

impl Schedulable for CardSchedule {
    fn schedule(&self) -> &CardSchedule {
        self
    }
}

impl Schedulable for DeckCard {
    fn schedule(&self) -> &CardSchedule {
        &self.schedule
    }

    fn is_suspended(&self) -> bool {
        self.card.suspended
    }
}

pub fn is_due<T: Schedulable>(item: &T, today: NaiveDate) -> bool {
    !item.is_suspended() && item.schedule().next_review_date <= today
}

/// Cards due at `now`, most overdue first, ties broken by card id.
pub fn due_cards<T: Schedulable + Clone>(cards: &[T], now: DateTime<Utc>, boundary: DayBoundary) -> Vec<T> {
    let today = boundary.date_of(now);
    let mut due: Vec<T> = cards.iter().filter(|c| is_due(*c, today)).cloned().collect();
    due.sort_by_key(|c| (c.schedule().next_review_date, c.card_id()));
    due
}

pub fn due_cards_limited<T: Schedulable + Clone>(
    cards: &[T],
    now: DateTime<Utc>,
    boundary: DayBoundary,
    limit: Option<usize>,
) -> Vec<T> {
    let mut due = due_cards(cards, now, boundary);
    if let Some(max) = limit {
        due.truncate(max);
    }
    due
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckStats {
    pub total: usize,
    pub new: usize,
    pub due: usize,
    pub mastered: usize,
    pub suspended: usize,
    /// Mean ease factor over all cards; the starting ease for an empty deck.
    pub average_ease_factor: f64,
}

pub fn deck_stats(cards: &[DeckCard], now: DateTime<Utc>, boundary: DayBoundary) -> DeckStats {
    let today = boundary.date_of(now);
    let mut stats = DeckStats::default();
    let mut ease_sum = 0.0;
    for c in cards {
        stats.total += 1;
        ease_sum += c.schedule.ease_factor;
        if c.card.suspended {
            stats.suspended += 1;
        }
        if c.schedule.is_new() {
            stats.new += 1;
        }
        if is_due(c, today) {
            stats.due += 1;
        }
        if c.schedule.is_mastered() {
            stats.mastered += 1;
        }
    }
    stats.average_ease_factor = if stats.total == 0 {
        EF_DEFAULT
    } else {
        ease_sum / stats.total as f64
    };
    stats
}
