use crate::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type DeckId = Uuid;
pub type CardId = Uuid;
pub type UserId = Uuid;

pub const EF_MIN: f64 = 1.3;
pub const EF_DEFAULT: f64 = 2.5;
/// Cards at or beyond this interval count as mastered.
pub const MASTERED_INTERVAL_DAYS: u32 = 21;

/// Self-reported recall quality, 0 (blackout) through 5 (perfect recall).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, CoreError> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(CoreError::InvalidQuality(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_passing(self) -> bool {
        self.0 >= 3
    }
}

impl TryFrom<i64> for Quality {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Quality::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

/// The four buttons the review screen offers. Qualities 0 and 3 are valid
/// for the scheduler but have no button.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewButton {
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewButton {
    pub fn quality(self) -> Quality {
        match self {
            ReviewButton::Again => Quality(1),
            ReviewButton::Hard => Quality(2),
            ReviewButton::Good => Quality(4),
            ReviewButton::Easy => Quality(5),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1" | "a" | "again" => Some(ReviewButton::Again),
            "2" | "h" | "hard" => Some(ReviewButton::Hard),
            "3" | "g" | "good" => Some(ReviewButton::Good),
            "4" | "e" | "easy" => Some(ReviewButton::Easy),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Card content. Scheduling state lives in [`CardSchedule`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    pub hint: Option<String>,
    pub tags: Vec<String>,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(deck_id: DeckId, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            deck_id,
            front: front.into(),
            back: back.into(),
            hint: None,
            tags: Vec::new(),
            suspended: false,
            created_at: Utc::now(),
        }
    }
}

/// SM-2 state for one card.
///
/// `version` is bumped by the store on every successful save and is used as
/// a compare-and-swap token so two reviews of the same card cannot overwrite
/// each other.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CardSchedule {
    pub card_id: CardId,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub next_review_date: NaiveDate,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub last_quality: Option<Quality>,
    #[serde(default)]
    pub version: u64,
}

impl CardSchedule {
    /// Default state of a freshly created card: due on `today`.
    pub fn new(card_id: CardId, today: NaiveDate) -> Self {
        Self {
            card_id,
            ease_factor: EF_DEFAULT,
            interval_days: 0,
            repetitions: 0,
            next_review_date: today,
            last_reviewed_at: None,
            last_quality: None,
            version: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.last_reviewed_at.is_none()
    }

    pub fn is_mastered(&self) -> bool {
        self.interval_days >= MASTERED_INTERVAL_DAYS
    }
}

/// A card joined with its schedule, as the selector and review loop see it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeckCard {
    pub card: Card,
    pub schedule: CardSchedule,
}
