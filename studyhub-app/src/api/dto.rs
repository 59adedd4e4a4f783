use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use studyhub_core::{
    Card, Category, DeckCard, Difficulty, ExamCriteria, ExamResult, ExamSession, ExamStatus, ReviewOutcome,
};
use uuid::Uuid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckOut {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct DeckIn {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CardIn {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardOut {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub front: String,
    pub back: String,
    pub hint: Option<String>,
    pub tags: Vec<String>,
    pub suspended: bool,
}

impl From<Card> for CardOut {
    fn from(c: Card) -> Self {
        Self {
            id: c.id,
            deck_id: c.deck_id,
            front: c.front,
            back: c.back,
            hint: c.hint,
            tags: c.tags,
            suspended: c.suspended,
        }
    }
}

/// A due card as the review screen first shows it: no answer.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCardOut {
    pub card_id: Uuid,
    pub front: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub tags: Vec<String>,
    pub next_review_date: NaiveDate,
}

impl From<DeckCard> for DueCardOut {
    fn from(dc: DeckCard) -> Self {
        Self {
            card_id: dc.card.id,
            front: dc.card.front,
            hint: dc.card.hint,
            tags: dc.card.tags,
            next_review_date: dc.schedule.next_review_date,
        }
    }
}

#[derive(Deserialize)]
pub struct DueQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIn {
    pub card_id: Uuid,
    pub quality: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOut {
    pub card_id: Uuid,
    pub quality: u8,
    pub new_interval: u32,
    pub new_ease_factor: f64,
    pub next_review_date: NaiveDate,
    pub message: String,
}

impl From<ReviewOutcome> for ReviewOut {
    fn from(o: ReviewOutcome) -> Self {
        Self {
            card_id: o.updated.card_id,
            quality: o.quality.value(),
            new_interval: o.updated.interval_days,
            new_ease_factor: o.updated.ease_factor,
            next_review_date: o.updated.next_review_date,
            message: o.message(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExamIn {
    pub question_count: usize,
    #[serde(default)]
    pub time_limit_minutes: u32,
    #[serde(default)]
    pub category_filter: Option<Category>,
    #[serde(default)]
    pub difficulty_filter: Option<Difficulty>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl StartExamIn {
    pub fn criteria(&self) -> ExamCriteria {
        ExamCriteria {
            question_count: self.question_count,
            time_limit_minutes: self.time_limit_minutes,
            category_filter: self.category_filter,
            difficulty_filter: self.difficulty_filter,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExamOut {
    pub id: Uuid,
    pub question_count: usize,
    pub time_limit_minutes: u32,
    pub status: ExamStatus,
    pub started_at: DateTime<Utc>,
}

impl From<&ExamSession> for StartExamOut {
    fn from(s: &ExamSession) -> Self {
        Self {
            id: s.id,
            question_count: s.total_questions(),
            time_limit_minutes: s.criteria.time_limit_minutes,
            status: s.status(),
            started_at: s.started_at,
        }
    }
}

/// Where a session stands, without question content.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub id: Uuid,
    pub status: ExamStatus,
    pub question_count: usize,
    pub answered: usize,
    pub time_limit_minutes: u32,
    pub time_remaining_seconds: Option<i64>,
    pub category_filter: Option<Category>,
    pub difficulty_filter: Option<Difficulty>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionOut {
    pub fn new(s: &ExamSession, now: DateTime<Utc>) -> Self {
        let running = !s.status().is_terminal();
        Self {
            id: s.id,
            status: s.status(),
            question_count: s.total_questions(),
            answered: s.current_index(),
            time_limit_minutes: s.criteria.time_limit_minutes,
            time_remaining_seconds: s.time_remaining_seconds(now).filter(|_| running),
            category_filter: s.criteria.category_filter,
            difficulty_filter: s.criteria.difficulty_filter,
            started_at: s.started_at,
            completed_at: s.completed_at(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CompleteIn {
    #[serde(default)]
    pub force: bool,
}

/// Sent instead of feedback when an answer arrives after the deadline.
#[derive(Serialize)]
pub struct ExpiredOut {
    pub expired: bool,
    pub result: ExamResult,
}
