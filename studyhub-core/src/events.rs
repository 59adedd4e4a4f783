use crate::{CardId, CoreError, DeckId, ExamStatus, Quality, SessionId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Facts handed to the progress reporter. Streaks and goals are computed
/// downstream, never here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudyEvent {
    CardReviewed {
        user_id: UserId,
        card_id: CardId,
        deck_id: DeckId,
        quality: Quality,
        passed: bool,
        reviewed_at: DateTime<Utc>,
    },
    ExamFinished {
        user_id: UserId,
        session_id: SessionId,
        status: ExamStatus,
        raw_score: u32,
        total_questions: u32,
        score_percent: u32,
        duration_seconds: Option<i64>,
        finished_at: DateTime<Utc>,
    },
}

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, event: StudyEvent) -> Result<(), CoreError>;
}

/// Publishing is fire-and-forget: a failing sink never fails the review or
/// exam operation that produced the event.
pub async fn emit(sink: &dyn ProgressSink, event: StudyEvent) {
    if let Err(e) = sink.publish(event).await {
        warn!(error = %e, "progress event dropped");
    }
}

/// Writes events to the log.
#[derive(Default)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn publish(&self, event: StudyEvent) -> Result<(), CoreError> {
        match &event {
            StudyEvent::CardReviewed { card_id, quality, passed, .. } => {
                info!(%card_id, quality = quality.value(), passed, "card reviewed")
            }
            StudyEvent::ExamFinished { session_id, status, score_percent, .. } => {
                info!(%session_id, %status, score_percent, "exam finished")
            }
        }
        Ok(())
    }
}

/// Keeps events in memory; used by tests and embedders that poll.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<StudyEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StudyEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl ProgressSink for MemorySink {
    async fn publish(&self, event: StudyEvent) -> Result<(), CoreError> {
        self.events.lock().push(event);
        Ok(())
    }
}
