use crate::events::{emit, ProgressSink, StudyEvent};
use crate::repo::Repository;
use crate::retry::{read_with_retry, write_once};
use crate::scheduler::{review, ReviewOutcome};
use crate::selector::{deck_stats, due_cards_limited, DeckStats};
use crate::{CardId, CoreError, DayBoundary, DeckCard, DeckId, Quality, RetryPolicy, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Flashcard review flow: due-card selection and review submission against a
/// [`Repository`].
pub struct ReviewService {
    repo: Arc<dyn Repository>,
    sink: Arc<dyn ProgressSink>,
    boundary: DayBoundary,
    retry: RetryPolicy,
}

impl ReviewService {
    pub fn new(repo: Arc<dyn Repository>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            repo,
            sink,
            boundary: DayBoundary::utc(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_boundary(mut self, boundary: DayBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn boundary(&self) -> DayBoundary {
        self.boundary
    }

    pub async fn due_cards(&self, deck_id: DeckId, now: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<DeckCard>, CoreError> {
        let cards = read_with_retry(&self.retry, "deck cards", || self.repo.list_deck_cards(deck_id)).await?;
        Ok(due_cards_limited(&cards, now, self.boundary, limit))
    }

    pub async fn deck_stats(&self, deck_id: DeckId, now: DateTime<Utc>) -> Result<DeckStats, CoreError> {
        let cards = read_with_retry(&self.retry, "deck cards", || self.repo.list_deck_cards(deck_id)).await?;
        Ok(deck_stats(&cards, now, self.boundary))
    }

    /// Runs one SM-2 step for `card_id` and persists it. Concurrent reviews
    /// of the same card are applied one after the other: a stale save is
    /// retried against the fresh schedule.
    pub async fn submit_review(
        &self,
        user: UserId,
        card_id: CardId,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, CoreError> {
        let card = read_with_retry(&self.retry, "card", || self.repo.get_card(card_id)).await?;

        for attempt in 1..=self.retry.cas_attempts.max(1) {
            let schedule = read_with_retry(&self.retry, "card schedule", || self.repo.get_schedule(card_id)).await?;
            let mut outcome = review(&schedule, quality, now, self.boundary);

            match write_once(&self.retry, "save card schedule", self.repo.save_schedule(&outcome.updated)).await {
                Ok(version) => {
                    outcome.updated.version = version;
                    debug!(
                        %card_id,
                        quality = quality.value(),
                        interval = outcome.updated.interval_days,
                        next = %outcome.updated.next_review_date,
                        "review submitted"
                    );
                    let event = StudyEvent::CardReviewed {
                        user_id: user,
                        card_id,
                        deck_id: card.deck_id,
                        quality,
                        passed: quality.is_passing(),
                        reviewed_at: now,
                    };
                    emit(self.sink.as_ref(), event).await;
                    return Ok(outcome);
                }
                Err(CoreError::VersionConflict(_)) => {
                    debug!(%card_id, attempt, "card schedule changed underneath, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::Conflict("card is being reviewed concurrently"))
    }
}
