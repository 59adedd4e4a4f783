use crate::{
    Card, CardId, CardSchedule, CoreError, Deck, DeckCard, DeckId, ExamQuestion, ExamSession, OptionId,
    QuestionFilter, QuestionId, SessionId, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;

pub mod memory;

/// Decks, cards and their schedules.
///
/// `save_schedule` is a compare-and-swap: it succeeds only when the stored
/// schedule still has the `version` the caller read, and returns the new
/// version. A stale version yields `CoreError::VersionConflict`.
#[async_trait]
pub trait Repository: Send + Sync {
    // Decks
    async fn create_deck(&self, name: &str) -> Result<Deck, CoreError>;
    async fn get_deck(&self, id: DeckId) -> Result<Deck, CoreError>;
    async fn list_decks(&self) -> Result<Vec<Deck>, CoreError>;
    async fn delete_deck(&self, id: DeckId) -> Result<(), CoreError>;

    // Cards; a new card gets a default schedule due on `due`
    async fn add_card(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
        due: NaiveDate,
    ) -> Result<Card, CoreError>;

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError>;
    async fn list_cards(&self, deck_id: Option<DeckId>) -> Result<Vec<Card>, CoreError>;
    async fn update_card(&self, card: &Card) -> Result<Card, CoreError>;
    async fn delete_card(&self, id: CardId) -> Result<(), CoreError>;
    async fn set_suspended(&self, id: CardId, suspended: bool) -> Result<(), CoreError>;

    // Schedules
    async fn get_schedule(&self, card_id: CardId) -> Result<CardSchedule, CoreError>;
    async fn list_deck_cards(&self, deck_id: DeckId) -> Result<Vec<DeckCard>, CoreError>;
    async fn save_schedule(&self, schedule: &CardSchedule) -> Result<u64, CoreError>;
}

/// Durable keyed storage for exam sessions.
///
/// `save_session` follows the same compare-and-swap contract as
/// [`Repository::save_schedule`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &ExamSession) -> Result<(), CoreError>;
    async fn get_session(&self, id: SessionId) -> Result<ExamSession, CoreError>;
    async fn save_session(&self, session: &ExamSession) -> Result<u64, CoreError>;
    async fn list_sessions(&self, owner: UserId) -> Result<Vec<ExamSession>, CoreError>;
}

#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Inserts or replaces a question. Sessions already in flight keep
    /// their own snapshot and are unaffected.
    async fn upsert_question(&self, question: &ExamQuestion) -> Result<(), CoreError>;
    async fn get_question(&self, id: QuestionId) -> Result<ExamQuestion, CoreError>;
    async fn find_questions(&self, filter: &QuestionFilter) -> Result<Vec<ExamQuestion>, CoreError>;

    async fn correct_option(&self, id: QuestionId) -> Result<OptionId, CoreError> {
        let q = self.get_question(id).await?;
        q.correct_option()
            .map(|o| o.id)
            .ok_or(CoreError::Invalid("question has no correct option"))
    }
}
