use crate::{
    Card, CardId, CardSchedule, CoreError, Deck, DeckCard, DeckId, ExamQuestion, ExamSession, QuestionFilter,
    QuestionId, SessionId, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryRepo {
    decks: RwLock<HashMap<DeckId, Deck>>,
    cards: RwLock<HashMap<CardId, Card>>,
    schedules: RwLock<HashMap<CardId, CardSchedule>>,
    sessions: RwLock<HashMap<SessionId, ExamSession>>,
    questions: RwLock<HashMap<QuestionId, ExamQuestion>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repo::Repository for MemoryRepo {
    async fn create_deck(&self, name: &str) -> Result<Deck, CoreError> {
        let deck = Deck::new(name);
        let mut m = self.decks.write();
        if m.values().any(|d| d.name.eq_ignore_ascii_case(name)) {
            return Err(CoreError::Conflict("deck name already exists"));
        }
        m.insert(deck.id, deck.clone());
        Ok(deck)
    }

    async fn get_deck(&self, id: DeckId) -> Result<Deck, CoreError> {
        self.decks
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("deck"))
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, CoreError> {
        Ok(self.decks.read().values().cloned().collect())
    }

    async fn delete_deck(&self, id: DeckId) -> Result<(), CoreError> {
        self.decks
            .write()
            .remove(&id)
            .ok_or(CoreError::NotFound("deck"))?;
        let mut cards = self.cards.write();
        let mut schedules = self.schedules.write();
        cards.retain(|cid, c| {
            let keep = c.deck_id != id;
            if !keep {
                schedules.remove(cid);
            }
            keep
        });
        Ok(())
    }

    async fn add_card(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
        due: NaiveDate,
    ) -> Result<Card, CoreError> {
        if !self.decks.read().contains_key(&deck_id) {
            return Err(CoreError::NotFound("deck"));
        }
        let mut card = Card::new(deck_id, front, back);
        card.hint = hint.map(|s| s.to_string());
        card.tags = tags.to_vec();
        let mut cards = self.cards.write();
        let mut schedules = self.schedules.write();
        schedules.insert(card.id, CardSchedule::new(card.id, due));
        cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        self.cards
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("card"))
    }

    async fn list_cards(&self, deck_id: Option<DeckId>) -> Result<Vec<Card>, CoreError> {
        let cards = self.cards.read();
        let mut v: Vec<Card> = cards.values().cloned().collect();
        if let Some(did) = deck_id {
            v.retain(|c| c.deck_id == did);
        }
        Ok(v)
    }

    async fn update_card(&self, card: &Card) -> Result<Card, CoreError> {
        let mut m = self.cards.write();
        if !m.contains_key(&card.id) {
            return Err(CoreError::NotFound("card"));
        }
        m.insert(card.id, card.clone());
        Ok(card.clone())
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.cards
            .write()
            .remove(&id)
            .ok_or(CoreError::NotFound("card"))?;
        self.schedules.write().remove(&id);
        Ok(())
    }

    async fn set_suspended(&self, id: CardId, suspended: bool) -> Result<(), CoreError> {
        let mut m = self.cards.write();
        let Some(card) = m.get_mut(&id) else {
            return Err(CoreError::NotFound("card"));
        };
        card.suspended = suspended;
        Ok(())
    }

    async fn get_schedule(&self, card_id: CardId) -> Result<CardSchedule, CoreError> {
        self.schedules
            .read()
            .get(&card_id)
            .cloned()
            .ok_or(CoreError::NotFound("card schedule"))
    }

    async fn list_deck_cards(&self, deck_id: DeckId) -> Result<Vec<DeckCard>, CoreError> {
        if !self.decks.read().contains_key(&deck_id) {
            return Err(CoreError::NotFound("deck"));
        }
        let cards = self.cards.read();
        let schedules = self.schedules.read();
        Ok(cards
            .values()
            .filter(|c| c.deck_id == deck_id)
            .filter_map(|c| {
                schedules.get(&c.id).map(|s| DeckCard {
                    card: c.clone(),
                    schedule: s.clone(),
                })
            })
            .collect())
    }

    async fn save_schedule(&self, schedule: &CardSchedule) -> Result<u64, CoreError> {
        let mut m = self.schedules.write();
        let Some(stored) = m.get_mut(&schedule.card_id) else {
            return Err(CoreError::NotFound("card schedule"));
        };
        if stored.version != schedule.version {
            return Err(CoreError::VersionConflict("card schedule"));
        }
        let next = schedule.version + 1;
        *stored = CardSchedule {
            version: next,
            ..schedule.clone()
        };
        Ok(next)
    }
}

#[async_trait]
impl crate::repo::SessionStore for MemoryRepo {
    async fn insert_session(&self, session: &ExamSession) -> Result<(), CoreError> {
        let mut m = self.sessions.write();
        if m.contains_key(&session.id) {
            return Err(CoreError::Conflict("exam session already exists"));
        }
        m.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<ExamSession, CoreError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("exam session"))
    }

    async fn save_session(&self, session: &ExamSession) -> Result<u64, CoreError> {
        let mut m = self.sessions.write();
        let Some(stored) = m.get_mut(&session.id) else {
            return Err(CoreError::NotFound("exam session"));
        };
        if stored.version != session.version {
            return Err(CoreError::VersionConflict("exam session"));
        }
        let mut next = session.clone();
        next.version += 1;
        let version = next.version;
        *stored = next;
        Ok(version)
    }

    async fn list_sessions(&self, owner: UserId) -> Result<Vec<ExamSession>, CoreError> {
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|s| s.owner_id == owner)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl crate::repo::QuestionBank for MemoryRepo {
    async fn upsert_question(&self, question: &ExamQuestion) -> Result<(), CoreError> {
        question.validate()?;
        self.questions.write().insert(question.id, question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<ExamQuestion, CoreError> {
        self.questions
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("question"))
    }

    async fn find_questions(&self, filter: &QuestionFilter) -> Result<Vec<ExamQuestion>, CoreError> {
        Ok(self
            .questions
            .read()
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }
}
