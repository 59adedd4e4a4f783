use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use studyhub_core::repo::{QuestionBank, Repository, SessionStore};
use studyhub_core::{
    Card, CardId, CardSchedule, CoreError, Deck, DeckCard, DeckId, ExamQuestion, ExamSession, Quality,
    QuestionFilter, QuestionId, SessionId, UserId,
};
use tracing::{info, warn};

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(db_err("sqlite connect"))?;
        info!(path = %path.as_ref().display(), "sqlite store opened");
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    /// Private in-memory database. A single connection that is never
    /// recycled, since each connection would otherwise get its own database.
    pub async fn open_memory() -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err("sqlite connect"))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(db_err("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        const STMT: &str = r#"
        CREATE TABLE IF NOT EXISTS decks (
          id          TEXT PRIMARY KEY,
          name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
          created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cards (
          id          TEXT PRIMARY KEY,
          deck_id     TEXT NOT NULL,
          front       TEXT NOT NULL,
          back        TEXT NOT NULL,
          hint        TEXT,
          tags        TEXT NOT NULL,
          suspended   INTEGER NOT NULL DEFAULT 0,
          created_at  TEXT NOT NULL,
          FOREIGN KEY(deck_id) REFERENCES decks(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS card_schedules (
          card_id           TEXT PRIMARY KEY,
          ease_factor       REAL    NOT NULL,
          interval_days     INTEGER NOT NULL,
          repetitions       INTEGER NOT NULL,
          next_review_date  TEXT    NOT NULL,
          last_reviewed_at  TEXT,
          last_quality      INTEGER,
          version           INTEGER NOT NULL DEFAULT 0,
          FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS questions (
          id          TEXT PRIMARY KEY,
          category    TEXT NOT NULL,
          difficulty  TEXT NOT NULL,
          active      INTEGER NOT NULL DEFAULT 1,
          body        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS exam_sessions (
          id          TEXT PRIMARY KEY,
          owner_id    TEXT NOT NULL,
          status      TEXT NOT NULL,
          started_at  TEXT NOT NULL,
          version     INTEGER NOT NULL DEFAULT 0,
          body        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards (deck_id);
        CREATE INDEX IF NOT EXISTS idx_schedules_due ON card_schedules (next_review_date);
        CREATE INDEX IF NOT EXISTS idx_questions_filter ON questions (category, difficulty, active);
        CREATE INDEX IF NOT EXISTS idx_sessions_owner ON exam_sessions (owner_id, started_at);
        "#;

        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(db_err("sqlite schema"))?;
        }
        Ok(())
    }

    async fn schedule_exists(&self, card_id: CardId) -> Result<bool, CoreError> {
        Ok(sqlx::query("SELECT 1 FROM card_schedules WHERE card_id=? LIMIT 1")
            .bind(card_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read schedule"))?
            .is_some())
    }

    async fn session_exists(&self, id: SessionId) -> Result<bool, CoreError> {
        Ok(sqlx::query("SELECT 1 FROM exam_sessions WHERE id=? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read exam session"))?
            .is_some())
    }
}

const CARD_COLUMNS: &str = "id,deck_id,front,back,hint,tags,suspended,created_at";
const SCHEDULE_COLUMNS: &str =
    "card_id,ease_factor,interval_days,repetitions,next_review_date,last_reviewed_at,last_quality,version";

#[async_trait::async_trait]
impl Repository for SqliteRepo {
    async fn create_deck(&self, name: &str) -> Result<Deck, CoreError> {
        let exists = sqlx::query("SELECT 1 FROM decks WHERE lower(name)=lower(?) LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read deck"))?
            .is_some();
        if exists {
            return Err(CoreError::Conflict("deck name already exists"));
        }

        let deck = Deck::new(name);
        sqlx::query("INSERT INTO decks (id,name,created_at) VALUES (?,?,?)")
            .bind(deck.id.to_string())
            .bind(&deck.name)
            .bind(dt_to_str(deck.created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::Conflict("deck name already exists")
                } else {
                    db_err("insert deck")(e)
                }
            })?;
        Ok(deck)
    }

    async fn get_deck(&self, id: DeckId) -> Result<Deck, CoreError> {
        let row = sqlx::query("SELECT id,name,created_at FROM decks WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read deck"))?;
        row_into_deck(row.ok_or(CoreError::NotFound("deck"))?)
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, CoreError> {
        let rows = sqlx::query("SELECT id,name,created_at FROM decks ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list decks"))?;
        rows.into_iter().map(row_into_deck).collect()
    }

    async fn delete_deck(&self, id: DeckId) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("tx"))?;

        // explicit cascade, in case foreign keys are off for this connection
        sqlx::query("DELETE FROM card_schedules WHERE card_id IN (SELECT id FROM cards WHERE deck_id=?)")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err("del schedules"))?;

        sqlx::query("DELETE FROM cards WHERE deck_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err("del cards"))?;

        let res = sqlx::query("DELETE FROM decks WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err("del deck"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("deck"));
        }

        tx.commit().await.map_err(db_err("tx commit"))
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
        let exists = sqlx::query("SELECT 1 FROM decks WHERE id=? LIMIT 1")
            .bind(deck_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read deck"))?
            .is_some();
        if !exists {
            return Err(CoreError::NotFound("deck"));
        }

        let mut card = Card::new(deck_id, front, back);
        card.hint = hint.map(|s| s.to_string());
        card.tags = tags.to_vec();
        let schedule = CardSchedule::new(card.id, due);

        let mut tx = self.pool.begin().await.map_err(db_err("tx"))?;
        sqlx::query("INSERT INTO cards (id,deck_id,front,back,hint,tags,suspended,created_at) VALUES (?,?,?,?,?,?,?,?)")
            .bind(card.id.to_string())
            .bind(card.deck_id.to_string())
            .bind(&card.front)
            .bind(&card.back)
            .bind(card.hint.clone())
            .bind(tags_to_json(&card.tags)?)
            .bind(bool_to_i(card.suspended))
            .bind(dt_to_str(card.created_at))
            .execute(&mut *tx)
            .await
            .map_err(db_err("insert card"))?;
        sqlx::query(
            r#"INSERT INTO card_schedules
               (card_id,ease_factor,interval_days,repetitions,next_review_date,last_reviewed_at,last_quality,version)
               VALUES (?,?,?,?,?,?,?,?)"#,
        )
        .bind(schedule.card_id.to_string())
        .bind(schedule.ease_factor)
        .bind(schedule.interval_days as i64)
        .bind(schedule.repetitions as i64)
        .bind(date_to_str(schedule.next_review_date))
        .bind(schedule.last_reviewed_at.map(dt_to_str))
        .bind(schedule.last_quality.map(|q| q.value() as i64))
        .bind(schedule.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert schedule"))?;
        tx.commit().await.map_err(db_err("tx commit"))?;

        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read card"))?;
        row_into_card(&row.ok_or(CoreError::NotFound("card"))?)
    }

    async fn list_cards(&self, deck_id: Option<DeckId>) -> Result<Vec<Card>, CoreError> {
        let rows = if let Some(did) = deck_id {
            sqlx::query(&format!(
                "SELECT {CARD_COLUMNS} FROM cards WHERE deck_id=? ORDER BY created_at ASC"
            ))
            .bind(did.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list cards"))?
        } else {
            sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY created_at ASC"))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("list cards"))?
        };
        rows.iter().map(row_into_card).collect()
    }

    async fn update_card(&self, card: &Card) -> Result<Card, CoreError> {
        let res = sqlx::query("UPDATE cards SET deck_id=?, front=?, back=?, hint=?, tags=?, suspended=? WHERE id=?")
            .bind(card.deck_id.to_string())
            .bind(&card.front)
            .bind(&card.back)
            .bind(card.hint.clone())
            .bind(tags_to_json(&card.tags)?)
            .bind(bool_to_i(card.suspended))
            .bind(card.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err("update card"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("card"));
        }
        Ok(card.clone())
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("tx"))?;
        sqlx::query("DELETE FROM card_schedules WHERE card_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err("del schedule"))?;
        let res = sqlx::query("DELETE FROM cards WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err("del card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        tx.commit().await.map_err(db_err("tx commit"))
    }

    async fn set_suspended(&self, id: CardId, suspended: bool) -> Result<(), CoreError> {
        let res = sqlx::query("UPDATE cards SET suspended=? WHERE id=?")
            .bind(bool_to_i(suspended))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err("suspend"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("card"));
        }
        Ok(())
    }

    async fn get_schedule(&self, card_id: CardId) -> Result<CardSchedule, CoreError> {
        let row = sqlx::query(&format!("SELECT {SCHEDULE_COLUMNS} FROM card_schedules WHERE card_id=?"))
            .bind(card_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read schedule"))?;
        row_into_schedule(&row.ok_or(CoreError::NotFound("card schedule"))?)
    }

    async fn list_deck_cards(&self, deck_id: DeckId) -> Result<Vec<DeckCard>, CoreError> {
        // make an unknown deck distinguishable from an empty one
        self.get_deck(deck_id).await?;
        let rows = sqlx::query(
            r#"SELECT c.id,c.deck_id,c.front,c.back,c.hint,c.tags,c.suspended,c.created_at,
                      s.card_id,s.ease_factor,s.interval_days,s.repetitions,s.next_review_date,
                      s.last_reviewed_at,s.last_quality,s.version
               FROM cards c JOIN card_schedules s ON s.card_id = c.id
               WHERE c.deck_id=?"#,
        )
        .bind(deck_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list deck cards"))?;
        rows.iter()
            .map(|row| {
                Ok(DeckCard {
                    card: row_into_card(row)?,
                    schedule: row_into_schedule(row)?,
                })
            })
            .collect()
    }

    async fn save_schedule(&self, schedule: &CardSchedule) -> Result<u64, CoreError> {
        let res = sqlx::query(
            r#"UPDATE card_schedules SET
                 ease_factor=?, interval_days=?, repetitions=?, next_review_date=?,
                 last_reviewed_at=?, last_quality=?, version=version+1
               WHERE card_id=? AND version=?"#,
        )
        .bind(schedule.ease_factor)
        .bind(schedule.interval_days as i64)
        .bind(schedule.repetitions as i64)
        .bind(date_to_str(schedule.next_review_date))
        .bind(schedule.last_reviewed_at.map(dt_to_str))
        .bind(schedule.last_quality.map(|q| q.value() as i64))
        .bind(schedule.card_id.to_string())
        .bind(schedule.version as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err("save schedule"))?;
        if res.rows_affected() == 0 {
            return if self.schedule_exists(schedule.card_id).await? {
                Err(CoreError::VersionConflict("card schedule"))
            } else {
                Err(CoreError::NotFound("card schedule"))
            };
        }
        Ok(schedule.version + 1)
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteRepo {
    async fn insert_session(&self, session: &ExamSession) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO exam_sessions (id,owner_id,status,started_at,version,body) VALUES (?,?,?,?,?,?)")
            .bind(session.id.to_string())
            .bind(session.owner_id.to_string())
            .bind(session.status().as_str())
            .bind(dt_to_str(session.started_at))
            .bind(session.version as i64)
            .bind(to_json(session, "encode exam session")?)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::Conflict("exam session already exists")
                } else {
                    db_err("insert exam session")(e)
                }
            })?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<ExamSession, CoreError> {
        let row = sqlx::query("SELECT version,body FROM exam_sessions WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read exam session"))?;
        row_into_session(&row.ok_or(CoreError::NotFound("exam session"))?)
    }

    async fn save_session(&self, session: &ExamSession) -> Result<u64, CoreError> {
        let next = session.version + 1;
        let mut stored = session.clone();
        stored.version = next;
        let res = sqlx::query("UPDATE exam_sessions SET status=?, version=?, body=? WHERE id=? AND version=?")
            .bind(session.status().as_str())
            .bind(next as i64)
            .bind(to_json(&stored, "encode exam session")?)
            .bind(session.id.to_string())
            .bind(session.version as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err("save exam session"))?;
        if res.rows_affected() == 0 {
            return if self.session_exists(session.id).await? {
                Err(CoreError::VersionConflict("exam session"))
            } else {
                Err(CoreError::NotFound("exam session"))
            };
        }
        Ok(next)
    }

    async fn list_sessions(&self, owner: UserId) -> Result<Vec<ExamSession>, CoreError> {
        let rows = sqlx::query("SELECT version,body FROM exam_sessions WHERE owner_id=? ORDER BY started_at DESC")
            .bind(owner.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list exam sessions"))?;
        rows.iter().map(row_into_session).collect()
    }
}

#[async_trait::async_trait]
impl QuestionBank for SqliteRepo {
    async fn upsert_question(&self, question: &ExamQuestion) -> Result<(), CoreError> {
        question.validate()?;
        sqlx::query(
            r#"INSERT INTO questions (id,category,difficulty,active,body) VALUES (?,?,?,?,?)
               ON CONFLICT(id) DO UPDATE SET
                 category=excluded.category, difficulty=excluded.difficulty,
                 active=excluded.active, body=excluded.body"#,
        )
        .bind(question.id.to_string())
        .bind(question.category.as_str())
        .bind(question.difficulty.as_str())
        .bind(bool_to_i(question.active))
        .bind(to_json(question, "encode question")?)
        .execute(&self.pool)
        .await
        .map_err(db_err("upsert question"))?;
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<ExamQuestion, CoreError> {
        let row = sqlx::query("SELECT body FROM questions WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("read question"))?;
        let row = row.ok_or(CoreError::NotFound("question"))?;
        from_json(&row.get::<String, _>("body"), "decode question")
    }

    async fn find_questions(&self, filter: &QuestionFilter) -> Result<Vec<ExamQuestion>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT body FROM questions
               WHERE active=1
                 AND (?1 IS NULL OR category=?1)
                 AND (?2 IS NULL OR difficulty=?2)"#,
        )
        .bind(filter.category.map(|c| c.as_str()))
        .bind(filter.difficulty.map(|d| d.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("find questions"))?;
        rows.iter()
            .map(|row| from_json(&row.get::<String, _>("body"), "decode question"))
            .collect()
    }
}

fn db_err(what: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| {
        warn!(what, error = %e, "sqlite error");
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => CoreError::Unavailable(what),
            _ => CoreError::Storage(what),
        }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn to_json<T: serde::Serialize>(value: &T, what: &'static str) -> Result<String, CoreError> {
    serde_json::to_string(value).map_err(|_| CoreError::Storage(what))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str, what: &'static str) -> Result<T, CoreError> {
    serde_json::from_str(s).map_err(|e| {
        warn!(what, error = %e, "corrupt row");
        CoreError::Storage(what)
    })
}

fn tags_to_json(tags: &[String]) -> Result<String, CoreError> {
    to_json(&tags, "encode tags")
}

fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Storage("uuid"))
}

fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Storage("datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn date_to_str(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn date_from_str(s: String) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| CoreError::Storage("date"))
}

fn bool_to_i(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

fn row_into_deck(row: SqliteRow) -> Result<Deck, CoreError> {
    Ok(Deck {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        name: row.get::<String, _>("name"),
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_card(row: &SqliteRow) -> Result<Card, CoreError> {
    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Card {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        deck_id: uuid_from_str(row.get::<String, _>("deck_id"))?,
        front: row.get::<String, _>("front"),
        back: row.get::<String, _>("back"),
        hint: row.get::<Option<String>, _>("hint"),
        tags,
        suspended: row.get::<i64, _>("suspended") != 0,
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_schedule(row: &SqliteRow) -> Result<CardSchedule, CoreError> {
    Ok(CardSchedule {
        card_id: uuid_from_str(row.get::<String, _>("card_id"))?,
        ease_factor: row.get::<f64, _>("ease_factor"),
        interval_days: row.get::<i64, _>("interval_days") as u32,
        repetitions: row.get::<i64, _>("repetitions") as u32,
        next_review_date: date_from_str(row.get::<String, _>("next_review_date"))?,
        last_reviewed_at: row
            .get::<Option<String>, _>("last_reviewed_at")
            .map(dt_from_str)
            .transpose()?,
        last_quality: row
            .get::<Option<i64>, _>("last_quality")
            .map(Quality::new)
            .transpose()?,
        version: row.get::<i64, _>("version") as u64,
    })
}

fn row_into_session(row: &SqliteRow) -> Result<ExamSession, CoreError> {
    let mut session: ExamSession = from_json(&row.get::<String, _>("body"), "decode exam session")?;
    session.version = row.get::<i64, _>("version") as u64;
    Ok(session)
}
