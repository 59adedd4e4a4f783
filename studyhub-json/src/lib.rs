use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyhub_core::repo::{QuestionBank, Repository, SessionStore};
use studyhub_core::{
    Card, CardId, CardSchedule, CoreError, Deck, DeckCard, DeckId, ExamQuestion, ExamSession, QuestionFilter,
    QuestionId, SessionId, UserId,
};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, error, info, warn};

pub mod paths;

const FILE_VERSION: u32 = 2;

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    decks: Vec<Deck>,
    cards: Vec<Card>,
    #[serde(default)]
    schedules: Vec<CardSchedule>,
    #[serde(default)]
    sessions: Vec<ExamSession>,
    #[serde(default)]
    questions: Vec<ExamQuestion>,
}

#[derive(Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    decks: HashMap<DeckId, Deck>,
    cards: HashMap<CardId, Card>,
    schedules: HashMap<CardId, CardSchedule>,
    sessions: HashMap<SessionId, ExamSession>,
    questions: HashMap<QuestionId, ExamQuestion>,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            decks: HashMap::new(),
            cards: HashMap::new(),
            schedules: HashMap::new(),
            sessions: HashMap::new(),
            questions: HashMap::new(),
        }
    }

    fn to_image(&self) -> FileImage {
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            decks: self.decks.values().cloned().collect(),
            cards: self.cards.values().cloned().collect(),
            schedules: self.schedules.values().cloned().collect(),
            sessions: self.sessions.values().cloned().collect(),
            questions: self.questions.values().cloned().collect(),
        }
    }

    fn from_image(img: FileImage) -> Self {
        Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            decks: img.decks.into_iter().map(|d| (d.id, d)).collect(),
            cards: img.cards.into_iter().map(|c| (c.id, c)).collect(),
            schedules: img.schedules.into_iter().map(|s| (s.card_id, s)).collect(),
            sessions: img.sessions.into_iter().map(|s| (s.id, s)).collect(),
            questions: img.questions.into_iter().map(|q| (q.id, q)).collect(),
        }
    }

    fn remove_card(&mut self, id: CardId) {
        self.cards.remove(&id);
        self.schedules.remove(&id);
    }
}

/// Single-file store. Every mutation is applied to a copy of the state,
/// written to disk, and only then made visible, so a failed write leaves
/// both the file and the in-memory state as they were.
///
/// The write gate and the publish step travel with the blocking write: a
/// caller that stops waiting cannot let a later commit overtake it.
pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: Arc<RwLock<State>>,
    write_gate: Arc<Mutex<()>>,
}

impl JsonStore {
    /// Opens the store kept under `root` (`studyhub.json` plus `backups/`).
    pub async fn open_in(root: &Path) -> Result<Self, CoreError> {
        let (file, backups) = paths::store_files_in(root);
        Self::open_with(file, backups, 10).await
    }

    pub async fn open_with(path: PathBuf, backups_dir: PathBuf, max_backups: usize) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let state = load_or_init(&path).await?;
        info!(path = %path.display(), "json store opened");
        Ok(Self {
            path,
            backups_dir,
            max_backups: max_backups.max(1),
            state: Arc::new(RwLock::new(state)),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn commit<T, F>(&self, apply: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut State) -> Result<T, CoreError> + Send,
        T: Send,
    {
        let gate = self.write_gate.clone().lock_owned().await;
        let mut next = self.state.read().clone();
        let out = apply(&mut next)?;
        next.updated_at = Utc::now();

        let state = self.state.clone();
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;
        task::spawn_blocking(move || {
            let _gate = gate;
            let json = serde_json::to_vec_pretty(&next.to_image())?;
            persist_atomic(&path, &json)?;
            *state.write() = next;
            if let Err(e) = write_backup(&backups, keep, &json) {
                warn!(dir = %backups.display(), error = %e, "backup skipped");
            }
            Ok::<_, io::Error>(())
        })
        .await
        .map_err(|_| CoreError::Storage("io"))?
        .map_err(|e| {
            error!(path = %self.path.display(), error = %e, "failed to write store file");
            CoreError::Storage("io")
        })?;

        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.read())
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "cannot create directory");
        CoreError::Storage("io")
    })
}

fn read_image(path: &Path) -> io::Result<FileImage> {
    let mut f = fs::File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let img = serde_json::from_str::<FileImage>(&buf)?;
    if img.version != FILE_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported store file version {}", img.version),
        ));
    }
    Ok(img)
}

async fn load_or_init(path: &Path) -> Result<State, CoreError> {
    let p = path.to_path_buf();
    if p.exists() {
        let img = task::spawn_blocking(move || read_image(&p))
            .await
            .map_err(|_| CoreError::Storage("io"))?
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "cannot read store file");
                CoreError::Storage("corrupt store file")
            })?;
        debug!(decks = img.decks.len(), cards = img.cards.len(), sessions = img.sessions.len(), "store loaded");
        Ok(State::from_image(img))
    } else {
        let st = State::new_empty();
        // existing backups are left alone: they may be all that is left of a lost file
        let written = serde_json::to_vec_pretty(&st.to_image())
            .map_err(io::Error::from)
            .and_then(|json| persist_atomic(path, &json));
        written.map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot create store file");
            CoreError::Storage("io")
        })?;
        Ok(st)
    }
}

fn persist_atomic(path: &Path, json: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(json)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Copies an already persisted image into `backups_dir` and trims the
/// oldest copies beyond `max_backups`.
fn write_backup(backups_dir: &Path, max_backups: usize, json: &[u8]) -> io::Result<()> {
    fs::create_dir_all(backups_dir)?;
    let ts = Utc::now().format("%Y%m%d-%H%M%S%.3f");
    let backup_path = backups_dir.join(format!("studyhub-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(json)?;
    btmp.flush()?;
    btmp.persist(&backup_path).map_err(|e| e.error)?;

    rotate_backups(backups_dir, max_backups)
}

fn rotate_backups(dir: &Path, keep: usize) -> io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    // names embed the timestamp, so lexical order is age order
    entries.sort();
    if entries.len() > keep {
        for p in &entries[..entries.len() - keep] {
            let _ = fs::remove_file(p);
        }
    }
    Ok(())
}

#[async_trait]
impl Repository for JsonStore {
    async fn create_deck(&self, name: &str) -> Result<Deck, CoreError> {
        let deck = Deck::new(name);
        let out = deck.clone();
        self.commit(move |s| {
            if s.decks.values().any(|d| d.name.eq_ignore_ascii_case(&deck.name)) {
                return Err(CoreError::Conflict("deck name already exists"));
            }
            s.decks.insert(deck.id, deck);
            Ok(())
        })
        .await?;
        Ok(out)
    }

    async fn get_deck(&self, id: DeckId) -> Result<Deck, CoreError> {
        self.read(|s| s.decks.get(&id).cloned().ok_or(CoreError::NotFound("deck")))
    }

    async fn list_decks(&self) -> Result<Vec<Deck>, CoreError> {
        Ok(self.read(|s| s.decks.values().cloned().collect()))
    }

    async fn delete_deck(&self, id: DeckId) -> Result<(), CoreError> {
        self.commit(|s| {
            if s.decks.remove(&id).is_none() {
                return Err(CoreError::NotFound("deck"));
            }
            let doomed: Vec<CardId> = s.cards.values().filter(|c| c.deck_id == id).map(|c| c.id).collect();
            for cid in doomed {
                s.remove_card(cid);
            }
            Ok(())
        })
        .await
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
        let mut card = Card::new(deck_id, front, back);
        card.hint = hint.map(|s| s.to_string());
        card.tags = tags.to_vec();
        let out = card.clone();
        self.commit(move |s| {
            if !s.decks.contains_key(&deck_id) {
                return Err(CoreError::NotFound("deck"));
            }
            s.schedules.insert(card.id, CardSchedule::new(card.id, due));
            s.cards.insert(card.id, card);
            Ok(())
        })
        .await?;
        Ok(out)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        self.read(|s| s.cards.get(&id).cloned().ok_or(CoreError::NotFound("card")))
    }

    async fn list_cards(&self, deck_id: Option<DeckId>) -> Result<Vec<Card>, CoreError> {
        Ok(self.read(|s| {
            s.cards
                .values()
                .filter(|c| deck_id.map(|d| c.deck_id == d).unwrap_or(true))
                .cloned()
                .collect()
        }))
    }

    async fn update_card(&self, card: &Card) -> Result<Card, CoreError> {
        let updated = card.clone();
        self.commit(move |s| {
            let Some(slot) = s.cards.get_mut(&updated.id) else {
                return Err(CoreError::NotFound("card"));
            };
            *slot = updated;
            Ok(())
        })
        .await?;
        Ok(card.clone())
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.commit(|s| {
            if !s.cards.contains_key(&id) {
                return Err(CoreError::NotFound("card"));
            }
            s.remove_card(id);
            Ok(())
        })
        .await
    }

    async fn set_suspended(&self, id: CardId, suspended: bool) -> Result<(), CoreError> {
        self.commit(|s| {
            let Some(c) = s.cards.get_mut(&id) else {
                return Err(CoreError::NotFound("card"));
            };
            c.suspended = suspended;
            Ok(())
        })
        .await
    }

    async fn get_schedule(&self, card_id: CardId) -> Result<CardSchedule, CoreError> {
        self.read(|s| {
            s.schedules
                .get(&card_id)
                .cloned()
                .ok_or(CoreError::NotFound("card schedule"))
        })
    }

    async fn list_deck_cards(&self, deck_id: DeckId) -> Result<Vec<DeckCard>, CoreError> {
        self.read(|s| {
            if !s.decks.contains_key(&deck_id) {
                return Err(CoreError::NotFound("deck"));
            }
            Ok(s.cards
                .values()
                .filter(|c| c.deck_id == deck_id)
                .filter_map(|c| {
                    s.schedules.get(&c.id).map(|sch| DeckCard {
                        card: c.clone(),
                        schedule: sch.clone(),
                    })
                })
                .collect())
        })
    }

    async fn save_schedule(&self, schedule: &CardSchedule) -> Result<u64, CoreError> {
        let incoming = schedule.clone();
        self.commit(move |s| {
            let Some(stored) = s.schedules.get_mut(&incoming.card_id) else {
                return Err(CoreError::NotFound("card schedule"));
            };
            if stored.version != incoming.version {
                return Err(CoreError::VersionConflict("card schedule"));
            }
            let next = incoming.version + 1;
            *stored = CardSchedule {
                version: next,
                ..incoming
            };
            Ok(next)
        })
        .await
    }
}

#[async_trait]
impl SessionStore for JsonStore {
    async fn insert_session(&self, session: &ExamSession) -> Result<(), CoreError> {
        let session = session.clone();
        self.commit(move |s| {
            if s.sessions.contains_key(&session.id) {
                return Err(CoreError::Conflict("exam session already exists"));
            }
            s.sessions.insert(session.id, session);
            Ok(())
        })
        .await
    }

    async fn get_session(&self, id: SessionId) -> Result<ExamSession, CoreError> {
        self.read(|s| s.sessions.get(&id).cloned().ok_or(CoreError::NotFound("exam session")))
    }

    async fn save_session(&self, session: &ExamSession) -> Result<u64, CoreError> {
        let mut incoming = session.clone();
        self.commit(move |s| {
            let Some(stored) = s.sessions.get_mut(&incoming.id) else {
                return Err(CoreError::NotFound("exam session"));
            };
            if stored.version != incoming.version {
                return Err(CoreError::VersionConflict("exam session"));
            }
            incoming.version += 1;
            let version = incoming.version;
            *stored = incoming;
            Ok(version)
        })
        .await
    }

    async fn list_sessions(&self, owner: UserId) -> Result<Vec<ExamSession>, CoreError> {
        Ok(self.read(|s| {
            s.sessions
                .values()
                .filter(|x| x.owner_id == owner)
                .cloned()
                .collect()
        }))
    }
}

#[async_trait]
impl QuestionBank for JsonStore {
    async fn upsert_question(&self, question: &ExamQuestion) -> Result<(), CoreError> {
        question.validate()?;
        let question = question.clone();
        self.commit(move |s| {
            s.questions.insert(question.id, question);
            Ok(())
        })
        .await
    }

    async fn get_question(&self, id: QuestionId) -> Result<ExamQuestion, CoreError> {
        self.read(|s| s.questions.get(&id).cloned().ok_or(CoreError::NotFound("question")))
    }

    async fn find_questions(&self, filter: &QuestionFilter) -> Result<Vec<ExamQuestion>, CoreError> {
        Ok(self.read(|s| s.questions.values().filter(|q| filter.matches(q)).cloned().collect()))
    }
}
