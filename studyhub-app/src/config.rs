//! Resolved runtime configuration and the services built from it.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use studyhub_core::repo::{QuestionBank, Repository, SessionStore};
use studyhub_core::{DayBoundary, ExamEngine, ExamPolicy, ProgressSink, ReviewService, TracingSink, UserId};
use studyhub_json::{paths, JsonStore};
use studyhub_sqlite::SqliteRepo;
use tracing::info;
use uuid::Uuid;

use crate::cli::opts::{Cli, StoreKind};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub user: UserId,
    pub boundary: DayBoundary,
    pub exam_policy: ExamPolicy,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let data_dir = cli.data_dir.clone().unwrap_or_else(paths::data_root);
        let db_path = cli
            .db_path
            .clone()
            .unwrap_or_else(|| data_dir.join("studyhub.db"));
        let user = match cli.user.as_deref() {
            Some(s) => Uuid::parse_str(s.trim()).map_err(|_| anyhow!("--user must be a UUID"))?,
            None => Uuid::nil(),
        };
        let boundary = DayBoundary::from_offset_minutes(cli.utc_offset_minutes)
            .ok_or_else(|| anyhow!("utc offset out of range: {} minutes", cli.utc_offset_minutes))?;
        let exam_policy = ExamPolicy {
            allow_truncation: cli.allow_truncation,
            ..ExamPolicy::default()
        };
        Ok(Self {
            store: cli.store,
            db_path,
            data_dir,
            user,
            boundary,
            exam_policy,
        })
    }
}

/// Stores plus the two engines, shared by the CLI and the HTTP API.
#[derive(Clone)]
pub struct Services {
    pub repo: Arc<dyn Repository>,
    pub bank: Arc<dyn QuestionBank>,
    pub reviews: Arc<ReviewService>,
    pub exams: Arc<ExamEngine>,
    pub boundary: DayBoundary,
}

impl Services {
    /// Wires engines over any store that implements all three store traits.
    pub fn over<S>(store: Arc<S>, boundary: DayBoundary, policy: ExamPolicy) -> Self
    where
        S: Repository + SessionStore + QuestionBank + 'static,
    {
        let sink: Arc<dyn ProgressSink> = Arc::new(TracingSink);
        let reviews = ReviewService::new(store.clone(), sink.clone()).with_boundary(boundary);
        let exams = ExamEngine::new(store.clone(), store.clone(), sink).with_policy(policy);
        Self {
            repo: store.clone(),
            bank: store,
            reviews: Arc::new(reviews),
            exams: Arc::new(exams),
            boundary,
        }
    }
}

pub async fn open_services(cfg: &AppConfig) -> Result<Services> {
    match cfg.store {
        StoreKind::Json => {
            let store = JsonStore::open_in(&cfg.data_dir)
                .await
                .with_context(|| format!("opening json store in {}", cfg.data_dir.display()))?;
            info!(path = %store.path().display(), "using json store");
            Ok(Services::over(Arc::new(store), cfg.boundary, cfg.exam_policy.clone()))
        }
        StoreKind::Sqlite => {
            if let Some(parent) = cfg.db_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let store = SqliteRepo::open_file(&cfg.db_path)
                .await
                .with_context(|| format!("opening sqlite db {}", cfg.db_path.display()))?;
            info!(path = %cfg.db_path.display(), "using sqlite store");
            Ok(Services::over(Arc::new(store), cfg.boundary, cfg.exam_policy.clone()))
        }
    }
}
