use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Json,
    Sqlite,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "studyhub", version, about = "StudyHub flashcards and practice exams")]
pub struct Cli {
    /// Storage backend
    #[arg(long, value_enum, env = "STUDYHUB_STORE", default_value_t = StoreKind::Json, global = true)]
    pub store: StoreKind,

    /// SQLite DB path when --store sqlite (defaults to the data dir)
    #[arg(long, env = "STUDYHUB_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Directory for the JSON store and its backups
    #[arg(long, env = "STUDYHUB_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Acting user id (UUID). Defaults to the local user.
    #[arg(long, env = "STUDYHUB_USER", global = true)]
    pub user: Option<String>,

    /// Offset from UTC used to decide which calendar day a review falls on
    #[arg(long, env = "STUDYHUB_UTC_OFFSET_MINUTES", default_value_t = 0, allow_negative_numbers = true, global = true)]
    pub utc_offset_minutes: i32,

    /// Serve a shorter exam when fewer questions match than were requested
    #[arg(long, env = "STUDYHUB_ALLOW_TRUNCATION", global = true)]
    pub allow_truncation: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Deck operations
    #[command(subcommand)]
    Deck(DeckCmd),
    /// Card operations
    #[command(subcommand)]
    Card(CardCmd),
    /// List cards due for review
    Due(DueCmd),
    /// Interactive review loop
    Review(ReviewCmd),
    /// Exam question bank
    #[command(subcommand)]
    Question(QuestionCmd),
    /// Practice exams
    #[command(subcommand)]
    Exam(ExamCmd),
    /// Launch the HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum DeckCmd {
    Add { name: String },
    List,
    Rm { deck: String },
    /// Card counts for a deck
    Stats { deck: String },
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    Add(CardAdd),
    List {
        #[arg(long)]
        deck: Option<String>,
        /// Case-insensitive text search over front, back, hint and tags
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Only suspended cards
        #[arg(long, conflicts_with = "active")]
        suspended: bool,
        /// Only cards that are not suspended
        #[arg(long)]
        active: bool,
    },
    Rm { card_id: String },
    Edit(CardEdit),
}

#[derive(Debug, Args, Clone)]
pub struct CardAdd {
    #[arg(long)]
    pub deck: String,
    #[arg(long)]
    pub front: String,
    #[arg(long)]
    pub back: String,
    #[arg(long)]
    pub hint: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CardEdit {
    pub card_id: String,
    #[arg(long)]
    pub front: Option<String>,
    #[arg(long)]
    pub back: Option<String>,
    #[arg(long)]
    pub hint: Option<String>,
    #[arg(long)]
    pub clear_hint: bool,
    #[arg(long = "add-tag")]
    pub add_tags: Vec<String>,
    #[arg(long = "rm-tag")]
    pub rm_tags: Vec<String>,
    #[arg(long, conflicts_with = "unsuspend")]
    pub suspend: bool,
    #[arg(long)]
    pub unsuspend: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DueCmd {
    pub deck: String,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct ReviewCmd {
    pub deck: String,
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportFormat {
    Json,
    Csv,
}

#[derive(Debug, Subcommand, Clone)]
pub enum QuestionCmd {
    /// Import questions from a JSON array or a CSV file
    Import {
        path: PathBuf,
        /// Defaults to the file extension
        #[arg(long, value_enum)]
        format: Option<ImportFormat>,
    },
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        difficulty: Option<String>,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum ExamCmd {
    /// Take a practice exam in the terminal
    Run(ExamRun),
    /// Past exams, newest first
    History,
    /// Score report of a finished exam
    Result { id: String },
}

#[derive(Debug, Args, Clone)]
pub struct ExamRun {
    #[arg(long, default_value_t = 10)]
    pub count: usize,
    /// 0 = untimed
    #[arg(long, default_value_t = 0)]
    pub minutes: u32,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub difficulty: Option<String>,
    /// Fix the question order
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: String,
}
