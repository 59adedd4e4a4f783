use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type QuestionId = Uuid;
pub type OptionId = Uuid;

/// NCCPA content blueprint categories.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Cardiology,
    Pulmonology,
    Gastroenterology,
    Musculoskeletal,
    Neurology,
    Psychiatry,
    Dermatology,
    Eent,
    Endocrinology,
    Hematology,
    InfectiousDisease,
    Nephrology,
    Reproductive,
    Pediatrics,
    EmergencyMedicine,
    Pharmacology,
    Anatomy,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Category::Cardiology,
        Category::Pulmonology,
        Category::Gastroenterology,
        Category::Musculoskeletal,
        Category::Neurology,
        Category::Psychiatry,
        Category::Dermatology,
        Category::Eent,
        Category::Endocrinology,
        Category::Hematology,
        Category::InfectiousDisease,
        Category::Nephrology,
        Category::Reproductive,
        Category::Pediatrics,
        Category::EmergencyMedicine,
        Category::Pharmacology,
        Category::Anatomy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cardiology => "CARDIOLOGY",
            Category::Pulmonology => "PULMONOLOGY",
            Category::Gastroenterology => "GASTROENTEROLOGY",
            Category::Musculoskeletal => "MUSCULOSKELETAL",
            Category::Neurology => "NEUROLOGY",
            Category::Psychiatry => "PSYCHIATRY",
            Category::Dermatology => "DERMATOLOGY",
            Category::Eent => "EENT",
            Category::Endocrinology => "ENDOCRINOLOGY",
            Category::Hematology => "HEMATOLOGY",
            Category::InfectiousDisease => "INFECTIOUS_DISEASE",
            Category::Nephrology => "NEPHROLOGY",
            Category::Reproductive => "REPRODUCTIVE",
            Category::Pediatrics => "PEDIATRICS",
            Category::EmergencyMedicine => "EMERGENCY_MEDICINE",
            Category::Pharmacology => "PHARMACOLOGY",
            Category::Anatomy => "ANATOMY",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', ' '], "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or(CoreError::Invalid("unknown category"))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EASY" => Ok(Difficulty::Easy),
            "MEDIUM" => Ok(Difficulty::Medium),
            "HARD" => Ok(Difficulty::Hard),
            _ => Err(CoreError::Invalid("unknown difficulty")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

/// A multiple-choice question as the bank stores it, answer key included.
/// Never serialize this to a client; use [`QuestionView`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExamQuestion {
    pub id: QuestionId,
    pub stem: String,
    #[serde(default)]
    pub vignette: Option<String>,
    pub category: Category,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub options: Vec<AnswerOption>,
}

fn default_active() -> bool {
    true
}

impl ExamQuestion {
    /// Builds a question from `(text, is_correct)` pairs, in display order.
    pub fn new(
        stem: impl Into<String>,
        category: Category,
        difficulty: Difficulty,
        explanation: impl Into<String>,
        options: Vec<(String, bool)>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stem: stem.into(),
            vignette: None,
            category,
            difficulty,
            explanation: explanation.into(),
            active: true,
            options: options
                .into_iter()
                .map(|(text, is_correct)| AnswerOption {
                    id: Uuid::new_v4(),
                    text,
                    is_correct,
                })
                .collect(),
        }
    }

    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.is_correct)
    }

    pub fn has_option(&self, id: OptionId) -> bool {
        self.options.iter().any(|o| o.id == id)
    }

    /// A question must offer at least two options and exactly one correct one.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.stem.trim().is_empty() {
            return Err(CoreError::Invalid("question stem is empty"));
        }
        if self.options.len() < 2 {
            return Err(CoreError::Invalid("question needs at least two options"));
        }
        if self.options.iter().filter(|o| o.is_correct).count() != 1 {
            return Err(CoreError::Invalid("question needs exactly one correct option"));
        }
        Ok(())
    }

    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            stem: self.stem.clone(),
            vignette: self.vignette.clone(),
            category: self.category,
            difficulty: self.difficulty,
            options: self
                .options
                .iter()
                .map(|o| OptionView {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

/// Client-facing projection of a question: no correctness flags.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: QuestionId,
    pub stem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vignette: Option<String>,
    pub category: Category,
    pub difficulty: Difficulty,
    pub options: Vec<OptionView>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionView {
    pub id: OptionId,
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionFilter {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
}

impl QuestionFilter {
    /// Inactive questions never match.
    pub fn matches(&self, q: &ExamQuestion) -> bool {
        q.active
            && self.category.map(|c| c == q.category).unwrap_or(true)
            && self.difficulty.map(|d| d == q.difficulty).unwrap_or(true)
    }
}

/// Server-side lookup of the correct option for a question.
pub trait AnswerKey {
    fn correct_option_id(&self, question_id: QuestionId) -> Option<OptionId>;
}

impl AnswerKey for [ExamQuestion] {
    fn correct_option_id(&self, question_id: QuestionId) -> Option<OptionId> {
        self.iter()
            .find(|q| q.id == question_id)
            .and_then(|q| q.correct_option())
            .map(|o| o.id)
    }
}
