//! One exam attempt as a small state machine.
//!
//! A session is born `IN_PROGRESS` (there is no observable `CREATED` state)
//! and ends in exactly one of `COMPLETED`, `ABANDONED` or `EXPIRED`. The
//! answer log is append-only and the current index is its length, so the
//! index can never move backwards.

use crate::exam::scoring::{score_answers, PerformanceBand, ScoreReport};
use crate::exam::selection::Draw;
use crate::{
    AnswerKey, Category, CoreError, Difficulty, ExamQuestion, OptionId, QuestionFilter, QuestionId,
    QuestionView, UserId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type SessionId = Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    InProgress,
    Completed,
    Abandoned,
    Expired,
}

impl ExamStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExamStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::InProgress => "IN_PROGRESS",
            ExamStatus::Completed => "COMPLETED",
            ExamStatus::Abandoned => "ABANDONED",
            ExamStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    InProgress,
    Completed {
        completed_at: DateTime<Utc>,
        /// Finished early with questions left unanswered.
        forced: bool,
    },
    Abandoned {
        completed_at: DateTime<Utc>,
    },
    Expired {
        completed_at: DateTime<Utc>,
    },
}

/// Events that move a session towards a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Complete { forced: bool },
    Abandon,
    Expire,
}

impl SessionState {
    pub fn status(&self) -> ExamStatus {
        match self {
            SessionState::InProgress => ExamStatus::InProgress,
            SessionState::Completed { .. } => ExamStatus::Completed,
            SessionState::Abandoned { .. } => ExamStatus::Abandoned,
            SessionState::Expired { .. } => ExamStatus::Expired,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::InProgress => None,
            SessionState::Completed { completed_at, .. }
            | SessionState::Abandoned { completed_at }
            | SessionState::Expired { completed_at } => Some(*completed_at),
        }
    }

    /// Total transition function. Terminal states absorb every event
    /// unchanged, which is what makes completion and abandonment idempotent.
    pub fn transition(&self, event: Lifecycle, unanswered: usize, now: DateTime<Utc>) -> Result<SessionState, CoreError> {
        if self.status().is_terminal() {
            return Ok(self.clone());
        }
        match event {
            Lifecycle::Complete { forced } => {
                if unanswered > 0 && !forced {
                    return Err(CoreError::Incomplete { remaining: unanswered });
                }
                Ok(SessionState::Completed {
                    completed_at: now,
                    forced: unanswered > 0,
                })
            }
            Lifecycle::Abandon => Ok(SessionState::Abandoned { completed_at: now }),
            Lifecycle::Expire => Ok(SessionState::Expired { completed_at: now }),
        }
    }
}

/// What the student asked for when starting the exam.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExamCriteria {
    pub question_count: usize,
    #[serde(default)]
    pub time_limit_minutes: u32,
    #[serde(default)]
    pub category_filter: Option<Category>,
    #[serde(default)]
    pub difficulty_filter: Option<Difficulty>,
}

impl ExamCriteria {
    pub fn filter(&self) -> QuestionFilter {
        QuestionFilter {
            category: self.category_filter,
            difficulty: self.difficulty_filter,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExamAnswer {
    pub question_id: QuestionId,
    pub category: Category,
    /// `None` when the question was skipped.
    pub selected_option_id: Option<OptionId>,
    pub time_spent_seconds: u32,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: QuestionId,
    #[serde(default)]
    pub selected_option_id: Option<OptionId>,
    #[serde(default)]
    pub time_spent_seconds: u32,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningScore {
    pub correct: u32,
    pub total: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    pub is_correct: bool,
    pub correct_option_id: OptionId,
    pub explanation: String,
    pub running_score: RunningScore,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPrompt {
    pub question: QuestionView,
    pub question_number: usize,
    pub total_questions: usize,
    pub time_remaining_seconds: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub session_id: SessionId,
    pub status: ExamStatus,
    #[serde(flatten)]
    pub report: ScoreReport,
    #[serde(default)]
    pub performance_message: String,
    pub duration_seconds: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Review of every presented question with the key revealed. Empty
    /// until the session is terminal.
    #[serde(default)]
    pub answer_details: Vec<AnswerDetail>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RevealedOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDetail {
    pub question_id: QuestionId,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vignette: Option<String>,
    pub category: Category,
    pub options: Vec<RevealedOption>,
    pub selected_option_id: Option<OptionId>,
    pub correct_option_id: Option<OptionId>,
    pub is_correct: bool,
    pub explanation: String,
    pub time_spent_seconds: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub id: SessionId,
    pub question_count: usize,
    pub answered: usize,
    pub status: ExamStatus,
    pub score: Option<u32>,
    pub score_percent: Option<u32>,
    pub performance_band: Option<PerformanceBand>,
    pub category_filter: Option<Category>,
    pub difficulty_filter: Option<Difficulty>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExamSession {
    pub id: SessionId,
    pub owner_id: UserId,
    pub criteria: ExamCriteria,
    pub seed: u64,
    snapshot: Vec<ExamQuestion>,
    order: Vec<usize>,
    pub time_limit_seconds: Option<u32>,
    pub started_at: DateTime<Utc>,
    answers: Vec<ExamAnswer>,
    state: SessionState,
    #[serde(default)]
    pub version: u64,
}

impl ExamSession {
    pub fn begin(owner_id: UserId, criteria: ExamCriteria, draw: Draw, seed: u64, now: DateTime<Utc>) -> Self {
        let time_limit_seconds = match criteria.time_limit_minutes {
            0 => None,
            m => Some(m * 60),
        };
        Self {
            id: Uuid::new_v4(),
            owner_id,
            criteria,
            seed,
            snapshot: draw.snapshot,
            order: draw.order,
            time_limit_seconds,
            started_at: now,
            answers: Vec::new(),
            state: SessionState::InProgress,
            version: 0,
        }
    }

    pub fn status(&self) -> ExamStatus {
        self.state.status()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.completed_at()
    }

    pub fn answers(&self) -> &[ExamAnswer] {
        &self.answers
    }

    pub fn current_index(&self) -> usize {
        self.answers.len()
    }

    pub fn total_questions(&self) -> usize {
        self.order.len()
    }

    pub fn unanswered(&self) -> usize {
        self.total_questions() - self.current_index()
    }

    pub fn question_at(&self, index: usize) -> Option<&ExamQuestion> {
        self.order.get(index).and_then(|&i| self.snapshot.get(i))
    }

    pub fn current_question(&self) -> Option<&ExamQuestion> {
        self.question_at(self.current_index())
    }

    pub fn question_ids(&self) -> Vec<QuestionId> {
        (0..self.total_questions())
            .filter_map(|i| self.question_at(i).map(|q| q.id))
            .collect()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.time_limit_seconds
            .map(|s| self.started_at + Duration::seconds(s as i64))
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.deadline().map(|d| now >= d).unwrap_or(false)
    }

    pub fn time_remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline().map(|d| (d - now).num_seconds().max(0))
    }

    pub fn running_score(&self) -> RunningScore {
        RunningScore {
            correct: self.answers.iter().filter(|a| a.is_correct).count() as u32,
            total: self.answers.len() as u32,
        }
    }

    pub fn prompt(&self, now: DateTime<Utc>) -> Result<QuestionPrompt, CoreError> {
        if self.status().is_terminal() {
            return Err(CoreError::SessionComplete);
        }
        let question = self.current_question().ok_or(CoreError::SessionComplete)?;
        Ok(QuestionPrompt {
            question: question.view(),
            question_number: self.current_index() + 1,
            total_questions: self.total_questions(),
            time_remaining_seconds: self.time_remaining_seconds(now),
        })
    }

    /// Records the answer for the current question. Nothing is mutated when
    /// this returns an error.
    pub fn record_answer(&mut self, submission: &AnswerSubmission, now: DateTime<Utc>) -> Result<AnswerFeedback, CoreError> {
        let status = self.status();
        if status.is_terminal() {
            return Err(CoreError::SessionTerminal(status));
        }
        let question = match self.current_question() {
            Some(q) if q.id == submission.question_id => q,
            _ => {
                return Err(CoreError::QuestionMismatch {
                    got: submission.question_id,
                })
            }
        };
        if let Some(selected) = submission.selected_option_id {
            if !question.has_option(selected) {
                return Err(CoreError::Invalid("option does not belong to the question"));
            }
        }
        let category = question.category;
        let explanation = question.explanation.clone();
        let correct_option_id = self
            .correct_option_id(submission.question_id)
            .ok_or(CoreError::Storage("question has no correct option"))?;

        let is_correct = submission.selected_option_id == Some(correct_option_id);
        self.answers.push(ExamAnswer {
            question_id: submission.question_id,
            category,
            selected_option_id: submission.selected_option_id,
            time_spent_seconds: submission.time_spent_seconds,
            is_correct,
            answered_at: now,
        });

        Ok(AnswerFeedback {
            is_correct,
            correct_option_id,
            explanation,
            running_score: self.running_score(),
        })
    }

    /// Applies a lifecycle event. Returns whether the state changed.
    pub fn finish(&mut self, event: Lifecycle, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let next = self.state.transition(event, self.unanswered(), now)?;
        let changed = next != self.state;
        self.state = next;
        Ok(changed)
    }

    /// Server-side timer check. Returns whether the session just expired.
    pub fn expire_if_timed_out(&mut self, now: DateTime<Utc>) -> bool {
        if self.status() != ExamStatus::InProgress || !self.is_timed_out(now) {
            return false;
        }
        self.state = SessionState::Expired { completed_at: now };
        true
    }

    pub fn score(&self) -> ScoreReport {
        score_answers(&self.answers)
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.completed_at()
            .map(|end| (end - self.started_at).num_seconds().max(0))
    }

    pub fn result(&self) -> ExamResult {
        let report = self.score();
        ExamResult {
            session_id: self.id,
            status: self.status(),
            performance_message: report.band.message().to_string(),
            report,
            duration_seconds: self.duration_seconds(),
            completed_at: self.completed_at(),
            answer_details: if self.status().is_terminal() {
                self.answer_details()
            } else {
                Vec::new()
            },
        }
    }

    /// Presented questions in answer order, joined with what was chosen.
    pub fn answer_details(&self) -> Vec<AnswerDetail> {
        self.answers
            .iter()
            .filter_map(|a| {
                let q = self.snapshot.iter().find(|q| q.id == a.question_id)?;
                Some(AnswerDetail {
                    question_id: q.id,
                    stem: q.stem.clone(),
                    vignette: q.vignette.clone(),
                    category: q.category,
                    options: q
                        .options
                        .iter()
                        .map(|o| RevealedOption {
                            id: o.id,
                            text: o.text.clone(),
                            is_correct: o.is_correct,
                        })
                        .collect(),
                    selected_option_id: a.selected_option_id,
                    correct_option_id: q.options.iter().find(|o| o.is_correct).map(|o| o.id),
                    is_correct: a.is_correct,
                    explanation: q.explanation.clone(),
                    time_spent_seconds: a.time_spent_seconds,
                })
            })
            .collect()
    }

    pub fn summary(&self) -> ExamSummary {
        let report = self.status().is_terminal().then(|| self.score());
        ExamSummary {
            id: self.id,
            question_count: self.total_questions(),
            answered: self.current_index(),
            status: self.status(),
            score: report.as_ref().map(|r| r.raw_score),
            score_percent: report.as_ref().map(|r| r.score_percent),
            performance_band: report.as_ref().map(|r| r.band),
            category_filter: self.criteria.category_filter,
            difficulty_filter: self.criteria.difficulty_filter,
            started_at: self.started_at,
            completed_at: self.completed_at(),
            duration_seconds: self.duration_seconds(),
        }
    }
}

impl AnswerKey for ExamSession {
    fn correct_option_id(&self, question_id: QuestionId) -> Option<OptionId> {
        self.snapshot.as_slice().correct_option_id(question_id)
    }
}
