use crate::events::{emit, ProgressSink, StudyEvent};
use crate::exam::selection::draw_questions;
use crate::repo::{QuestionBank, SessionStore};
use crate::retry::{read_with_retry, write_once};
use crate::{
    AnswerFeedback, AnswerSubmission, CoreError, ExamCriteria, ExamPolicy, ExamResult, ExamSession, ExamStatus,
    ExamSummary, Lifecycle, QuestionPrompt, RetryPolicy, SessionId, UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of submitting an answer. A submission that arrives after the
/// deadline is not recorded; the session expires and its result is returned
/// instead of an error.
#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    Recorded(AnswerFeedback),
    Expired(ExamResult),
}

pub struct ExamEngine {
    bank: Arc<dyn QuestionBank>,
    sessions: Arc<dyn SessionStore>,
    sink: Arc<dyn ProgressSink>,
    policy: ExamPolicy,
    retry: RetryPolicy,
}

impl ExamEngine {
    pub fn new(bank: Arc<dyn QuestionBank>, sessions: Arc<dyn SessionStore>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            bank,
            sessions,
            sink,
            policy: ExamPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExamPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &ExamPolicy {
        &self.policy
    }

    fn validate(&self, criteria: &ExamCriteria) -> Result<(), CoreError> {
        if criteria.question_count == 0 {
            return Err(CoreError::Invalid("question count must be at least 1"));
        }
        if criteria.question_count > self.policy.max_questions {
            return Err(CoreError::Invalid("too many questions requested"));
        }
        if criteria.time_limit_minutes > self.policy.max_time_limit_minutes {
            return Err(CoreError::Invalid("time limit too long"));
        }
        Ok(())
    }

    pub async fn start(&self, owner: UserId, criteria: ExamCriteria, now: DateTime<Utc>) -> Result<ExamSession, CoreError> {
        self.start_with_seed(owner, criteria, rand::random(), now).await
    }

    /// Starts a session whose question order is fully determined by `seed`.
    pub async fn start_with_seed(
        &self,
        owner: UserId,
        criteria: ExamCriteria,
        seed: u64,
        now: DateTime<Utc>,
    ) -> Result<ExamSession, CoreError> {
        self.validate(&criteria)?;
        let filter = criteria.filter();
        let pool = read_with_retry(&self.retry, "question bank", || self.bank.find_questions(&filter)).await?;
        let draw = draw_questions(
            pool,
            &filter,
            criteria.question_count,
            seed,
            self.policy.allow_truncation,
        )?;
        if draw.order.is_empty() {
            return Err(CoreError::InsufficientQuestions {
                requested: criteria.question_count,
                available: 0,
            });
        }

        let session = ExamSession::begin(owner, criteria, draw, seed, now);
        write_once(&self.retry, "insert exam session", self.sessions.insert_session(&session)).await?;
        info!(
            session_id = %session.id,
            user_id = %owner,
            questions = session.total_questions(),
            "exam started"
        );
        Ok(session)
    }

    async fn load(&self, owner: UserId, id: SessionId) -> Result<ExamSession, CoreError> {
        let session = read_with_retry(&self.retry, "exam session", || self.sessions.get_session(id)).await?;
        if session.owner_id != owner {
            return Err(CoreError::NotFound("exam session"));
        }
        Ok(session)
    }

    /// Read-modify-write with a compare-and-swap save. `apply` runs on a
    /// private copy and is re-run against fresh state after a version
    /// conflict, so a losing writer sees the winner's effect.
    async fn mutate<T, F>(&self, owner: UserId, id: SessionId, apply: F) -> Result<(T, ExamSession), CoreError>
    where
        F: Fn(&mut ExamSession) -> Result<T, CoreError> + Send + Sync,
        T: Send,
    {
        for attempt in 1..=self.retry.cas_attempts.max(1) {
            let mut session = self.load(owner, id).await?;
            let before = (session.current_index(), session.status());
            let out = apply(&mut session)?;
            if before == (session.current_index(), session.status()) {
                return Ok((out, session));
            }

            match write_once(&self.retry, "save exam session", self.sessions.save_session(&session)).await {
                Ok(version) => {
                    session.version = version;
                    if !before.1.is_terminal() && session.status().is_terminal() {
                        self.announce(&session).await;
                    }
                    return Ok((out, session));
                }
                Err(CoreError::VersionConflict(_)) => {
                    debug!(session_id = %id, attempt, "exam session changed underneath, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::Conflict("exam session is being modified concurrently"))
    }

    async fn announce(&self, session: &ExamSession) {
        let result = session.result();
        info!(
            session_id = %session.id,
            status = %result.status,
            score = result.report.raw_score,
            total = result.report.total_questions,
            percent = result.report.score_percent,
            "exam finished"
        );
        let event = StudyEvent::ExamFinished {
            user_id: session.owner_id,
            session_id: session.id,
            status: result.status,
            raw_score: result.report.raw_score,
            total_questions: result.report.total_questions,
            score_percent: result.report.score_percent,
            duration_seconds: result.duration_seconds,
            finished_at: result.completed_at.unwrap_or(session.started_at),
        };
        emit(self.sink.as_ref(), event).await;
    }

    pub async fn get(&self, owner: UserId, id: SessionId) -> Result<ExamSession, CoreError> {
        self.load(owner, id).await
    }

    /// The current question. Expires the session first if its time is up.
    pub async fn next_question(&self, owner: UserId, id: SessionId, now: DateTime<Utc>) -> Result<QuestionPrompt, CoreError> {
        let session = self.load(owner, id).await?;
        if session.status() == ExamStatus::InProgress && session.is_timed_out(now) {
            self.expire_if_timed_out(owner, id, now).await?;
            return Err(CoreError::SessionComplete);
        }
        session.prompt(now)
    }

    pub async fn submit_answer(
        &self,
        owner: UserId,
        id: SessionId,
        submission: AnswerSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, CoreError> {
        let (feedback, session) = self
            .mutate(owner, id, |s| {
                if s.expire_if_timed_out(now) {
                    return Ok(None);
                }
                s.record_answer(&submission, now).map(Some)
            })
            .await?;
        match feedback {
            Some(fb) => {
                debug!(session_id = %id, correct = fb.is_correct, "answer recorded");
                Ok(SubmitOutcome::Recorded(fb))
            }
            None => Ok(SubmitOutcome::Expired(session.result())),
        }
    }

    /// Finishes the session. Idempotent: a terminal session is returned
    /// unchanged. If the time limit has already passed the session ends as
    /// `EXPIRED` rather than `COMPLETED`.
    pub async fn complete(&self, owner: UserId, id: SessionId, forced: bool, now: DateTime<Utc>) -> Result<ExamResult, CoreError> {
        let (_, session) = self
            .mutate(owner, id, |s| {
                if s.expire_if_timed_out(now) {
                    return Ok(true);
                }
                s.finish(Lifecycle::Complete { forced }, now)
            })
            .await?;
        Ok(session.result())
    }

    pub async fn abandon(&self, owner: UserId, id: SessionId, now: DateTime<Utc>) -> Result<ExamResult, CoreError> {
        let (_, session) = self
            .mutate(owner, id, |s| s.finish(Lifecycle::Abandon, now))
            .await?;
        Ok(session.result())
    }

    /// Returns whether this call moved the session to `EXPIRED`.
    pub async fn expire_if_timed_out(&self, owner: UserId, id: SessionId, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let (expired, _) = self
            .mutate(owner, id, |s| Ok(s.expire_if_timed_out(now)))
            .await?;
        Ok(expired)
    }

    /// Score of a finished session. A session whose clock has run out is
    /// expired on the spot; one still running is a state conflict.
    pub async fn result(&self, owner: UserId, id: SessionId, now: DateTime<Utc>) -> Result<ExamResult, CoreError> {
        let session = self.load(owner, id).await?;
        if session.status().is_terminal() {
            return Ok(session.result());
        }
        if session.is_timed_out(now) {
            let (_, session) = self
                .mutate(owner, id, |s| Ok(s.expire_if_timed_out(now)))
                .await?;
            if session.status().is_terminal() {
                return Ok(session.result());
            }
        }
        Err(CoreError::SessionInProgress)
    }

    /// The owner's sessions, newest first.
    pub async fn history(&self, owner: UserId) -> Result<Vec<ExamSummary>, CoreError> {
        let mut sessions = read_with_retry(&self.retry, "exam sessions", || self.sessions.list_sessions(owner)).await?;
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions.iter().map(ExamSession::summary).collect())
    }
}
