use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use studyhub_core::repo::memory::MemoryRepo;
use studyhub_core::{
    draw_questions, AnswerSubmission, Category, CoreError, Difficulty, ExamCriteria, ExamEngine, ExamPolicy,
    ExamQuestion, ExamSession, ExamStatus, MemorySink, OptionId, PerformanceBand, QuestionBank, QuestionFilter,
    QuestionId, SessionId, SessionStore, StudyEvent, SubmitOutcome, UserId,
};
use uuid::Uuid;

const SEED: u64 = 42;

struct Fixture {
    repo: Arc<MemoryRepo>,
    sink: Arc<MemorySink>,
    engine: ExamEngine,
    user: Uuid,
    t0: DateTime<Utc>,
}

fn question(n: usize, category: Category, difficulty: Difficulty) -> ExamQuestion {
    ExamQuestion::new(
        format!("Question {n}"),
        category,
        difficulty,
        format!("Explanation {n}"),
        vec![
            ("right".to_string(), true),
            ("wrong a".to_string(), false),
            ("wrong b".to_string(), false),
            ("wrong c".to_string(), false),
        ],
    )
}

async fn fixture(cardiology: usize, pulmonology: usize) -> Fixture {
    fixture_with(cardiology, pulmonology, ExamPolicy::default()).await
}

async fn fixture_with(cardiology: usize, pulmonology: usize, policy: ExamPolicy) -> Fixture {
    let repo = Arc::new(MemoryRepo::new());
    for n in 0..cardiology {
        repo.upsert_question(&question(n, Category::Cardiology, Difficulty::Medium)).await.unwrap();
    }
    for n in 0..pulmonology {
        repo.upsert_question(&question(100 + n, Category::Pulmonology, Difficulty::Hard)).await.unwrap();
    }
    let sink = Arc::new(MemorySink::new());
    let engine = ExamEngine::new(repo.clone(), repo.clone(), sink.clone()).with_policy(policy);
    Fixture {
        repo,
        sink,
        engine,
        user: Uuid::new_v4(),
        t0: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
    }
}

fn criteria(count: usize, minutes: u32) -> ExamCriteria {
    ExamCriteria {
        question_count: count,
        time_limit_minutes: minutes,
        ..Default::default()
    }
}

async fn option_for(fx: &Fixture, qid: QuestionId, correct: bool) -> OptionId {
    let q = fx.repo.get_question(qid).await.unwrap();
    q.options.iter().find(|o| o.is_correct == correct).unwrap().id
}

async fn answer(fx: &Fixture, session: Uuid, correct: bool, at: DateTime<Utc>) -> SubmitOutcome {
    let prompt = fx.engine.next_question(fx.user, session, at).await.unwrap();
    let qid = prompt.question.id;
    let submission = AnswerSubmission {
        question_id: qid,
        selected_option_id: Some(option_for(fx, qid, correct).await),
        time_spent_seconds: 30,
    };
    fx.engine.submit_answer(fx.user, session, submission, at).await.unwrap()
}

#[tokio::test]
async fn start_draws_distinct_questions_and_hides_answers() {
    let fx = fixture(10, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(5, 0), SEED, fx.t0).await.unwrap();

    assert_eq!(s.status(), ExamStatus::InProgress);
    assert_eq!(s.total_questions(), 5);
    assert_eq!(s.current_index(), 0);
    let mut ids = s.question_ids();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    let prompt = fx.engine.next_question(fx.user, s.id, fx.t0).await.unwrap();
    assert_eq!(prompt.question_number, 1);
    assert_eq!(prompt.total_questions, 5);
    assert_eq!(prompt.time_remaining_seconds, None);
    let json = serde_json::to_string(&prompt).unwrap();
    assert!(!json.contains("isCorrect"));
    assert!(!json.contains("is_correct"));
}

#[tokio::test]
async fn same_seed_same_order() {
    let fx = fixture(20, 0).await;
    let a = fx.engine.start_with_seed(fx.user, criteria(8, 0), SEED, fx.t0).await.unwrap();
    let b = fx.engine.start_with_seed(fx.user, criteria(8, 0), SEED, fx.t0).await.unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(a.question_ids(), b.question_ids());
}

#[test]
fn draw_ignores_pool_order() {
    let pool: Vec<ExamQuestion> = (0..12).map(|n| question(n, Category::Neurology, Difficulty::Easy)).collect();
    let mut reversed = pool.clone();
    reversed.reverse();

    let filter = QuestionFilter::default();
    let a = draw_questions(pool, &filter, 6, 7, false).unwrap();
    let b = draw_questions(reversed, &filter, 6, 7, false).unwrap();
    let ids = |d: &studyhub_core::Draw| d.order.iter().map(|&i| d.snapshot[i].id).collect::<Vec<_>>();
    assert_eq!(ids(&a), ids(&b));
}

#[tokio::test]
async fn filters_restrict_the_pool() {
    let fx = fixture(3, 4).await;
    let c = ExamCriteria {
        question_count: 4,
        category_filter: Some(Category::Pulmonology),
        difficulty_filter: Some(Difficulty::Hard),
        ..Default::default()
    };
    let s = fx.engine.start_with_seed(fx.user, c, SEED, fx.t0).await.unwrap();
    for i in 0..s.total_questions() {
        assert_eq!(s.question_at(i).unwrap().category, Category::Pulmonology);
    }
}

#[tokio::test]
async fn insufficient_pool_fails_unless_truncation_allowed() {
    let fx = fixture(3, 0).await;
    let err = fx.engine.start_with_seed(fx.user, criteria(5, 0), SEED, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::InsufficientQuestions { requested: 5, available: 3 }));

    let policy = ExamPolicy {
        allow_truncation: true,
        ..Default::default()
    };
    let fx = fixture_with(3, 0, policy).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(5, 0), SEED, fx.t0).await.unwrap();
    assert_eq!(s.total_questions(), 3);

    let empty = fixture_with(0, 0, ExamPolicy { allow_truncation: true, ..Default::default() }).await;
    let err = empty.engine.start_with_seed(empty.user, criteria(5, 0), SEED, empty.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::InsufficientQuestions { .. }));
}

#[tokio::test]
async fn rejects_out_of_range_criteria() {
    let fx = fixture(5, 0).await;
    for c in [criteria(0, 0), criteria(500, 0), criteria(1, 10_000)] {
        let err = fx.engine.start_with_seed(fx.user, c, SEED, fx.t0).await.unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
    }
}

#[tokio::test]
async fn two_of_three_correct_scores_sixty_seven() {
    let fx = fixture(3, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(3, 0), SEED, fx.t0).await.unwrap();

    for correct in [true, false, true] {
        match answer(&fx, s.id, correct, fx.t0).await {
            SubmitOutcome::Recorded(fb) => assert_eq!(fb.is_correct, correct),
            other => panic!("unexpected {other:?}"),
        }
    }
    let done = fx.engine.complete(fx.user, s.id, false, fx.t0 + Duration::minutes(3)).await.unwrap();

    assert_eq!(done.status, ExamStatus::Completed);
    assert_eq!(done.report.raw_score, 2);
    assert_eq!(done.report.total_questions, 3);
    assert_eq!(done.report.score_percent, 67);
    assert_eq!(done.report.category_breakdown.len(), 1);
    assert_eq!(done.report.category_breakdown[&Category::Cardiology], 67);
    assert_eq!(done.report.band, PerformanceBand::NearPass);
    assert_eq!(done.report.incorrect_question_ids.len(), 1);
    assert_eq!(done.duration_seconds, Some(180));
}

#[tokio::test]
async fn feedback_carries_running_score_and_explanation() {
    let fx = fixture(2, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(2, 0), SEED, fx.t0).await.unwrap();

    let SubmitOutcome::Recorded(first) = answer(&fx, s.id, false, fx.t0).await else {
        panic!("expected feedback");
    };
    assert!(!first.is_correct);
    assert!(first.explanation.starts_with("Explanation"));
    assert_eq!((first.running_score.correct, first.running_score.total), (0, 1));

    let SubmitOutcome::Recorded(second) = answer(&fx, s.id, true, fx.t0).await else {
        panic!("expected feedback");
    };
    assert_eq!((second.running_score.correct, second.running_score.total), (1, 2));
}

#[tokio::test]
async fn resubmitting_an_answered_question_is_a_mismatch() {
    let fx = fixture(3, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(3, 0), SEED, fx.t0).await.unwrap();
    let first = s.question_at(0).unwrap().id;

    let sub = AnswerSubmission {
        question_id: first,
        selected_option_id: Some(option_for(&fx, first, true).await),
        time_spent_seconds: 5,
    };
    fx.engine.submit_answer(fx.user, s.id, sub.clone(), fx.t0).await.unwrap();
    let err = fx.engine.submit_answer(fx.user, s.id, sub, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::QuestionMismatch { got } if got == first));

    let stored = fx.engine.get(fx.user, s.id).await.unwrap();
    assert_eq!(stored.current_index(), 1);
}

#[tokio::test]
async fn foreign_option_is_rejected_without_advancing() {
    let fx = fixture(2, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(2, 0), SEED, fx.t0).await.unwrap();
    let sub = AnswerSubmission {
        question_id: s.question_at(0).unwrap().id,
        selected_option_id: Some(Uuid::new_v4()),
        time_spent_seconds: 5,
    };
    let err = fx.engine.submit_answer(fx.user, s.id, sub, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
    assert_eq!(fx.engine.get(fx.user, s.id).await.unwrap().current_index(), 0);
}

#[tokio::test]
async fn skipped_question_counts_as_incorrect() {
    let fx = fixture(1, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(1, 0), SEED, fx.t0).await.unwrap();
    let sub = AnswerSubmission {
        question_id: s.question_at(0).unwrap().id,
        selected_option_id: None,
        time_spent_seconds: 0,
    };
    let SubmitOutcome::Recorded(fb) = fx.engine.submit_answer(fx.user, s.id, sub, fx.t0).await.unwrap() else {
        panic!("expected feedback");
    };
    assert!(!fb.is_correct);
}

#[tokio::test]
async fn complete_is_idempotent() {
    let fx = fixture(1, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(1, 0), SEED, fx.t0).await.unwrap();
    answer(&fx, s.id, true, fx.t0).await;

    let first = fx.engine.complete(fx.user, s.id, false, fx.t0 + Duration::seconds(30)).await.unwrap();
    let second = fx.engine.complete(fx.user, s.id, false, fx.t0 + Duration::seconds(90)).await.unwrap();
    assert_eq!(first.completed_at, second.completed_at);
    assert_eq!(second.status, ExamStatus::Completed);

    let finished: Vec<_> = fx
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, StudyEvent::ExamFinished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
}

#[tokio::test]
async fn completing_early_needs_force() {
    let fx = fixture(3, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(3, 0), SEED, fx.t0).await.unwrap();
    answer(&fx, s.id, true, fx.t0).await;

    let err = fx.engine.complete(fx.user, s.id, false, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::Incomplete { remaining: 2 }));

    let done = fx.engine.complete(fx.user, s.id, true, fx.t0).await.unwrap();
    assert_eq!(done.status, ExamStatus::Completed);
    // only the presented question is scored
    assert_eq!(done.report.total_questions, 1);
    assert_eq!(done.report.score_percent, 100);
}

#[tokio::test]
async fn next_question_after_last_answer_reports_complete() {
    let fx = fixture(1, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(1, 0), SEED, fx.t0).await.unwrap();
    answer(&fx, s.id, true, fx.t0).await;
    let err = fx.engine.next_question(fx.user, s.id, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionComplete));
}

#[tokio::test]
async fn timer_expiry_ends_the_session() {
    let fx = fixture(3, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(3, 1), SEED, fx.t0).await.unwrap();
    assert_eq!(s.time_limit_seconds, Some(60));
    answer(&fx, s.id, true, fx.t0 + Duration::seconds(10)).await;

    let late = fx.t0 + Duration::seconds(61);
    assert!(fx.engine.expire_if_timed_out(fx.user, s.id, late).await.unwrap());
    assert!(!fx.engine.expire_if_timed_out(fx.user, s.id, late).await.unwrap());

    let stored = fx.engine.get(fx.user, s.id).await.unwrap();
    assert_eq!(stored.status(), ExamStatus::Expired);

    let sub = AnswerSubmission {
        question_id: stored.question_at(1).unwrap().id,
        selected_option_id: None,
        time_spent_seconds: 1,
    };
    let err = fx.engine.submit_answer(fx.user, s.id, sub, late).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionTerminal(ExamStatus::Expired)));

    let result = fx.engine.result(fx.user, s.id, late).await.unwrap();
    assert_eq!(result.status, ExamStatus::Expired);
    assert_eq!(result.report.total_questions, 1);
    assert_eq!(result.duration_seconds, Some(61));
}

#[tokio::test]
async fn late_submission_resolves_to_expired_result() {
    let fx = fixture(2, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(2, 1), SEED, fx.t0).await.unwrap();
    let sub = AnswerSubmission {
        question_id: s.question_at(0).unwrap().id,
        selected_option_id: None,
        time_spent_seconds: 70,
    };
    let outcome = fx.engine.submit_answer(fx.user, s.id, sub, fx.t0 + Duration::seconds(70)).await.unwrap();
    let SubmitOutcome::Expired(result) = outcome else {
        panic!("expected expiry");
    };
    assert_eq!(result.status, ExamStatus::Expired);
    assert_eq!(result.report.total_questions, 0);
    assert_eq!(result.report.score_percent, 0);
}

#[tokio::test]
async fn complete_after_deadline_expires_instead() {
    let fx = fixture(1, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(1, 1), SEED, fx.t0).await.unwrap();
    answer(&fx, s.id, true, fx.t0).await;
    let done = fx.engine.complete(fx.user, s.id, false, fx.t0 + Duration::minutes(5)).await.unwrap();
    assert_eq!(done.status, ExamStatus::Expired);
}

#[tokio::test]
async fn result_of_running_session_is_rejected() {
    let fx = fixture(2, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(2, 0), SEED, fx.t0).await.unwrap();
    let err = fx.engine.result(fx.user, s.id, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionInProgress));
}

#[tokio::test]
async fn abandon_scores_presented_answers_only() {
    let fx = fixture(4, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(4, 0), SEED, fx.t0).await.unwrap();
    answer(&fx, s.id, true, fx.t0).await;
    answer(&fx, s.id, false, fx.t0).await;

    let r = fx.engine.abandon(fx.user, s.id, fx.t0 + Duration::seconds(40)).await.unwrap();
    assert_eq!(r.status, ExamStatus::Abandoned);
    assert_eq!(r.report.total_questions, 2);
    assert_eq!(r.report.score_percent, 50);

    // terminal states absorb later events
    let again = fx.engine.complete(fx.user, s.id, true, fx.t0 + Duration::seconds(90)).await.unwrap();
    assert_eq!(again.status, ExamStatus::Abandoned);
    assert_eq!(again.completed_at, r.completed_at);
}

#[tokio::test]
async fn finished_result_reveals_presented_questions() {
    let fx = fixture(4, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(4, 0), SEED, fx.t0).await.unwrap();
    answer(&fx, s.id, true, fx.t0).await;
    answer(&fx, s.id, false, fx.t0).await;

    let running = fx.engine.get(fx.user, s.id).await.unwrap().result();
    assert!(running.answer_details.is_empty());

    let r = fx.engine.abandon(fx.user, s.id, fx.t0 + Duration::seconds(40)).await.unwrap();
    assert_eq!(r.performance_message, PerformanceBand::Fail.message());
    assert_eq!(r.answer_details.len(), 2);

    let first = &r.answer_details[0];
    assert_eq!(first.question_id, s.question_at(0).unwrap().id);
    assert!(first.is_correct);
    assert_eq!(first.selected_option_id, first.correct_option_id);
    assert_eq!(first.options.len(), 4);
    assert_eq!(first.options.iter().filter(|o| o.is_correct).count(), 1);
    assert!(first.explanation.starts_with("Explanation"));
    assert_eq!(first.time_spent_seconds, 30);

    let second = &r.answer_details[1];
    assert_eq!(second.question_id, s.question_at(1).unwrap().id);
    assert!(!second.is_correct);
    assert_ne!(second.selected_option_id, second.correct_option_id);

    let json = serde_json::to_value(&r).unwrap();
    assert!(json["answerDetails"][0]["options"][0]["isCorrect"].is_boolean());
    assert_eq!(json["performanceMessage"], PerformanceBand::Fail.message());
}

#[tokio::test]
async fn other_users_cannot_see_a_session() {
    let fx = fixture(2, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(2, 0), SEED, fx.t0).await.unwrap();
    let err = fx.engine.next_question(Uuid::new_v4(), s.id, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn bank_edits_do_not_touch_running_sessions() {
    let fx = fixture(1, 0).await;
    let s = fx.engine.start_with_seed(fx.user, criteria(1, 0), SEED, fx.t0).await.unwrap();
    let qid = s.question_at(0).unwrap().id;
    let original_right = option_for(&fx, qid, true).await;

    // flip the answer key in the bank
    let mut edited = fx.repo.get_question(qid).await.unwrap();
    for o in edited.options.iter_mut() {
        o.is_correct = !o.is_correct && o.text == "wrong a";
    }
    fx.repo.upsert_question(&edited).await.unwrap();

    let sub = AnswerSubmission {
        question_id: qid,
        selected_option_id: Some(original_right),
        time_spent_seconds: 3,
    };
    let SubmitOutcome::Recorded(fb) = fx.engine.submit_answer(fx.user, s.id, sub, fx.t0).await.unwrap() else {
        panic!("expected feedback");
    };
    assert!(fb.is_correct);
    assert_eq!(fb.correct_option_id, original_right);
}

#[tokio::test]
async fn history_lists_newest_first() {
    let fx = fixture(3, 0).await;
    let older = fx.engine.start_with_seed(fx.user, criteria(1, 0), 1, fx.t0).await.unwrap();
    let newer = fx
        .engine
        .start_with_seed(fx.user, criteria(2, 0), 2, fx.t0 + Duration::hours(1))
        .await
        .unwrap();
    fx.engine.start_with_seed(Uuid::new_v4(), criteria(1, 0), 3, fx.t0).await.unwrap();

    let history = fx.engine.history(fx.user).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, newer.id);
    assert_eq!(history[1].id, older.id);
    assert_eq!(history[0].score, None);
}

/// Session store that lets another client answer the current question just
/// before the first save goes through.
struct CompetingAnswerStore {
    inner: Arc<MemoryRepo>,
    competed: AtomicBool,
}

#[async_trait]
impl SessionStore for CompetingAnswerStore {
    async fn insert_session(&self, session: &ExamSession) -> Result<(), CoreError> {
        self.inner.insert_session(session).await
    }

    async fn get_session(&self, id: SessionId) -> Result<ExamSession, CoreError> {
        self.inner.get_session(id).await
    }

    async fn save_session(&self, session: &ExamSession) -> Result<u64, CoreError> {
        if !self.competed.swap(true, Ordering::SeqCst) {
            let mut other = self.inner.get_session(session.id).await?;
            let q = other.current_question().cloned().ok_or(CoreError::NotFound("question"))?;
            let right = q.options.iter().find(|o| o.is_correct).map(|o| o.id);
            let sub = AnswerSubmission {
                question_id: q.id,
                selected_option_id: right,
                time_spent_seconds: 9,
            };
            other.record_answer(&sub, Utc::now())?;
            self.inner.save_session(&other).await?;
        }
        self.inner.save_session(session).await
    }

    async fn list_sessions(&self, owner: UserId) -> Result<Vec<ExamSession>, CoreError> {
        self.inner.list_sessions(owner).await
    }
}

#[tokio::test]
async fn losing_submit_sees_the_winning_answer() {
    let fx = fixture(3, 0).await;
    let sessions = Arc::new(CompetingAnswerStore {
        inner: fx.repo.clone(),
        competed: AtomicBool::new(false),
    });
    let engine = ExamEngine::new(fx.repo.clone(), sessions, fx.sink.clone());
    let s = engine.start_with_seed(fx.user, criteria(3, 0), SEED, fx.t0).await.unwrap();
    let qid = s.question_at(0).unwrap().id;
    let sub = AnswerSubmission {
        question_id: qid,
        selected_option_id: Some(option_for(&fx, qid, false).await),
        time_spent_seconds: 4,
    };

    // the competing answer lands first, so the retry finds question 1 already answered
    let err = engine.submit_answer(fx.user, s.id, sub, fx.t0).await.unwrap_err();
    assert!(matches!(err, CoreError::QuestionMismatch { got } if got == qid), "{err:?}");

    let stored = engine.get(fx.user, s.id).await.unwrap();
    assert_eq!(stored.current_index(), 1);
    assert_eq!(stored.version, 1);
    assert_eq!(stored.summary().answered, 1);
}
