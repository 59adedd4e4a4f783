use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use studyhub_core::repo::{QuestionBank, Repository, SessionStore};
use studyhub_core::{
    AnswerSubmission, Category, CoreError, Difficulty, ExamCriteria, ExamEngine, ExamQuestion, ExamStatus, MemorySink,
    Quality, QuestionFilter, ReviewService,
};
use studyhub_sqlite::SqliteRepo;
use uuid::Uuid;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn question(stem: &str, category: Category, difficulty: Difficulty) -> ExamQuestion {
    ExamQuestion::new(
        stem,
        category,
        difficulty,
        "see notes",
        vec![("correct".to_string(), true), ("distractor".to_string(), false)],
    )
}

#[tokio::test]
async fn card_gets_a_default_schedule() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    let deck = repo.create_deck("Endocrine").await.unwrap();
    let card = repo
        .add_card(deck.id, "DKA", "Kussmaul", None, &["acid-base".to_string()], day(2024, 3, 1))
        .await
        .unwrap();

    let sch = repo.get_schedule(card.id).await.unwrap();
    assert_eq!(sch.repetitions, 0);
    assert_eq!(sch.interval_days, 0);
    assert_eq!(sch.next_review_date, day(2024, 3, 1));
    assert_eq!(sch.version, 0);
    assert!(sch.is_new());

    let joined = repo.list_deck_cards(deck.id).await.unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].card.tags, vec!["acid-base".to_string()]);
}

#[tokio::test]
async fn deck_names_are_unique_ignoring_case() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    repo.create_deck("Psych").await.unwrap();
    assert!(matches!(repo.create_deck("PSYCH").await, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn unknown_deck_is_not_found() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    assert!(matches!(repo.list_deck_cards(Uuid::new_v4()).await, Err(CoreError::NotFound(_))));
    assert!(matches!(
        repo.add_card(Uuid::new_v4(), "f", "b", None, &[], day(2024, 1, 1)).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn schedule_save_is_compare_and_swap() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    let deck = repo.create_deck("D").await.unwrap();
    let card = repo.add_card(deck.id, "f", "b", None, &[], day(2024, 1, 1)).await.unwrap();

    let mut a = repo.get_schedule(card.id).await.unwrap();
    let b = a.clone();
    a.repetitions = 1;
    a.last_quality = Some(Quality::new(4).unwrap());
    assert_eq!(repo.save_schedule(&a).await.unwrap(), 1);
    assert!(matches!(repo.save_schedule(&b).await, Err(CoreError::VersionConflict(_))));

    let stored = repo.get_schedule(card.id).await.unwrap();
    assert_eq!(stored.repetitions, 1);
    assert_eq!(stored.last_quality, Some(Quality::new(4).unwrap()));

    repo.delete_card(card.id).await.unwrap();
    assert!(matches!(repo.save_schedule(&stored).await, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn review_service_against_sqlite() {
    let repo = Arc::new(SqliteRepo::open_memory().await.unwrap());
    let svc = ReviewService::new(repo.clone(), Arc::new(MemorySink::new()));
    let deck = repo.create_deck("Cardio").await.unwrap();
    let card = repo.add_card(deck.id, "f", "b", None, &[], day(2024, 4, 1)).await.unwrap();
    let now = Utc.with_ymd_and_hms(2024, 4, 1, 7, 0, 0).unwrap();

    svc.submit_review(Uuid::new_v4(), card.id, Quality::new(2).unwrap(), now).await.unwrap();
    let sch = repo.get_schedule(card.id).await.unwrap();
    assert_eq!(sch.repetitions, 0);
    assert_eq!(sch.interval_days, 1);
    assert_eq!(sch.next_review_date, day(2024, 4, 2));

    let stats = svc.deck_stats(deck.id, now).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.due, 0);
    assert_eq!(stats.new, 0);
}

#[tokio::test]
async fn question_filters_apply_in_sql() {
    let repo = SqliteRepo::open_memory().await.unwrap();
    repo.upsert_question(&question("a", Category::Cardiology, Difficulty::Easy)).await.unwrap();
    repo.upsert_question(&question("b", Category::Cardiology, Difficulty::Hard)).await.unwrap();
    let mut retired = question("c", Category::Cardiology, Difficulty::Hard);
    retired.active = false;
    repo.upsert_question(&retired).await.unwrap();
    repo.upsert_question(&question("d", Category::Neurology, Difficulty::Hard)).await.unwrap();

    let all = repo.find_questions(&QuestionFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let cardio_hard = QuestionFilter {
        category: Some(Category::Cardiology),
        difficulty: Some(Difficulty::Hard),
    };
    let found = repo.find_questions(&cardio_hard).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].stem, "b");

    // upsert replaces in place
    retired.active = true;
    repo.upsert_question(&retired).await.unwrap();
    assert_eq!(repo.find_questions(&cardio_hard).await.unwrap().len(), 2);
}

#[tokio::test]
async fn exam_flow_persists_sessions() {
    let repo = Arc::new(SqliteRepo::open_memory().await.unwrap());
    for n in 0..4 {
        repo.upsert_question(&question(&format!("q{n}"), Category::Hematology, Difficulty::Medium))
            .await
            .unwrap();
    }
    let sink = Arc::new(MemorySink::new());
    let engine = ExamEngine::new(repo.clone(), repo.clone(), sink.clone());
    let user = Uuid::new_v4();
    let t0 = Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap();

    let criteria = ExamCriteria {
        question_count: 2,
        category_filter: Some(Category::Hematology),
        ..Default::default()
    };
    let s = engine.start_with_seed(user, criteria, 5, t0).await.unwrap();
    for i in 0..2 {
        let q = s.question_at(i).unwrap();
        let sub = AnswerSubmission {
            question_id: q.id,
            selected_option_id: q.correct_option().map(|o| o.id),
            time_spent_seconds: 20,
        };
        engine.submit_answer(user, s.id, sub, t0).await.unwrap();
    }
    let result = engine.complete(user, s.id, false, t0 + chrono::Duration::seconds(50)).await.unwrap();
    assert_eq!(result.status, ExamStatus::Completed);
    assert_eq!(result.report.score_percent, 100);

    let stored = repo.get_session(s.id).await.unwrap();
    assert_eq!(stored.status(), ExamStatus::Completed);
    assert_eq!(stored.version, 3);

    let mut stale = stored.clone();
    stale.version = 1;
    assert!(matches!(repo.save_session(&stale).await, Err(CoreError::VersionConflict(_))));

    let history = engine.history(user).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].score_percent, Some(100));
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn file_database_is_created_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studyhub.db");
    {
        let repo = SqliteRepo::open_file(&path).await.unwrap();
        repo.create_deck("Persisted").await.unwrap();
    }
    let repo = SqliteRepo::open_file(&path).await.unwrap();
    let decks = repo.list_decks().await.unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].name, "Persisted");
}

#[tokio::test]
async fn suspended_cards_drop_out_of_the_due_list() {
    let repo = Arc::new(SqliteRepo::open_memory().await.unwrap());
    let svc = ReviewService::new(repo.clone(), Arc::new(MemorySink::new()));
    let deck = repo.create_deck("Neuro").await.unwrap();
    let a = repo.add_card(deck.id, "a", "b", None, &[], day(2024, 5, 1)).await.unwrap();
    repo.add_card(deck.id, "c", "d", None, &[], day(2024, 5, 1)).await.unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();

    repo.set_suspended(a.id, true).await.unwrap();
    assert!(repo.get_card(a.id).await.unwrap().suspended);
    let due = svc.due_cards(deck.id, now, None).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_ne!(due[0].card.id, a.id);

    repo.set_suspended(a.id, false).await.unwrap();
    assert_eq!(svc.due_cards(deck.id, now, None).await.unwrap().len(), 2);
    assert!(matches!(repo.set_suspended(Uuid::new_v4(), true).await, Err(CoreError::NotFound(_))));
}
