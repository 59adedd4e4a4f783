use chrono::Utc;
use studyhub_core::{score_answers, Category, ExamAnswer, PerformanceBand};
use uuid::Uuid;

fn answer(category: Category, correct: bool, secs: u32) -> ExamAnswer {
    ExamAnswer {
        question_id: Uuid::new_v4(),
        category,
        selected_option_id: Some(Uuid::new_v4()),
        time_spent_seconds: secs,
        is_correct: correct,
        answered_at: Utc::now(),
    }
}

#[test]
fn empty_exam_scores_zero() {
    let r = score_answers(&[]);
    assert_eq!(r.total_questions, 0);
    assert_eq!(r.score_percent, 0);
    assert_eq!(r.band, PerformanceBand::Fail);
    assert_eq!(r.avg_time_per_question, 0.0);
    assert!(r.category_breakdown.is_empty());
}

#[test]
fn band_cutoffs() {
    assert_eq!(PerformanceBand::for_percent(100), PerformanceBand::Excellent);
    assert_eq!(PerformanceBand::for_percent(90), PerformanceBand::Excellent);
    assert_eq!(PerformanceBand::for_percent(89), PerformanceBand::Pass);
    assert_eq!(PerformanceBand::for_percent(70), PerformanceBand::Pass);
    assert_eq!(PerformanceBand::for_percent(69), PerformanceBand::NearPass);
    assert_eq!(PerformanceBand::for_percent(60), PerformanceBand::NearPass);
    assert_eq!(PerformanceBand::for_percent(59), PerformanceBand::Fail);
    assert_eq!(PerformanceBand::for_percent(0), PerformanceBand::Fail);
}

#[test]
fn percent_stays_in_range() {
    for total in 1..=12usize {
        for correct in 0..=total {
            let answers: Vec<ExamAnswer> = (0..total)
                .map(|i| answer(Category::Hematology, i < correct, 10))
                .collect();
            let r = score_answers(&answers);
            assert!(r.score_percent <= 100);
            assert_eq!(r.raw_score as usize, correct);
            assert_eq!(r.incorrect_count as usize, total - correct);
        }
    }
}

#[test]
fn breakdown_is_per_category() {
    let answers = vec![
        answer(Category::Cardiology, true, 20),
        answer(Category::Cardiology, false, 40),
        answer(Category::Nephrology, true, 30),
        answer(Category::Nephrology, true, 30),
    ];
    let r = score_answers(&answers);
    assert_eq!(r.category_breakdown[&Category::Cardiology], 50);
    assert_eq!(r.category_breakdown[&Category::Nephrology], 100);
    assert_eq!(r.score_percent, 75);
    assert_eq!(r.band, PerformanceBand::Pass);
    assert!((r.avg_time_per_question - 30.0).abs() < 1e-9);
    assert_eq!(r.incorrect_question_ids, vec![answers[1].question_id]);
}

#[test]
fn report_serializes_with_wire_names() {
    let r = score_answers(&[answer(Category::InfectiousDisease, true, 12)]);
    let v = serde_json::to_value(&r).unwrap();
    assert_eq!(v["scorePercent"], 100);
    assert_eq!(v["performanceBand"], "EXCELLENT");
    assert_eq!(v["categoryBreakdown"]["INFECTIOUS_DISEASE"], 100);
    assert_eq!(v["avgTimePerQuestionSeconds"], 12.0);
}
