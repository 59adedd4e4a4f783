use crate::{Category, ExamAnswer, QuestionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceBand {
    Excellent,
    Pass,
    NearPass,
    Fail,
}

/// Lower bounds, highest first. A score takes the first band it reaches.
const BAND_CUTOFFS: [(u32, PerformanceBand); 3] = [
    (90, PerformanceBand::Excellent),
    (70, PerformanceBand::Pass),
    (60, PerformanceBand::NearPass),
];

impl PerformanceBand {
    pub fn for_percent(score_percent: u32) -> Self {
        BAND_CUTOFFS
            .iter()
            .find(|(min, _)| score_percent >= *min)
            .map(|(_, band)| *band)
            .unwrap_or(PerformanceBand::Fail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceBand::Excellent => "EXCELLENT",
            PerformanceBand::Pass => "PASS",
            PerformanceBand::NearPass => "NEAR_PASS",
            PerformanceBand::Fail => "FAIL",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            PerformanceBand::Excellent => "Outstanding, well prepared for the exam",
            PerformanceBand::Pass => "Passing, keep reviewing weak areas",
            PerformanceBand::NearPass => "Borderline, focused review recommended",
            PerformanceBand::Fail => "Intensive review needed before the exam",
        }
    }
}

impl fmt::Display for PerformanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub raw_score: u32,
    pub total_questions: u32,
    pub score_percent: u32,
    pub category_breakdown: BTreeMap<Category, u32>,
    #[serde(rename = "performanceBand")]
    pub band: PerformanceBand,
    pub incorrect_count: u32,
    #[serde(rename = "avgTimePerQuestionSeconds")]
    pub avg_time_per_question: f64,
    pub incorrect_question_ids: Vec<QuestionId>,
}

fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        0
    } else {
        (part as f64 / whole as f64 * 100.0).round() as u32
    }
}

/// Scores the answers that were actually presented. Unanswered questions of
/// an abandoned or expired session are not counted against the student.
pub fn score_answers(answers: &[ExamAnswer]) -> ScoreReport {
    let total = answers.len() as u32;
    let raw = answers.iter().filter(|a| a.is_correct).count() as u32;

    let mut tally: BTreeMap<Category, (u32, u32)> = BTreeMap::new();
    for a in answers {
        let entry = tally.entry(a.category).or_default();
        entry.1 += 1;
        if a.is_correct {
            entry.0 += 1;
        }
    }
    let category_breakdown = tally
        .into_iter()
        .map(|(c, (correct, presented))| (c, percent(correct, presented)))
        .collect();

    let avg_time_per_question = if answers.is_empty() {
        0.0
    } else {
        answers.iter().map(|a| a.time_spent_seconds as f64).sum::<f64>() / answers.len() as f64
    };

    let score_percent = percent(raw, total);
    ScoreReport {
        raw_score: raw,
        total_questions: total,
        score_percent,
        category_breakdown,
        band: PerformanceBand::for_percent(score_percent),
        incorrect_count: total - raw,
        avg_time_per_question,
        incorrect_question_ids: answers
            .iter()
            .filter(|a| !a.is_correct)
            .map(|a| a.question_id)
            .collect(),
    }
}
