//! Question bank import.
//!
//! JSON: an array of `{stem, vignette?, category, difficulty, explanation?,
//! options: [{text, correct}]}`.
//!
//! CSV (with header): `category,difficulty,stem,explanation,answer,option_a,...`
//! where `answer` is the letter of the correct option column. Empty option
//! columns are skipped, but letters always follow column positions.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use studyhub_core::{Category, Difficulty, ExamQuestion};

use crate::cli::opts::ImportFormat;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionIn {
    stem: String,
    #[serde(default)]
    vignette: Option<String>,
    category: String,
    difficulty: String,
    #[serde(default)]
    explanation: String,
    options: Vec<OptionIn>,
}

#[derive(Debug, Deserialize)]
struct OptionIn {
    text: String,
    #[serde(default)]
    correct: bool,
}

/// Format from the flag, else from the file extension.
pub fn detect_format(path: &Path, explicit: Option<ImportFormat>) -> Result<ImportFormat> {
    if let Some(f) = explicit {
        return Ok(f);
    }
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(e) if e == "json" => Ok(ImportFormat::Json),
        Some(e) if e == "csv" => Ok(ImportFormat::Csv),
        _ => bail!("cannot tell the format of {}; pass --format", path.display()),
    }
}

pub fn read_questions(path: &Path, format: ImportFormat) -> Result<Vec<ExamQuestion>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    match format {
        ImportFormat::Json => parse_json(file),
        ImportFormat::Csv => parse_csv(file),
    }
}

pub fn parse_json<R: Read>(rdr: R) -> Result<Vec<ExamQuestion>> {
    let items: Vec<QuestionIn> = serde_json::from_reader(rdr).context("reading question json")?;
    items
        .into_iter()
        .enumerate()
        .map(|(i, q)| build(q).with_context(|| format!("question #{}", i + 1)))
        .collect()
}

pub fn parse_csv<R: Read>(rdr: R) -> Result<Vec<ExamQuestion>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(rdr);
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let line = i + 2;
        let rec = rec.with_context(|| format!("line {line}"))?;
        let field = |n: usize| rec.get(n).unwrap_or("").to_string();

        let answer = field(4).to_ascii_uppercase();
        let correct_idx = match answer.as_bytes() {
            [b] if b.is_ascii_uppercase() => (b - b'A') as usize,
            _ => bail!("line {line}: answer must be a single letter, got {answer:?}"),
        };
        if rec.get(5 + correct_idx).map_or(true, str::is_empty) {
            bail!("line {line}: answer {answer} names an empty or missing option column");
        }
        let options: Vec<OptionIn> = rec
            .iter()
            .skip(5)
            .enumerate()
            .filter(|(_, t)| !t.is_empty())
            .map(|(j, t)| OptionIn {
                text: t.to_string(),
                correct: j == correct_idx,
            })
            .collect();

        let q = QuestionIn {
            category: field(0),
            difficulty: field(1),
            stem: field(2),
            vignette: None,
            explanation: field(3),
            options,
        };
        out.push(build(q).with_context(|| format!("line {line}"))?);
    }
    Ok(out)
}

fn build(q: QuestionIn) -> Result<ExamQuestion> {
    let category: Category = q.category.parse().map_err(|_| anyhow!("unknown category {:?}", q.category))?;
    let difficulty: Difficulty = q
        .difficulty
        .parse()
        .map_err(|_| anyhow!("unknown difficulty {:?}", q.difficulty))?;
    let mut question = ExamQuestion::new(
        q.stem,
        category,
        difficulty,
        q.explanation,
        q.options.into_iter().map(|o| (o.text, o.correct)).collect(),
    );
    question.vignette = q.vignette.filter(|v| !v.trim().is_empty());
    question.validate()?;
    Ok(question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_become_questions() {
        let data = "\
category,difficulty,stem,explanation,answer,option_a,option_b,option_c,option_d
cardiology,medium,Most common cause of mitral stenosis?,Rheumatic fever,B,Endocarditis,Rheumatic heart disease,Marfan,
infectious disease,HARD,Drug of choice for syphilis?,Penicillin G,a,Penicillin G,Doxycycline,Ceftriaxone,Azithromycin
";
        let qs = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].category, Category::Cardiology);
        assert_eq!(qs[0].options.len(), 3);
        assert_eq!(qs[0].correct_option().unwrap().text, "Rheumatic heart disease");
        assert_eq!(qs[1].category, Category::InfectiousDisease);
        assert_eq!(qs[1].difficulty, Difficulty::Hard);
    }

    #[test]
    fn csv_answer_letter_follows_column_position() {
        let data = "\
category,difficulty,stem,explanation,answer,option_a,option_b,option_c,option_d
nephrology,easy,Most common kidney stone?,Calcium oxalate,C,Uric acid,,Calcium oxalate,Struvite
";
        let qs = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(qs[0].options.len(), 3);
        assert_eq!(qs[0].correct_option().unwrap().text, "Calcium oxalate");

        let blank = "\
category,difficulty,stem,explanation,answer,option_a,option_b,option_c
nephrology,easy,Stem,Why,B,One,,Three
";
        let err = parse_csv(blank.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("empty or missing option"));
    }

    #[test]
    fn csv_answer_outside_options_is_rejected() {
        let data = "\
category,difficulty,stem,explanation,answer,option_a,option_b
neurology,easy,Stem,Why,D,One,Two
";
        let err = parse_csv(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn json_questions_are_validated() {
        let ok = r#"[{"stem":"S","category":"EENT","difficulty":"EASY",
            "options":[{"text":"a","correct":true},{"text":"b"}]}]"#;
        assert_eq!(parse_json(ok.as_bytes()).unwrap().len(), 1);

        let bad = r#"[{"stem":"S","category":"EENT","difficulty":"EASY",
            "options":[{"text":"a"},{"text":"b"}]}]"#;
        assert!(parse_json(bad.as_bytes()).is_err());
    }
}
