use crate::api::server as api_server;
use crate::cli::import;
use crate::cli::opts::*;
use crate::config::{open_services, AppConfig, Services};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use std::io::{stdin, stdout, Write};
use std::time::Instant;
use studyhub_core::repo::{QuestionBank, Repository};
use studyhub_core::{
    edit_tags, search_cards, AnswerSubmission, CardQuery, Category, CoreError, Deck, Difficulty, ExamCriteria,
    ExamResult, Quality, QuestionFilter, ReviewButton, SubmitOutcome, UserId,
};
use tracing::info;
use uuid::Uuid;

pub async fn run_cli(args: Cli) -> Result<()> {
    let cfg = AppConfig::from_cli(&args)?;
    let svc = open_services(&cfg).await?;
    let user = cfg.user;

    match args.cmd {
        Command::Deck(cmd) => deck_cmd(&svc, cmd).await,
        Command::Card(cmd) => card_cmd(&svc, cmd).await,
        Command::Due(cmd) => due_cmd(&svc, cmd).await,
        Command::Review(cmd) => review_cmd(&svc, user, cmd).await,
        Command::Question(cmd) => question_cmd(&svc, cmd).await,
        Command::Exam(cmd) => exam_cmd(&svc, user, cmd).await,
        Command::Api(api) => {
            let addr: std::net::SocketAddr = api.addr.parse().map_err(|_| anyhow!("invalid address: {}", api.addr))?;
            api_server::run(svc, addr).await
        }
    }
}

async fn deck_cmd(svc: &Services, cmd: DeckCmd) -> Result<()> {
    let repo = svc.repo.as_ref();
    match cmd {
        DeckCmd::Add { name } => {
            let d = repo.create_deck(&name).await?;
            println!("{}", d.id);
        }
        DeckCmd::List => {
            let mut v = repo.list_decks().await?;
            v.sort_by_key(|d| d.created_at);
            for d in v {
                println!("{}\t{}", d.id, d.name);
            }
        }
        DeckCmd::Rm { deck } => {
            let d = resolve_deck(repo, &deck).await?;
            repo.delete_deck(d.id).await?;
            println!("ok");
        }
        DeckCmd::Stats { deck } => {
            let d = resolve_deck(repo, &deck).await?;
            let s = svc.reviews.deck_stats(d.id, Utc::now()).await?;
            println!(
                "{}\ttotal={}\tnew={}\tdue={}\tmastered={}\tsuspended={}\tavg_ef={:.2}",
                d.name, s.total, s.new, s.due, s.mastered, s.suspended, s.average_ease_factor
            );
        }
    }
    Ok(())
}

async fn card_cmd(svc: &Services, cmd: CardCmd) -> Result<()> {
    let repo = svc.repo.as_ref();
    match cmd {
        CardCmd::Add(a) => {
            let deck = resolve_deck(repo, &a.deck).await?;
            let today = svc.boundary.date_of(Utc::now());
            let c = repo
                .add_card(deck.id, &a.front, &a.back, a.hint.as_deref(), &a.tags, today)
                .await?;
            println!("{}", c.id);
        }
        CardCmd::List {
            deck,
            search,
            tag,
            suspended,
            active,
        } => {
            let deck_id = match deck {
                Some(sel) => Some(resolve_deck(repo, &sel).await?.id),
                None => None,
            };
            let query = CardQuery {
                text: search,
                tag,
                suspended: (suspended || active).then_some(suspended),
            };
            let mut cards = search_cards(&repo.list_cards(deck_id).await?, &query);
            cards.sort_by_key(|c| c.created_at);
            for c in cards {
                let tags = if c.tags.is_empty() { "-".to_string() } else { c.tags.join(";") };
                println!("{}\t{}\t{}\ttags={}\tsuspended={}", c.id, c.front, c.back, tags, c.suspended);
            }
        }
        CardCmd::Rm { card_id } => {
            repo.delete_card(parse_uuid(&card_id)?).await?;
            println!("ok");
        }
        CardCmd::Edit(e) => {
            let mut card = repo.get_card(parse_uuid(&e.card_id)?).await?;
            if let Some(f) = e.front {
                card.front = f;
            }
            if let Some(b) = e.back {
                card.back = b;
            }
            if e.clear_hint {
                card.hint = None;
            }
            if let Some(h) = e.hint {
                card.hint = Some(h);
            }
            card.tags = edit_tags(&card.tags, &e.add_tags, &e.rm_tags);
            repo.update_card(&card).await?;
            if e.suspend || e.unsuspend {
                repo.set_suspended(card.id, e.suspend).await?;
            }
            println!("ok");
        }
    }
    Ok(())
}

async fn due_cmd(svc: &Services, cmd: DueCmd) -> Result<()> {
    let deck = resolve_deck(svc.repo.as_ref(), &cmd.deck).await?;
    let due = svc.reviews.due_cards(deck.id, Utc::now(), cmd.limit).await?;
    if due.is_empty() {
        println!("no cards due");
    }
    for c in due {
        println!("{}\t{}\t{}", c.card.id, c.schedule.next_review_date, c.card.front);
    }
    Ok(())
}

async fn review_cmd(svc: &Services, user: UserId, cmd: ReviewCmd) -> Result<()> {
    let deck = resolve_deck(svc.repo.as_ref(), &cmd.deck).await?;
    let pool = svc.reviews.due_cards(deck.id, Utc::now(), Some(cmd.max)).await?;
    if pool.is_empty() {
        println!("no cards due");
        return Ok(());
    }

    let total = pool.len();
    let mut reviewed = 0usize;
    for (i, dc) in pool.into_iter().enumerate() {
        let card = dc.card;
        println!("\n[{}/{}] {}", i + 1, total, card.id);
        println!("Q: {}", card.front);
        prompt_enter("[enter=show]")?;
        println!("A: {}", card.back);
        if let Some(h) = &card.hint {
            println!("hint: {}", h);
        }
        println!("[1=Again, 2=Hard, 3=Good, 4=Easy, q0-q5=exact quality, s=skip, x=quit]");
        let quality = loop {
            let line = read_line("grade> ")?;
            let answer = line.trim().to_lowercase();
            if let Some(b) = ReviewButton::parse(&answer) {
                break Some(b.quality());
            }
            match answer.as_str() {
                "s" | "skip" => break None,
                "x" | "quit" => {
                    println!("\nreviewed {}", reviewed);
                    return Ok(());
                }
                _ => {}
            }
            if let Some(q) = answer.strip_prefix('q').and_then(|n| n.parse::<i64>().ok()) {
                match Quality::new(q) {
                    Ok(q) => break Some(q),
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            println!("enter 1-4, q0-q5, s, or x");
        };

        if let Some(q) = quality {
            let out = svc.reviews.submit_review(user, card.id, q, Utc::now()).await?;
            reviewed += 1;
            println!("-> {}", out.message());
        }
    }

    println!("\nreviewed {}", reviewed);
    Ok(())
}

async fn question_cmd(svc: &Services, cmd: QuestionCmd) -> Result<()> {
    match cmd {
        QuestionCmd::Import { path, format } => {
            let format = import::detect_format(&path, format)?;
            let questions = import::read_questions(&path, format)?;
            for q in &questions {
                svc.bank.upsert_question(q).await?;
            }
            info!(count = questions.len(), path = %path.display(), "questions imported");
            println!("imported {}", questions.len());
        }
        QuestionCmd::List { category, difficulty } => {
            let filter = QuestionFilter {
                category: parse_opt::<Category>(category.as_deref())?,
                difficulty: parse_opt::<Difficulty>(difficulty.as_deref())?,
            };
            let mut qs = svc.bank.find_questions(&filter).await?;
            qs.sort_by(|a, b| (a.category, a.difficulty, &a.stem).cmp(&(b.category, b.difficulty, &b.stem)));
            for q in qs {
                println!("{}\t{}\t{}\t{}", q.id, q.category, q.difficulty, q.stem);
            }
        }
    }
    Ok(())
}

async fn exam_cmd(svc: &Services, user: UserId, cmd: ExamCmd) -> Result<()> {
    match cmd {
        ExamCmd::Run(run) => exam_run(svc, user, run).await,
        ExamCmd::History => {
            let history = svc.exams.history(user).await?;
            if history.is_empty() {
                println!("no exams yet");
            }
            for h in history {
                let score = match (h.score, h.score_percent) {
                    (Some(s), Some(p)) => format!("{}/{} ({}%)", s, h.question_count, p),
                    _ => format!("{}/{} answered", h.answered, h.question_count),
                };
                let band = h.performance_band.map(|b| b.to_string()).unwrap_or_else(|| "-".into());
                println!("{}\t{}\t{}\t{}\t{}", h.id, h.started_at.format("%Y-%m-%d %H:%M"), h.status, score, band);
            }
            Ok(())
        }
        ExamCmd::Result { id } => {
            let result = svc.exams.result(user, parse_uuid(&id)?, Utc::now()).await?;
            print_result(&result);
            Ok(())
        }
    }
}

async fn exam_run(svc: &Services, user: UserId, run: ExamRun) -> Result<()> {
    let criteria = ExamCriteria {
        question_count: run.count,
        time_limit_minutes: run.minutes,
        category_filter: parse_opt::<Category>(run.category.as_deref())?,
        difficulty_filter: parse_opt::<Difficulty>(run.difficulty.as_deref())?,
    };
    let session = match run.seed {
        Some(seed) => svc.exams.start_with_seed(user, criteria, seed, Utc::now()).await?,
        None => svc.exams.start(user, criteria, Utc::now()).await?,
    };
    let id = session.id;
    println!("exam {} with {} question(s)", id, session.total_questions());
    println!("[A-E=answer, s=skip, f=finish early, x=abandon]");

    loop {
        let prompt = match svc.exams.next_question(user, id, Utc::now()).await {
            Ok(p) => p,
            Err(CoreError::SessionComplete) => break,
            Err(e) => return Err(e.into()),
        };
        let q = &prompt.question;
        match prompt.time_remaining_seconds {
            Some(left) => println!("\n[{}/{}] {}:{:02} left", prompt.question_number, prompt.total_questions, left / 60, left % 60),
            None => println!("\n[{}/{}]", prompt.question_number, prompt.total_questions),
        }
        if let Some(v) = &q.vignette {
            println!("{}", v);
        }
        println!("{}", q.stem);
        for (i, o) in q.options.iter().enumerate() {
            println!("  {}. {}", option_letter(i), o.text);
        }

        let shown = Instant::now();
        let selected = loop {
            let line = read_line("answer> ")?;
            let answer = line.trim().to_uppercase();
            match answer.as_str() {
                "S" | "SKIP" => break None,
                "F" | "FINISH" => {
                    let result = svc.exams.complete(user, id, true, Utc::now()).await?;
                    print_result(&result);
                    return Ok(());
                }
                "X" | "QUIT" => {
                    let result = svc.exams.abandon(user, id, Utc::now()).await?;
                    print_result(&result);
                    return Ok(());
                }
                _ => {}
            }
            match option_index(&answer).and_then(|i| q.options.get(i)) {
                Some(o) => break Some(o.id),
                None => println!("pick one of A-{}, s, f or x", option_letter(q.options.len().saturating_sub(1))),
            }
        };

        let submission = AnswerSubmission {
            question_id: q.id,
            selected_option_id: selected,
            time_spent_seconds: shown.elapsed().as_secs().min(u32::MAX as u64) as u32,
        };
        match svc.exams.submit_answer(user, id, submission, Utc::now()).await? {
            SubmitOutcome::Recorded(fb) => {
                let correct = q
                    .options
                    .iter()
                    .position(|o| o.id == fb.correct_option_id)
                    .map(option_letter)
                    .unwrap_or('?');
                if fb.is_correct {
                    println!("correct");
                } else {
                    println!("incorrect, the answer is {}", correct);
                }
                if !fb.explanation.is_empty() {
                    println!("{}", fb.explanation);
                }
                println!("score so far: {}/{}", fb.running_score.correct, fb.running_score.total);
            }
            SubmitOutcome::Expired(result) => {
                println!("\ntime is up");
                print_result(&result);
                return Ok(());
            }
        }
    }

    let result = svc.exams.complete(user, id, false, Utc::now()).await?;
    print_result(&result);
    Ok(())
}

fn print_result(r: &ExamResult) {
    let rep = &r.report;
    println!("\nexam {} {}", r.session_id, r.status);
    println!(
        "score: {}/{} ({}%) {}",
        rep.raw_score, rep.total_questions, rep.score_percent, rep.band
    );
    println!("{}", r.performance_message);
    for (cat, n) in &rep.category_breakdown {
        println!("  {}: {}", cat, n);
    }
    println!("avg time per question: {:.1}s", rep.avg_time_per_question);
    if let Some(d) = r.duration_seconds {
        println!("duration: {}m {:02}s", d / 60, d % 60);
    }
    let missed: Vec<_> = r.answer_details.iter().filter(|d| !d.is_correct).collect();
    if !missed.is_empty() {
        println!("\nreview:");
        for (i, d) in missed.iter().enumerate() {
            let answer = d
                .options
                .iter()
                .position(|o| o.is_correct)
                .map(|p| format!("{}) {}", option_letter(p), d.options[p].text))
                .unwrap_or_default();
            println!("{:>3}. {}", i + 1, d.stem);
            println!("     answer {}", answer);
            if !d.explanation.is_empty() {
                println!("     {}", d.explanation);
            }
        }
    }
}

// ===== Helpers =====
fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| anyhow!("invalid uuid: {}", s))
}

fn parse_opt<T>(s: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = CoreError>,
{
    Ok(s.map(str::parse).transpose()?)
}

fn option_letter(i: usize) -> char {
    (b'A' + (i % 26) as u8) as char
}

fn option_index(answer: &str) -> Option<usize> {
    match answer.as_bytes() {
        [b] if b.is_ascii_uppercase() => Some((b - b'A') as usize),
        _ => None,
    }
}

async fn resolve_deck<R: Repository + ?Sized>(repo: &R, sel: &str) -> Result<Deck> {
    if let Ok(id) = Uuid::parse_str(sel) {
        if let Ok(d) = repo.get_deck(id).await {
            return Ok(d);
        }
    }
    let decks = repo.list_decks().await?;
    if let Some(d) = decks.into_iter().find(|d| d.name.eq_ignore_ascii_case(sel)) {
        return Ok(d);
    }
    bail!("deck not found: {}", sel)
}

fn prompt_enter(label: &str) -> Result<()> {
    read_line(label).map(|_| ())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush().ok();
    let mut s = String::new();
    if stdin().read_line(&mut s)? == 0 {
        bail!("input closed");
    }
    Ok(s)
}
