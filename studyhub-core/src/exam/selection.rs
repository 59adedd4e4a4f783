use crate::{CoreError, ExamQuestion, QuestionFilter};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Questions drawn for one session.
///
/// `snapshot` holds the drawn questions in id order; `order` is the serving
/// order as indices into `snapshot`.
#[derive(Clone, Debug)]
pub struct Draw {
    pub snapshot: Vec<ExamQuestion>,
    pub order: Vec<usize>,
}

/// Draws `count` questions without replacement. The same pool and seed
/// always give the same draw, whatever order the bank returned the pool in.
pub fn draw_questions(
    mut pool: Vec<ExamQuestion>,
    filter: &QuestionFilter,
    count: usize,
    seed: u64,
    allow_truncation: bool,
) -> Result<Draw, CoreError> {
    pool.retain(|q| filter.matches(q));
    pool.sort_by_key(|q| q.id);

    if pool.len() < count && !allow_truncation {
        return Err(CoreError::InsufficientQuestions {
            requested: count,
            available: pool.len(),
        });
    }

    let mut picks: Vec<usize> = (0..pool.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    picks.shuffle(&mut rng);
    picks.truncate(count);

    let mut kept = picks.clone();
    kept.sort_unstable();
    let slot: HashMap<usize, usize> = kept.iter().enumerate().map(|(s, &p)| (p, s)).collect();

    let order = picks.iter().filter_map(|p| slot.get(p).copied()).collect();
    let snapshot = kept.into_iter().map(|p| pool[p].clone()).collect();

    Ok(Draw { snapshot, order })
}
