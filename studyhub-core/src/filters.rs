use crate::Card;

/// Card search criteria. Unset fields match everything; set fields must all
/// match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardQuery {
    /// Case-insensitive substring of front, back, hint or any tag.
    pub text: Option<String>,
    /// Exact tag, ignoring case.
    pub tag: Option<String>,
    pub suspended: Option<bool>,
}

impl CardQuery {
    pub fn matches(&self, card: &Card) -> bool {
        let text_ok = match self.text.as_deref().map(|t| t.trim().to_lowercase()) {
            None => true,
            Some(q) if q.is_empty() => true,
            Some(q) => [Some(&card.front), Some(&card.back), card.hint.as_ref()]
                .into_iter()
                .flatten()
                .chain(card.tags.iter())
                .any(|field| field.to_lowercase().contains(&q)),
        };
        let tag_ok = self
            .tag
            .as_deref()
            .map(|want| card.tags.iter().any(|t| t.eq_ignore_ascii_case(want.trim())))
            .unwrap_or(true);
        let suspended_ok = self.suspended.map(|s| s == card.suspended).unwrap_or(true);
        text_ok && tag_ok && suspended_ok
    }
}

pub fn search_cards(cards: &[Card], query: &CardQuery) -> Vec<Card> {
    cards.iter().filter(|c| query.matches(c)).cloned().collect()
}

/// Adds `add` and removes `remove` (both case-insensitive) without
/// duplicating existing tags.
pub fn edit_tags(tags: &[String], add: &[String], remove: &[String]) -> Vec<String> {
    let mut out = tags.to_vec();
    for t in add {
        if !out.iter().any(|x| x.eq_ignore_ascii_case(t)) {
            out.push(t.clone());
        }
    }
    out.retain(|x| !remove.iter().any(|r| x.eq_ignore_ascii_case(r)));
    out
}
