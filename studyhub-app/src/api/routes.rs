use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use studyhub_core::{
    AnswerSubmission, CoreError, DeckStats, ExamResult, ExamSummary, QuestionPrompt, SessionId, SubmitOutcome, UserId,
};
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::error::{ApiError, ApiResult};
use crate::config::Services;

pub const USER_HEADER: &str = "x-user-id";

/// Acting user from the `x-user-id` header; absent means the local user.
pub struct Caller(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.headers.get(USER_HEADER) {
            None => Ok(Caller(Uuid::nil())),
            Some(v) => v
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .map(Caller)
                .ok_or(ApiError(CoreError::Invalid("x-user-id must be a UUID"))),
        }
    }
}

// ----- decks and cards -----

pub async fn list_decks(State(svc): State<Services>) -> ApiResult<Json<Vec<DeckOut>>> {
    let mut decks = svc.repo.list_decks().await?;
    decks.sort_by_key(|d| d.created_at);
    Ok(Json(
        decks
            .into_iter()
            .map(|d| DeckOut {
                id: d.id,
                name: d.name,
                created_at: d.created_at,
            })
            .collect(),
    ))
}

pub async fn create_deck(State(svc): State<Services>, Json(body): Json<DeckIn>) -> ApiResult<(StatusCode, Json<DeckOut>)> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(CoreError::Invalid("deck name is required").into());
    }
    let d = svc.repo.create_deck(name).await?;
    Ok((
        StatusCode::CREATED,
        Json(DeckOut {
            id: d.id,
            name: d.name,
            created_at: d.created_at,
        }),
    ))
}

pub async fn add_card(
    State(svc): State<Services>,
    Path(deck_id): Path<Uuid>,
    Json(body): Json<CardIn>,
) -> ApiResult<(StatusCode, Json<CardOut>)> {
    if body.front.trim().is_empty() || body.back.trim().is_empty() {
        return Err(CoreError::Invalid("card front and back are required").into());
    }
    let today = svc.boundary.date_of(Utc::now());
    let hint = body.hint.as_deref().filter(|h| !h.trim().is_empty());
    let card = svc
        .repo
        .add_card(deck_id, &body.front, &body.back, hint, &body.tags, today)
        .await?;
    Ok((StatusCode::CREATED, Json(card.into())))
}

pub async fn due_cards(
    State(svc): State<Services>,
    Path(deck_id): Path<Uuid>,
    Query(q): Query<DueQuery>,
) -> ApiResult<Json<Vec<DueCardOut>>> {
    let due = svc.reviews.due_cards(deck_id, Utc::now(), q.limit).await?;
    Ok(Json(due.into_iter().map(DueCardOut::from).collect()))
}

pub async fn deck_stats(State(svc): State<Services>, Path(deck_id): Path<Uuid>) -> ApiResult<Json<DeckStats>> {
    Ok(Json(svc.reviews.deck_stats(deck_id, Utc::now()).await?))
}

pub async fn post_review(
    State(svc): State<Services>,
    Caller(user): Caller,
    Json(body): Json<ReviewIn>,
) -> ApiResult<Json<ReviewOut>> {
    let quality = studyhub_core::Quality::new(body.quality)?;
    let outcome = svc.reviews.submit_review(user, body.card_id, quality, Utc::now()).await?;
    Ok(Json(outcome.into()))
}

// ----- exams -----

pub async fn start_exam(
    State(svc): State<Services>,
    Caller(user): Caller,
    Json(body): Json<StartExamIn>,
) -> ApiResult<(StatusCode, Json<StartExamOut>)> {
    let now = Utc::now();
    let session = match body.seed {
        Some(seed) => svc.exams.start_with_seed(user, body.criteria(), seed, now).await?,
        None => svc.exams.start(user, body.criteria(), now).await?,
    };
    Ok((StatusCode::CREATED, Json(StartExamOut::from(&session))))
}

pub async fn exam_history(State(svc): State<Services>, Caller(user): Caller) -> ApiResult<Json<Vec<ExamSummary>>> {
    Ok(Json(svc.exams.history(user).await?))
}

pub async fn get_exam(
    State(svc): State<Services>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<SessionOut>> {
    let session = svc.exams.get(user, id).await?;
    Ok(Json(SessionOut::new(&session, Utc::now())))
}

pub async fn next_question(
    State(svc): State<Services>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<QuestionPrompt>> {
    Ok(Json(svc.exams.next_question(user, id, Utc::now()).await?))
}

pub async fn submit_answer(
    State(svc): State<Services>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
    Json(body): Json<AnswerSubmission>,
) -> ApiResult<Response> {
    let resp = match svc.exams.submit_answer(user, id, body, Utc::now()).await? {
        SubmitOutcome::Recorded(feedback) => Json(feedback).into_response(),
        SubmitOutcome::Expired(result) => Json(ExpiredOut { expired: true, result }).into_response(),
    };
    Ok(resp)
}

pub async fn complete_exam(
    State(svc): State<Services>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
    body: Option<Json<CompleteIn>>,
) -> ApiResult<StatusCode> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    svc.exams.complete(user, id, force, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn abandon_exam(
    State(svc): State<Services>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> ApiResult<StatusCode> {
    svc.exams.abandon(user, id, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn exam_result(
    State(svc): State<Services>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<ExamResult>> {
    Ok(Json(svc.exams.result(user, id, Utc::now()).await?))
}
