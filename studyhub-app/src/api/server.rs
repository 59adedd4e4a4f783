use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes::*;
use crate::config::Services;

pub fn router(services: Services) -> Router {
    Router::new()
        .route("/decks", get(list_decks).post(create_deck))
        .route("/decks/:deck_id/cards", post(add_card))
        .route("/decks/:deck_id/due", get(due_cards))
        .route("/decks/:deck_id/stats", get(deck_stats))
        .route("/reviews", post(post_review))
        .route("/exams", get(exam_history).post(start_exam))
        .route("/exams/:id", get(get_exam))
        .route("/exams/:id/question", get(next_question))
        .route("/exams/:id/answers", post(submit_answer))
        .route("/exams/:id/complete", post(complete_exam))
        .route("/exams/:id/abandon", post(abandon_exam))
        .route("/exams/:id/result", get(exam_result))
        .with_state(services)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(services: Services, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(services);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
