//! REST route table.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/state/{user_id}", get(handlers::state::get_state))
        .route("/api/diary/{user_id}/{date}", get(handlers::diary::get_diary))
        .route("/api/proactive/pull", post(handlers::proactive::pull))
        .route(
            "/api/conversation/{user_id}/{log_id}",
            delete(handlers::conversation::delete_message).put(handlers::conversation::edit_message),
        )
        .route(
            "/api/conversation/{user_id}/{log_id}/versions",
            get(handlers::conversation::list_versions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
