use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated, read-only endpoints. An authenticated caller may use them too,
/// in which case unpublished drafts become visible.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /lessons?level=&year=&subject=&chapter=&grade=&published=&sort=
        .route("/lessons", get(handlers::list_lessons))
        // GET /lessons/{id}
        .route("/lessons/{id}", get(handlers::get_lesson))
        // GET /browse?level=&subject=&grade=
        // Published lessons grouped for the student view.
        .route("/browse", get(handlers::browse_lessons))
}
