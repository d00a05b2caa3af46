use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{post, put},
};

/// Authenticated Router Module
///
/// Every lesson mutation. The router is wrapped in the authentication middleware in
/// `create_router`, and each handler additionally takes `AuthUser`, so the actor is
/// always an explicit input to the write.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /lessons
        .route("/lessons", post(handlers::create_lesson))
        // PUT/DELETE /lessons/{id}
        // Full replace of mutable fields and the link set; delete cascades to links.
        .route(
            "/lessons/{id}",
            put(handlers::update_lesson).delete(handlers::delete_lesson),
        )
        // POST /uploads/presigned
        // Short-lived upload URL for lesson PDFs and videos.
        .route("/uploads/presigned", post(handlers::get_presigned_url))
}
