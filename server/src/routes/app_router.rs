use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::{request_tracing, ServerState};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/", get(|| async { "Mailsift server" }))
            .route(
                "/accounts/:account_id/emails",
                get(super::emails::handler_list_emails),
            )
            .route("/emails/:id", get(super::emails::handler_get_email))
            .route(
                "/emails/:id/reprocess",
                post(super::emails::handler_reprocess_email),
            )
            .route("/review", get(super::review::handler_list_review_items))
            .route("/review/:id", get(super::review::handler_get_review_item))
            .route("/review/:id/approve", post(super::review::handler_approve))
            .route("/review/:id/reject", post(super::review::handler_reject))
            .route("/review/:id/modify", post(super::review::handler_modify))
            .route("/scans", post(super::scans::handler_start_scan))
            .route("/scans/:id", get(super::scans::handler_get_scan))
            .route("/scans/:id/pause", post(super::scans::handler_pause_scan))
            .route("/scans/:id/resume", post(super::scans::handler_resume_scan))
            .route("/scans/:id/cancel", post(super::scans::handler_cancel_scan))
            .route(
                "/notifications",
                post(super::notifications::handler_receive_notification),
            )
            .route(
                "/subscriptions",
                post(super::notifications::handler_create_subscription),
            )
            .route(
                "/subscriptions/:account_id/renew",
                post(super::notifications::handler_renew_subscription),
            )
            .route(
                "/subscriptions/:account_id",
                delete(super::notifications::handler_stop_subscription),
            )
            .route(
                "/feedback",
                post(super::feedback::handler_record_feedback),
            )
            .route("/events", get(super::events::handler_query_events))
            .layer(request_tracing::trace_with_request_id_layer())
            .layer(CorsLayer::permissive())
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
