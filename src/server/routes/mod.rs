// src/server/routes/mod.rs

//! The control-panel API: one endpoint per state-mutation verb plus read-only
//! listings. Everything except the login/logout pair requires a valid panel
//! session cookie.

mod bindings;
mod channels;
mod panel;
mod queue;
mod source_groups;
mod topics;

use crate::core::errors::MirrorError;
use crate::core::state::AppState;
use crate::server::PanelAuth;
use crate::server::panel_auth::session_token_from_cookies;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct PanelState {
    pub app: Arc<AppState>,
    pub auth: Arc<PanelAuth>,
}

/// Error wrapper translating the core taxonomy into HTTP statuses.
pub struct ApiError(pub MirrorError);

impl From<MirrorError> for ApiError {
    fn from(e: MirrorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MirrorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MirrorError::Precondition(_) | MirrorError::Stopped => StatusCode::CONFLICT,
            MirrorError::ChannelUnavailable(_) => StatusCode::BAD_GATEWAY,
            MirrorError::FloodWait { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: PanelState) -> Router {
    let public = Router::new()
        .route("/api/panel/login", post(panel::login))
        .route("/api/panel/logout", post(panel::logout));

    let protected = Router::new()
        .route("/api/auth/status", get(panel::auth_status))
        .route(
            "/api/source-groups",
            get(source_groups::list).post(source_groups::create),
        )
        .route(
            "/api/source-groups/{id}",
            delete(source_groups::delete_group),
        )
        .route(
            "/api/source-groups/{id}/enabled",
            post(source_groups::set_enabled),
        )
        .route(
            "/api/source-groups/{id}/sync-topics",
            post(source_groups::sync_topics),
        )
        .route("/api/topics", get(topics::list))
        .route(
            "/api/topics/{source_group_id}/{topic_id}/enabled",
            post(topics::set_enabled),
        )
        .route("/api/bindings", get(bindings::list).post(bindings::create))
        .route(
            "/api/bindings/{source_group_id}/{topic_id}/active",
            post(bindings::set_active),
        )
        .route("/api/channels", get(channels::list))
        .route(
            "/api/channels/standby",
            get(channels::list_standby).post(channels::admit),
        )
        .route("/api/channels/refresh", post(channels::refresh))
        .route("/api/channels/clear-unused", post(channels::clear_unused))
        .route("/api/channels/{chat_id}", delete(channels::delete_channel))
        .route("/api/banned", get(channels::list_banned))
        .route("/api/banned/clear", post(channels::clear_banned))
        .route(
            "/api/banned/{source_group_id}/{topic_id}/{channel_chat_id}",
            delete(channels::remove_banned),
        )
        .route(
            "/api/queue/recovery",
            get(queue::list).post(queue::enqueue_manual),
        )
        .route("/api/queue/recovery/run-once", post(queue::run_once))
        .route("/api/queue/recovery/{id}/run", post(queue::run_by_id))
        .route("/api/queue/recovery/{id}/stop", post(queue::stop))
        .route("/api/queue/recovery/{id}/requeue", post(queue::requeue))
        .route("/api/monitor/run-once", post(queue::run_monitor_once))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
}

/// Rejects requests without a valid session cookie.
async fn require_session(
    State(state): State<PanelState>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_token_from_cookies);

    match token {
        Some(token) if state.auth.verify_session_token(token, PanelAuth::now_ts()) => {
            next.run(request).await
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "panel session required"})),
        )
            .into_response(),
    }
}
