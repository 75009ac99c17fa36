// src/server/routes/panel.rs

//! Panel session management and upstream auth status.

use super::{ApiResult, PanelState};
use crate::server::PanelAuth;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

pub async fn login(
    State(state): State<PanelState>,
    Json(request): Json<LoginRequest>,
) -> Response {
    if !state.auth.verify_password(&request.password) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid password"})),
        )
            .into_response();
    }

    let token = state.auth.build_session_token(PanelAuth::now_ts());
    let mut response = Json(json!({"ok": true})).into_response();
    if let Ok(cookie) = HeaderValue::from_str(&state.auth.session_cookie(&token)) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

pub async fn logout(State(state): State<PanelState>) -> Response {
    let mut response = Json(json!({"ok": true})).into_response();
    if let Ok(cookie) = HeaderValue::from_str(&state.auth.clear_cookie()) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

pub async fn auth_status(State(state): State<PanelState>) -> ApiResult<Response> {
    let status = state.app.gateway.auth_status().await;
    Ok(Json(status).into_response())
}
