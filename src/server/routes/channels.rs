// src/server/routes/channels.rs

use super::{ApiResult, PanelState};
use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
pub struct AdmitRequest {
    pub refs: Vec<String>,
}

pub async fn list(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let channels = state.app.store.list_channels().await?;
    Ok(Json(json!(channels)))
}

pub async fn list_standby(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let channels = state.app.store.list_standby_channels().await?;
    Ok(Json(json!(channels)))
}

/// Batch admission of operator-supplied channel refs into the standby pool.
pub async fn admit(
    State(state): State<PanelState>,
    Json(request): Json<AdmitRequest>,
) -> ApiResult<Json<Value>> {
    let report = state.app.pool.admit_channels(&request.refs).await?;
    Ok(Json(json!(report)))
}

pub async fn refresh(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let report = state.app.pool.refresh().await?;
    Ok(Json(json!(report)))
}

pub async fn clear_unused(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let removed = state.app.store.clear_unused_channels().await?;
    Ok(Json(json!({"removed": removed})))
}

pub async fn delete_channel(
    State(state): State<PanelState>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.app.store.delete_channel(chat_id).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn list_banned(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let banned = state.app.store.list_banned_channels().await?;
    Ok(Json(json!(banned)))
}

pub async fn remove_banned(
    State(state): State<PanelState>,
    Path((source_group_id, topic_id, channel_chat_id)): Path<(i64, i64, i64)>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .store
        .remove_banned_channel(source_group_id, topic_id, channel_chat_id)
        .await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn clear_banned(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let removed = state.app.store.clear_banned_channels().await?;
    Ok(Json(json!({"removed": removed})))
}
