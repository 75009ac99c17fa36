// src/server/routes/bindings.rs

use super::{ApiError, ApiResult, PanelState};
use crate::core::errors::MirrorError;
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
pub struct ListFilter {
    pub source_group_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateRequest {
    pub source_group_id: i64,
    pub topic_id: i64,
    pub channel_ref: String,
}

#[derive(Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

pub async fn list(
    State(state): State<PanelState>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Json<Value>> {
    let bindings = state.app.store.list_bindings(filter.source_group_id).await?;
    Ok(Json(json!(bindings)))
}

/// Binds a topic to a target channel. The channel is resolved through the
/// writer and tracked; the upsert flips it to bound in the same transaction.
pub async fn create(
    State(state): State<PanelState>,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<Value>> {
    if state
        .app
        .store
        .get_source_group_by_id(request.source_group_id)
        .await?
        .is_none()
    {
        return Err(ApiError(MirrorError::Precondition(format!(
            "source group {} does not exist",
            request.source_group_id
        ))));
    }
    if state
        .app
        .store
        .get_topic(request.source_group_id, request.topic_id)
        .await?
        .is_none()
    {
        return Err(ApiError(MirrorError::Precondition(format!(
            "topic {} does not exist",
            request.topic_id
        ))));
    }

    let peer = state.app.gateway.resolve(&request.channel_ref, false).await?;
    if !peer.is_broadcast() {
        return Err(ApiError(MirrorError::InvalidInput(format!(
            "{} is not a broadcast channel",
            request.channel_ref
        ))));
    }

    let title = if peer.title.is_empty() {
        peer.chat_id.to_string()
    } else {
        peer.title.clone()
    };
    state
        .app
        .store
        .upsert_channel(peer.chat_id, &title, false, true, None)
        .await?;
    let binding = state
        .app
        .store
        .upsert_binding(request.source_group_id, request.topic_id, peer.chat_id)
        .await?;
    Ok(Json(json!(binding)))
}

pub async fn set_active(
    State(state): State<PanelState>,
    Path((source_group_id, topic_id)): Path<(i64, i64)>,
    Json(request): Json<ActiveRequest>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .store
        .set_binding_active(source_group_id, topic_id, request.active)
        .await?;
    Ok(Json(json!({"ok": true})))
}
