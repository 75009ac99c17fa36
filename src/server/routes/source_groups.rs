// src/server/routes/source_groups.rs

use super::{ApiError, ApiResult, PanelState};
use crate::core::errors::MirrorError;
use crate::core::store::TopicUpsert;
use crate::core::upstream::session::retry_flood_wait;
use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
pub struct CreateRequest {
    pub chat_ref: String,
}

#[derive(Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

pub async fn list(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let groups = state.app.store.list_source_groups().await?;
    Ok(Json(json!(groups)))
}

/// Registers a source group from an operator-supplied ref. Only forum-capable
/// supergroups are accepted.
pub async fn create(
    State(state): State<PanelState>,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<Value>> {
    let peer = state.app.gateway.resolve(&request.chat_ref, true).await?;
    if !peer.is_supergroup() {
        return Err(ApiError(MirrorError::InvalidInput(
            "only supergroups can be mirrored".to_string(),
        )));
    }

    let title = if peer.title.is_empty() {
        peer.chat_id.to_string()
    } else {
        peer.title.clone()
    };
    let group = state.app.store.upsert_source_group(peer.chat_id, &title).await?;
    Ok(Json(json!(group)))
}

pub async fn set_enabled(
    State(state): State<PanelState>,
    Path(id): Path<i64>,
    Json(request): Json<EnabledRequest>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .store
        .set_source_group_enabled(id, request.enabled)
        .await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn delete_group(
    State(state): State<PanelState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let report = state.app.store.delete_source_group(id).await?;
    Ok(Json(json!(report)))
}

/// Pulls the group's forum topics from the reader and refreshes the local
/// topic table. New topics arrive disabled until the operator opts them in.
pub async fn sync_topics(
    State(state): State<PanelState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let Some(group) = state.app.store.get_source_group_by_id(id).await? else {
        return Err(ApiError(MirrorError::Precondition(format!(
            "source group {id} does not exist"
        ))));
    };

    state
        .app
        .gateway
        .ensure_session(crate::core::upstream::SessionRole::Reader)
        .await?;
    let reader = state.app.gateway.reader().transport();
    let source_chat_id = group.chat_id;
    let topics = retry_flood_wait(|| async move { reader.get_forum_topics(source_chat_id).await })
        .await
        .map_err(MirrorError::from)?;

    let upserts: Vec<TopicUpsert> = topics
        .into_iter()
        .map(|t| TopicUpsert {
            topic_id: t.topic_id,
            title: t.title,
        })
        .collect();
    state.app.store.upsert_topics(id, upserts).await?;

    let rows = state.app.store.list_topics(Some(id)).await?;
    Ok(Json(json!(rows)))
}
