// src/server/routes/topics.rs

use super::{ApiResult, PanelState};
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
pub struct ListFilter {
    pub source_group_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

pub async fn list(
    State(state): State<PanelState>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Json<Value>> {
    let topics = state.app.store.list_topics(filter.source_group_id).await?;
    Ok(Json(json!(topics)))
}

pub async fn set_enabled(
    State(state): State<PanelState>,
    Path((source_group_id, topic_id)): Path<(i64, i64)>,
    Json(request): Json<EnabledRequest>,
) -> ApiResult<Json<Value>> {
    state
        .app
        .store
        .set_topic_enabled(source_group_id, topic_id, request.enabled)
        .await?;
    Ok(Json(json!({"ok": true})))
}
