// src/server/routes/queue.rs

use super::{ApiError, ApiResult, PanelState};
use crate::core::errors::MirrorError;
use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
pub struct ManualEnqueueRequest {
    pub source_group_id: i64,
    pub topic_id: i64,
    /// The replacement target channel, chosen by the operator.
    pub channel_chat_id: i64,
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RequeueRequest {
    #[serde(default)]
    pub restart: bool,
}

pub async fn list(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let jobs = state.app.store.list_recovery_queue().await?;
    Ok(Json(json!(jobs)))
}

/// Manual recovery with a pre-assigned target channel. When the pair already
/// has an open job (including one still `stopping`) the request is refused in
/// place: the existing job id comes back with `deduplicated: true`.
pub async fn enqueue_manual(
    State(state): State<PanelState>,
    Json(request): Json<ManualEnqueueRequest>,
) -> ApiResult<Json<Value>> {
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

    let old_channel_chat_id = state
        .app
        .store
        .get_binding(request.source_group_id, request.topic_id)
        .await?
        .map(|binding| binding.channel_chat_id)
        .unwrap_or(0);

    let reason = request.reason.unwrap_or_else(|| "manual recovery".to_string());
    let (job_id, deduplicated) = state
        .app
        .store
        .enqueue_manual_recovery(
            request.source_group_id,
            request.topic_id,
            old_channel_chat_id,
            request.channel_chat_id,
            &reason,
        )
        .await?;
    Ok(Json(json!({"job_id": job_id, "deduplicated": deduplicated})))
}

pub async fn run_once(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let processed = state.app.recovery.run_once(None).await?;
    Ok(Json(json!({"ok": true, "processed": processed})))
}

pub async fn run_by_id(
    State(state): State<PanelState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let processed = state.app.recovery.run_once(Some(id)).await?;
    Ok(Json(json!({"ok": true, "processed": processed})))
}

pub async fn stop(
    State(state): State<PanelState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let status = state.app.store.stop_recovery(id).await?;
    Ok(Json(json!({"ok": true, "status": status.to_string()})))
}

pub async fn requeue(
    State(state): State<PanelState>,
    Path(id): Path<i64>,
    Json(request): Json<RequeueRequest>,
) -> ApiResult<Json<Value>> {
    state.app.store.requeue_recovery(id, request.restart).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn run_monitor_once(State(state): State<PanelState>) -> ApiResult<Json<Value>> {
    let report = state.app.monitor.scan_once().await?;
    Ok(Json(json!(report)))
}
