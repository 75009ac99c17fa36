// src/core/standby.rs

//! The standby-channel pool.
//!
//! A channel belongs to the pool iff it is a broadcast channel and the writer
//! identity holds administrator rights on it. Admission is event-driven (the
//! `my_chat_member` long-poll) with a batch path for operator-supplied refs;
//! the periodic refresh re-verifies only the current pool, never the broader
//! channel table.

use crate::core::errors::MirrorError;
use crate::core::store::Store;
use crate::core::upstream::gateway::UpstreamGateway;
use crate::core::upstream::session::{SessionRole, retry_flood_wait, retry_flood_wait_capped};
use crate::core::upstream::transport::{UpstreamError, UpstreamErrorKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Settings key holding the membership-update offset cursor.
const UPDATES_OFFSET_KEY: &str = "bot_updates_offset";
/// Long-poll window for the membership stream.
const UPDATES_POLL_TIMEOUT: Duration = Duration::from_secs(20);
/// Access checks absorb flood-waits only up to this bound.
const ACCESS_CHECK_FLOOD_CAP: u32 = 15;
/// Channel titles are capped by the provider.
const MAX_TITLE_LEN: usize = 128;
/// Rename fallback for topics without a usable title.
const UNTITLED_TOPIC: &str = "未命名话题";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberSyncReport {
    pub bootstrap: bool,
    pub received: usize,
    pub tracked_channels: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AdmitReport {
    pub admitted: Vec<i64>,
    pub rejected: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    pub kept: usize,
    pub removed: usize,
    pub flipped_in_use: usize,
}

pub struct StandbyPool {
    store: Store,
    gateway: Arc<UpstreamGateway>,
}

impl StandbyPool {
    pub fn new(store: Store, gateway: Arc<UpstreamGateway>) -> Self {
        Self { store, gateway }
    }

    /// Drains the `my_chat_member` stream and mirrors admin grants into the
    /// pool.
    ///
    /// The offset cursor lives in settings. On first run the cursor is
    /// fast-forwarded past the current latest update without processing, so
    /// historical admin changes are never replayed.
    pub async fn sync_member_updates(&self) -> Result<MemberSyncReport, MirrorError> {
        let writer = self.gateway.writer().transport();

        let offset_value = self.store.get_setting(UPDATES_OFFSET_KEY).await?;
        let offset = match offset_value.as_deref().map(str::trim) {
            None | Some("") | Some("0") => {
                let latest = writer
                    .get_member_updates(-1, Duration::from_secs(0))
                    .await?;
                let next = latest
                    .iter()
                    .map(|u| u.update_id + 1)
                    .max()
                    .unwrap_or(0);
                self.store
                    .set_setting(UPDATES_OFFSET_KEY, &next.to_string())
                    .await?;
                return Ok(MemberSyncReport {
                    bootstrap: true,
                    ..MemberSyncReport::default()
                });
            }
            Some(text) => text.parse::<i64>().unwrap_or(0),
        };

        let updates = writer
            .get_member_updates(offset, UPDATES_POLL_TIMEOUT)
            .await?;
        if updates.is_empty() {
            return Ok(MemberSyncReport::default());
        }

        let mut report = MemberSyncReport {
            received: updates.len(),
            ..MemberSyncReport::default()
        };
        let mut max_update = offset;

        for update in updates {
            if update.update_id >= max_update {
                max_update = update.update_id + 1;
            }
            if update.chat_kind != "channel" || update.chat_id == 0 {
                continue;
            }

            let title = if update.title.is_empty() {
                update.chat_id.to_string()
            } else {
                update.title.clone()
            };
            let is_admin = matches!(update.new_status.as_str(), "administrator" | "creator");
            let is_left = matches!(update.new_status.as_str(), "left" | "kicked");
            let active_bindings = self.store.get_bindings_by_channel(update.chat_id).await?;

            if (is_left || !is_admin) && active_bindings.is_empty() {
                self.store.delete_channel(update.chat_id).await?;
                report.tracked_channels += 1;
                continue;
            }

            self.store
                .upsert_channel(
                    update.chat_id,
                    &title,
                    is_admin && active_bindings.is_empty(),
                    !active_bindings.is_empty(),
                    Some(Store::now()),
                )
                .await?;
            report.tracked_channels += 1;
        }

        self.store
            .set_setting(UPDATES_OFFSET_KEY, &max_update.to_string())
            .await?;
        Ok(report)
    }

    /// Batch admission of operator-supplied channel refs.
    pub async fn admit_channels(&self, refs: &[String]) -> Result<AdmitReport, MirrorError> {
        let mut report = AdmitReport::default();
        for input in refs {
            match self.admit_one(input).await {
                Ok(chat_id) => report.admitted.push(chat_id),
                Err(e) => report.rejected.push((input.clone(), e.to_string())),
            }
        }
        Ok(report)
    }

    async fn admit_one(&self, input: &str) -> Result<i64, MirrorError> {
        let peer = self.gateway.resolve(input, false).await?;
        if !peer.is_broadcast() {
            return Err(MirrorError::InvalidInput(format!(
                "{input} is not a broadcast channel"
            )));
        }

        let writer = self.gateway.writer().transport();
        let chat_id = peer.chat_id;
        let permissions =
            retry_flood_wait(|| async move { writer.get_permissions(chat_id).await }).await?;
        if !permissions.is_admin {
            return Err(MirrorError::Precondition(format!(
                "writer is not an administrator of {input}"
            )));
        }

        let active_bindings = self.store.get_bindings_by_channel(peer.chat_id).await?;
        let title = if peer.title.is_empty() {
            peer.chat_id.to_string()
        } else {
            peer.title.clone()
        };
        self.store
            .upsert_channel(
                peer.chat_id,
                &title,
                active_bindings.is_empty(),
                !active_bindings.is_empty(),
                Some(Store::now()),
            )
            .await?;
        Ok(peer.chat_id)
    }

    /// Re-verifies every current standby channel. Lost admin rights remove
    /// the row (or flip it to in-use when bindings reappeared in the
    /// meantime). The wider channel table is left alone: the pool is
    /// authoritative and must not regrow from stale rows.
    pub async fn refresh(&self) -> Result<RefreshReport, MirrorError> {
        let mut report = RefreshReport::default();
        let writer = self.gateway.writer().transport();

        for channel in self.store.list_standby_channels().await? {
            report.checked += 1;
            let chat_id = channel.chat_id;
            let verdict =
                retry_flood_wait(|| async move { writer.get_permissions(chat_id).await }).await;

            let is_admin = match verdict {
                Ok(permissions) => permissions.is_admin,
                Err(e) if is_loss_of_access(&e) => false,
                Err(e) => {
                    // Transient failure: keep the row rather than shrink the
                    // pool on a network hiccup.
                    warn!(
                        "standby re-check of {} failed transiently: {}",
                        channel.chat_id, e
                    );
                    report.kept += 1;
                    continue;
                }
            };

            if is_admin {
                self.store
                    .upsert_channel(
                        channel.chat_id,
                        &channel.title,
                        true,
                        false,
                        Some(Store::now()),
                    )
                    .await?;
                report.kept += 1;
                continue;
            }

            let active_bindings = self.store.get_bindings_by_channel(channel.chat_id).await?;
            if active_bindings.is_empty() {
                self.store.delete_channel(channel.chat_id).await?;
                report.removed += 1;
            } else {
                self.store
                    .upsert_channel(channel.chat_id, &channel.title, false, true, None)
                    .await?;
                report.flipped_in_use += 1;
            }
        }

        if report.removed > 0 {
            info!(
                "standby refresh removed {} channel(s), kept {}",
                report.removed, report.kept
            );
        }
        Ok(report)
    }

    /// Verifies a bound channel is still usable: both the writer and the
    /// reader must see it, survive a fresh full-channel round-trip (local
    /// entity caches would happily certify a dead channel), and hold admin
    /// rights. A flood-wait of at most 15 s is absorbed once per call.
    pub async fn check_channel_access(&self, channel_chat_id: i64) -> Result<(), MirrorError> {
        for role in [SessionRole::Writer, SessionRole::Reader] {
            let session = match role {
                SessionRole::Writer => self.gateway.writer(),
                SessionRole::Reader => self.gateway.reader(),
            };
            let transport = session.transport();

            let check = retry_flood_wait_capped(
                || async move {
                    transport
                        .resolve(&crate::core::upstream::refs::ChatRef::Id(channel_chat_id))
                        .await?;
                    transport.get_full_channel(channel_chat_id).await?;
                    transport.get_permissions(channel_chat_id).await
                },
                ACCESS_CHECK_FLOOD_CAP,
            )
            .await;

            match check {
                Ok(permissions) if permissions.is_admin => {}
                Ok(_) => {
                    return Err(MirrorError::ChannelUnavailable(format!(
                        "{role} is not admin of channel {channel_chat_id}"
                    )));
                }
                Err(e) => {
                    return Err(MirrorError::ChannelUnavailable(format!(
                        "{role}: {}",
                        access_reason(&e)
                    )));
                }
            }
        }

        self.store
            .mark_channel_last_seen(channel_chat_id, None)
            .await?;
        Ok(())
    }

    /// Renames a channel to the topic title (bounded, with a fallback for
    /// untitled topics) and records the sighting.
    pub async fn rename_channel(
        &self,
        channel_chat_id: i64,
        new_title: &str,
    ) -> Result<(), MirrorError> {
        let title = effective_title(new_title);
        let writer = self.gateway.writer().transport();
        let new_title = title.as_str();
        retry_flood_wait(|| async move { writer.edit_channel_title(channel_chat_id, new_title).await })
            .await?;
        self.store
            .mark_channel_last_seen(channel_chat_id, Some(title))
            .await?;
        Ok(())
    }
}

fn effective_title(title: &str) -> String {
    let base = if title.trim().is_empty() {
        UNTITLED_TOPIC
    } else {
        title
    };
    base.chars().take(MAX_TITLE_LEN).collect()
}

fn is_loss_of_access(e: &UpstreamError) -> bool {
    matches!(
        e.kind,
        UpstreamErrorKind::NotParticipant
            | UpstreamErrorKind::AdminRequired
            | UpstreamErrorKind::ChannelPrivate
            | UpstreamErrorKind::ChannelInvalid
    )
}

/// User-legible reason for an access failure.
fn access_reason(e: &UpstreamError) -> String {
    match e.kind {
        UpstreamErrorKind::NotParticipant => "not in channel".to_string(),
        UpstreamErrorKind::AdminRequired => "not admin".to_string(),
        UpstreamErrorKind::ChannelPrivate => "inaccessible".to_string(),
        UpstreamErrorKind::ChannelInvalid => "ref invalid".to_string(),
        UpstreamErrorKind::Unauthorized => "actor not logged in".to_string(),
        _ => e.message.clone(),
    }
}
