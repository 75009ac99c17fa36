// src/core/clone/album.rs

//! Media-group (album) collection and atomic cloning.

use super::{CloneEngine, is_cloneable};
use crate::core::errors::MirrorError;
use crate::core::upstream::message::UpstreamMessage;
use crate::core::upstream::session::retry_flood_wait;
use std::collections::BTreeMap;
use tracing::debug;

/// Half-width of the initial id window scanned around the reference message.
const INITIAL_SCAN_RADIUS: i64 = 80;
/// Upper bound on the number of ids scanned while widening.
const MAX_SCAN_MESSAGES: i64 = 1200;
/// A widening direction gives up after this many misses past the last member.
const MAX_CONSECUTIVE_MISSES: i64 = 200;
/// Ids fetched per round trip while scanning.
const SCAN_CHUNK: i64 = 100;

impl CloneEngine {
    /// Collects every member of the reference message's media group, sorted by
    /// id.
    ///
    /// The scan starts at ±80 ids around the reference and widens (bounded at
    /// ~1200 scanned ids) when only the reference is found. Siblings are *not*
    /// filtered by topic membership: some album parts lack the threading
    /// header and would be spuriously excluded.
    pub async fn collect_media_group(
        &self,
        source_chat_id: i64,
        reference: &UpstreamMessage,
    ) -> Result<Vec<UpstreamMessage>, MirrorError> {
        let Some(group_id) = reference.grouped_id else {
            return Ok(vec![reference.clone()]);
        };

        let mut members: BTreeMap<i64, UpstreamMessage> = BTreeMap::new();
        members.insert(reference.id, reference.clone());

        let low_start = (reference.id - INITIAL_SCAN_RADIUS).max(1);
        let high_start = reference.id + INITIAL_SCAN_RADIUS;
        let initial: Vec<i64> = (low_start..=high_start)
            .filter(|id| *id != reference.id)
            .collect();
        let mut scanned = initial.len() as i64;
        self.scan_ids(source_chat_id, group_id, &initial, &mut members)
            .await?;

        if members.len() <= 1 {
            // Nothing nearby; widen below and above until the group shows up
            // or the scan budget runs out.
            for direction in [-1_i64, 1] {
                let mut next = if direction < 0 { low_start - 1 } else { high_start + 1 };
                let mut misses = 0_i64;
                while misses < MAX_CONSECUTIVE_MISSES && scanned < MAX_SCAN_MESSAGES {
                    let chunk: Vec<i64> = (0..SCAN_CHUNK)
                        .map(|step| next + direction * step)
                        .filter(|id| *id >= 1)
                        .collect();
                    if chunk.is_empty() {
                        break;
                    }
                    scanned += chunk.len() as i64;
                    let before = members.len();
                    self.scan_ids(source_chat_id, group_id, &chunk, &mut members)
                        .await?;
                    if members.len() > before {
                        misses = 0;
                    } else {
                        misses += chunk.len() as i64;
                    }
                    next += direction * SCAN_CHUNK;
                }
            }
        }

        debug!(
            "media group {} resolved to {} member(s) after scanning ~{} ids",
            group_id,
            members.len(),
            scanned
        );
        Ok(members.into_values().collect())
    }

    async fn scan_ids(
        &self,
        source_chat_id: i64,
        group_id: i64,
        ids: &[i64],
        members: &mut BTreeMap<i64, UpstreamMessage>,
    ) -> Result<(), MirrorError> {
        let reader = self.gateway().reader().transport();
        for chunk in ids.chunks(SCAN_CHUNK as usize) {
            let fetched =
                retry_flood_wait(|| async move { reader.get_messages(source_chat_id, chunk).await })
                    .await
                    .map_err(MirrorError::from)?;
            for message in fetched.into_iter().flatten() {
                if message.grouped_id == Some(group_id) {
                    members.insert(message.id, message);
                }
            }
        }
        Ok(())
    }

    /// Clones a media group as one unit.
    ///
    /// A single forward of all ids is attempted first; on failure every id is
    /// retried individually (forward, then copy). The group counts as fully
    /// cloned iff every cloneable member succeeded.
    pub async fn clone_media_group(
        &self,
        target_channel: i64,
        group: &[UpstreamMessage],
    ) -> Result<bool, MirrorError> {
        let Some(first) = group.first() else {
            return Ok(true);
        };
        let ids: Vec<i64> = group.iter().map(|m| m.id).collect();

        let writer = self.gateway().writer().transport();
        let ids_slice = ids.as_slice();
        let forward_all = retry_flood_wait(|| async move {
            writer
                .forward_messages(first.chat_id, target_channel, ids_slice, true)
                .await
        })
        .await;
        if forward_all.is_ok() {
            return Ok(true);
        }

        let mut cloneable = 0_usize;
        let mut succeeded = 0_usize;
        for message in group {
            if !is_cloneable(message) {
                continue;
            }
            cloneable += 1;
            if self.clone_no_ref(message, target_channel).await? {
                succeeded += 1;
            }
        }
        Ok(succeeded == cloneable)
    }
}
