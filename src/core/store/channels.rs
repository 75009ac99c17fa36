// src/core/store/channels.rs

//! Target channels, the standby pool, and the banned-channel log.

use super::Store;
use crate::core::errors::MirrorError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelRow {
    pub id: i64,
    pub chat_id: i64,
    pub title: String,
    pub is_standby: bool,
    pub in_use: bool,
    pub consumed_at: Option<String>,
    pub admin_check_at: Option<String>,
    pub last_seen_at: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BannedChannelRow {
    pub id: i64,
    pub source_group_id: i64,
    pub topic_id: i64,
    pub channel_chat_id: i64,
    pub reason: Option<String>,
    pub detected_at: String,
    pub source_title: Option<String>,
    pub topic_title: Option<String>,
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get("id")?,
        chat_id: row.get("chat_id")?,
        title: row.get("title")?,
        is_standby: row.get("is_standby")?,
        in_use: row.get("in_use")?,
        consumed_at: row.get("consumed_at")?,
        admin_check_at: row.get("admin_check_at")?,
        last_seen_at: row.get("last_seen_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_channel_row(conn: &Connection, chat_id: i64) -> Result<Option<ChannelRow>, MirrorError> {
    Ok(conn
        .query_row(
            "SELECT * FROM channels WHERE chat_id=?1",
            params![chat_id],
            channel_from_row,
        )
        .optional()?)
}

impl Store {
    /// Upserts a channel row. A `None` admin check timestamp never clobbers a
    /// previously recorded one.
    pub async fn upsert_channel(
        &self,
        chat_id: i64,
        title: &str,
        is_standby: bool,
        in_use: bool,
        admin_check_at: Option<String>,
    ) -> Result<ChannelRow, MirrorError> {
        let title = title.to_string();
        self.write(move |conn| {
            let now = Store::now();
            conn.execute(
                "INSERT INTO channels(
                     chat_id, title, is_standby, in_use, consumed_at,
                     admin_check_at, last_seen_at, created_at, updated_at
                 )
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?6, ?6)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     title=excluded.title,
                     is_standby=excluded.is_standby,
                     in_use=excluded.in_use,
                     admin_check_at=COALESCE(excluded.admin_check_at, channels.admin_check_at),
                     last_seen_at=excluded.last_seen_at,
                     updated_at=excluded.updated_at",
                params![chat_id, title, is_standby, in_use, admin_check_at, now],
            )?;
            get_channel_row(conn, chat_id)?
                .ok_or_else(|| MirrorError::Store("channel upsert did not persist".into()))
        })
        .await
    }

    pub async fn get_channel(&self, chat_id: i64) -> Result<Option<ChannelRow>, MirrorError> {
        self.read(move |conn| get_channel_row(conn, chat_id)).await
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelRow>, MirrorError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM channels ORDER BY id DESC")?;
            let rows = stmt.query_map([], channel_from_row)?.collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Standby channels in FIFO (insertion) order.
    pub async fn list_standby_channels(&self) -> Result<Vec<ChannelRow>, MirrorError> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM channels WHERE is_standby=1 AND in_use=0 ORDER BY id ASC")?;
            let rows = stmt.query_map([], channel_from_row)?.collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn get_next_available_standby(&self) -> Result<Option<ChannelRow>, MirrorError> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM channels WHERE is_standby=1 AND in_use=0 ORDER BY id ASC LIMIT 1",
                    [],
                    channel_from_row,
                )
                .optional()?)
        })
        .await
    }

    /// Flips a known channel to consumed (`is_standby=0, in_use=1`).
    pub async fn consume_standby_channel(&self, chat_id: i64) -> Result<(), MirrorError> {
        self.write(move |conn| {
            let now = Store::now();
            conn.execute(
                "UPDATE channels SET is_standby=0, in_use=1, consumed_at=?1, updated_at=?1 WHERE chat_id=?2",
                params![now, chat_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Atomically claims the oldest standby channel: select and flip happen in
    /// one transaction inside the write critical section, so two concurrent
    /// recoveries can never claim the same channel.
    pub async fn consume_next_standby(&self) -> Result<Option<ChannelRow>, MirrorError> {
        self.write(|conn| {
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    "SELECT * FROM channels WHERE is_standby=1 AND in_use=0 ORDER BY id ASC LIMIT 1",
                    [],
                    channel_from_row,
                )
                .optional()?;
            let Some(mut channel) = row else {
                return Ok(None);
            };

            let now = Store::now();
            tx.execute(
                "UPDATE channels SET is_standby=0, in_use=1, consumed_at=?1, updated_at=?1 WHERE chat_id=?2",
                params![now, channel.chat_id],
            )?;
            tx.commit()?;

            channel.is_standby = false;
            channel.in_use = true;
            channel.consumed_at = Some(now.clone());
            channel.updated_at = now;
            Ok(Some(channel))
        })
        .await
    }

    /// Removes every channel that is not bound: available standbys and
    /// tracked-but-unavailable rows alike. Returns the number removed.
    pub async fn clear_unused_channels(&self) -> Result<u64, MirrorError> {
        self.write(|conn| {
            let removed = conn.execute("DELETE FROM channels WHERE in_use=0", [])?;
            Ok(removed as u64)
        })
        .await
    }

    pub async fn delete_channel(&self, chat_id: i64) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute("DELETE FROM channels WHERE chat_id=?1", params![chat_id])?;
            Ok(())
        })
        .await
    }

    pub async fn mark_channel_last_seen(
        &self,
        chat_id: i64,
        title: Option<String>,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            let now = Store::now();
            match title {
                Some(title) => {
                    conn.execute(
                        "UPDATE channels SET title=?1, last_seen_at=?2, updated_at=?2 WHERE chat_id=?3",
                        params![title, now, chat_id],
                    )?;
                }
                None => {
                    conn.execute(
                        "UPDATE channels SET last_seen_at=?1, updated_at=?1 WHERE chat_id=?2",
                        params![now, chat_id],
                    )?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Records a ban for `(source, topic, channel)`. The latest row for the
    /// triple wins; older duplicates are collapsed.
    pub async fn add_banned_channel(
        &self,
        source_group_id: i64,
        topic_id: i64,
        channel_chat_id: i64,
        reason: &str,
    ) -> Result<(), MirrorError> {
        let reason = reason.to_string();
        self.write(move |conn| {
            let tx = conn.transaction()?;
            let now = Store::now();

            let latest: Option<i64> = tx
                .query_row(
                    "SELECT id FROM banned_channels
                     WHERE source_group_id=?1 AND topic_id=?2 AND channel_chat_id=?3
                     ORDER BY id DESC LIMIT 1",
                    params![source_group_id, topic_id, channel_chat_id],
                    |row| row.get(0),
                )
                .optional()?;

            match latest {
                Some(keep_id) => {
                    tx.execute(
                        "UPDATE banned_channels SET reason=?1, detected_at=?2 WHERE id=?3",
                        params![reason, now, keep_id],
                    )?;
                    tx.execute(
                        "DELETE FROM banned_channels
                         WHERE source_group_id=?1 AND topic_id=?2 AND channel_chat_id=?3 AND id<>?4",
                        params![source_group_id, topic_id, channel_chat_id, keep_id],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO banned_channels(source_group_id, topic_id, channel_chat_id, reason, detected_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![source_group_id, topic_id, channel_chat_id, reason, now],
                    )?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn list_banned_channels(&self) -> Result<Vec<BannedChannelRow>, MirrorError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.*, s.title AS source_title, t.title AS topic_title
                 FROM banned_channels b
                 LEFT JOIN source_groups s ON s.id=b.source_group_id
                 LEFT JOIN topics t ON t.source_group_id=b.source_group_id AND t.topic_id=b.topic_id
                 ORDER BY b.id DESC
                 LIMIT 300",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(BannedChannelRow {
                        id: row.get("id")?,
                        source_group_id: row.get("source_group_id")?,
                        topic_id: row.get("topic_id")?,
                        channel_chat_id: row.get("channel_chat_id")?,
                        reason: row.get("reason")?,
                        detected_at: row.get("detected_at")?,
                        source_title: row.get("source_title")?,
                        topic_title: row.get("topic_title")?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn remove_banned_channel(
        &self,
        source_group_id: i64,
        topic_id: i64,
        channel_chat_id: i64,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "DELETE FROM banned_channels
                 WHERE source_group_id=?1 AND topic_id=?2 AND channel_chat_id=?3",
                params![source_group_id, topic_id, channel_chat_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn clear_banned_channels(&self) -> Result<u64, MirrorError> {
        self.write(|conn| {
            let removed = conn.execute("DELETE FROM banned_channels", [])?;
            Ok(removed as u64)
        })
        .await
    }
}
