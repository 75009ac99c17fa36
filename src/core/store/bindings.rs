// src/core/store/bindings.rs

//! Durable links from `(source group, topic)` to a target channel.

use super::Store;
use crate::core::errors::MirrorError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BindingRow {
    pub id: i64,
    pub source_group_id: i64,
    pub topic_id: i64,
    pub channel_chat_id: i64,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub source_title: Option<String>,
    pub topic_title: Option<String>,
}

/// An active binding joined with everything the monitor needs to decide
/// whether (and how loudly) to scan it.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveBindingRow {
    pub id: i64,
    pub source_group_id: i64,
    pub topic_id: i64,
    pub channel_chat_id: i64,
    pub source_chat_id: i64,
    pub source_enabled: bool,
    pub topic_enabled: bool,
    pub source_title: Option<String>,
    pub topic_title: Option<String>,
    pub channel_title: Option<String>,
}

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<BindingRow> {
    Ok(BindingRow {
        id: row.get("id")?,
        source_group_id: row.get("source_group_id")?,
        topic_id: row.get("topic_id")?,
        channel_chat_id: row.get("channel_chat_id")?,
        active: row.get("active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        source_title: None,
        topic_title: None,
    })
}

fn get_binding_row(
    conn: &Connection,
    source_group_id: i64,
    topic_id: i64,
) -> Result<Option<BindingRow>, MirrorError> {
    Ok(conn
        .query_row(
            "SELECT * FROM topic_bindings WHERE source_group_id=?1 AND topic_id=?2",
            params![source_group_id, topic_id],
            binding_from_row,
        )
        .optional()?)
}

impl Store {
    /// Upserts the binding and, in the same transaction, flips the target
    /// channel to `in_use=1, is_standby=0`.
    pub async fn upsert_binding(
        &self,
        source_group_id: i64,
        topic_id: i64,
        channel_chat_id: i64,
    ) -> Result<BindingRow, MirrorError> {
        self.write(move |conn| {
            let now = Store::now();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO topic_bindings(source_group_id, topic_id, channel_chat_id, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4)
                 ON CONFLICT(source_group_id, topic_id) DO UPDATE SET
                     channel_chat_id=excluded.channel_chat_id,
                     active=1,
                     updated_at=excluded.updated_at",
                params![source_group_id, topic_id, channel_chat_id, now],
            )?;
            tx.execute(
                "UPDATE channels SET in_use=1, is_standby=0, updated_at=?1 WHERE chat_id=?2",
                params![now, channel_chat_id],
            )?;
            tx.commit()?;

            get_binding_row(conn, source_group_id, topic_id)?
                .ok_or_else(|| MirrorError::Store("binding upsert did not persist".into()))
        })
        .await
    }

    pub async fn get_binding(
        &self,
        source_group_id: i64,
        topic_id: i64,
    ) -> Result<Option<BindingRow>, MirrorError> {
        self.read(move |conn| get_binding_row(conn, source_group_id, topic_id))
            .await
    }

    pub async fn list_bindings(
        &self,
        source_group_id: Option<i64>,
    ) -> Result<Vec<BindingRow>, MirrorError> {
        self.read(move |conn| {
            const BASE: &str = "SELECT b.*, t.title AS topic_title, s.title AS source_title
                 FROM topic_bindings b
                 LEFT JOIN topics t ON t.source_group_id=b.source_group_id AND t.topic_id=b.topic_id
                 LEFT JOIN source_groups s ON s.id=b.source_group_id";
            let map = |row: &Row<'_>| -> rusqlite::Result<BindingRow> {
                let mut binding = binding_from_row(row)?;
                binding.source_title = row.get("source_title")?;
                binding.topic_title = row.get("topic_title")?;
                Ok(binding)
            };
            let rows = match source_group_id {
                None => {
                    let mut stmt = conn.prepare(&format!("{BASE} ORDER BY b.id DESC"))?;
                    let rows = stmt.query_map([], map)?.collect::<Result<_, _>>()?;
                    rows
                }
                Some(sg) => {
                    let mut stmt = conn
                        .prepare(&format!("{BASE} WHERE b.source_group_id=?1 ORDER BY b.id DESC"))?;
                    let rows = stmt.query_map(params![sg], map)?.collect::<Result<_, _>>()?;
                    rows
                }
            };
            Ok(rows)
        })
        .await
    }

    /// Active bindings with the enabled flags the periodic scan filters on.
    pub async fn list_active_bindings(&self) -> Result<Vec<ActiveBindingRow>, MirrorError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.id, b.source_group_id, b.topic_id, b.channel_chat_id,
                        s.chat_id AS source_chat_id, s.enabled AS source_enabled,
                        t.enabled AS topic_enabled, t.title AS topic_title,
                        s.title AS source_title, c.title AS channel_title
                 FROM topic_bindings b
                 JOIN topics t ON t.source_group_id=b.source_group_id AND t.topic_id=b.topic_id
                 JOIN source_groups s ON s.id=b.source_group_id
                 LEFT JOIN channels c ON c.chat_id=b.channel_chat_id
                 WHERE b.active=1",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ActiveBindingRow {
                        id: row.get("id")?,
                        source_group_id: row.get("source_group_id")?,
                        topic_id: row.get("topic_id")?,
                        channel_chat_id: row.get("channel_chat_id")?,
                        source_chat_id: row.get("source_chat_id")?,
                        source_enabled: row.get("source_enabled")?,
                        topic_enabled: row.get("topic_enabled")?,
                        source_title: row.get("source_title")?,
                        topic_title: row.get("topic_title")?,
                        channel_title: row.get("channel_title")?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn set_binding_active(
        &self,
        source_group_id: i64,
        topic_id: i64,
        active: bool,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE topic_bindings SET active=?1, updated_at=?2 WHERE source_group_id=?3 AND topic_id=?4",
                params![active, Store::now(), source_group_id, topic_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Deactivates every binding pointing at a channel.
    pub async fn detach_channel_bindings(&self, channel_chat_id: i64) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE topic_bindings SET active=0, updated_at=?1 WHERE channel_chat_id=?2",
                params![Store::now(), channel_chat_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Active bindings targeting a channel.
    pub async fn get_bindings_by_channel(
        &self,
        channel_chat_id: i64,
    ) -> Result<Vec<BindingRow>, MirrorError> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM topic_bindings WHERE channel_chat_id=?1 AND active=1")?;
            let rows = stmt
                .query_map(params![channel_chat_id], binding_from_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }
}
