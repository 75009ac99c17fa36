// src/core/store/groups.rs

//! Source groups and their forum topics.

use super::Store;
use crate::core::errors::MirrorError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SourceGroupRow {
    pub id: i64,
    pub chat_id: i64,
    pub title: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicRow {
    pub id: i64,
    pub source_group_id: i64,
    pub topic_id: i64,
    pub title: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One topic as delivered by a sync pass.
#[derive(Debug, Clone)]
pub struct TopicUpsert {
    pub topic_id: i64,
    pub title: String,
}

/// Counts reported back from a cascade delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub topics: u64,
    pub bindings: u64,
    pub banned: u64,
    pub jobs: u64,
    pub channels_released: u64,
}

fn source_group_from_row(row: &Row<'_>) -> rusqlite::Result<SourceGroupRow> {
    Ok(SourceGroupRow {
        id: row.get("id")?,
        chat_id: row.get("chat_id")?,
        title: row.get("title")?,
        enabled: row.get("enabled")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<TopicRow> {
    Ok(TopicRow {
        id: row.get("id")?,
        source_group_id: row.get("source_group_id")?,
        topic_id: row.get("topic_id")?,
        title: row.get("title")?,
        enabled: row.get("enabled")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_source_group(conn: &Connection, chat_id: i64) -> Result<Option<SourceGroupRow>, MirrorError> {
    Ok(conn
        .query_row(
            "SELECT * FROM source_groups WHERE chat_id=?1",
            params![chat_id],
            source_group_from_row,
        )
        .optional()?)
}

impl Store {
    pub async fn upsert_source_group(
        &self,
        chat_id: i64,
        title: &str,
    ) -> Result<SourceGroupRow, MirrorError> {
        let title = title.to_string();
        self.write(move |conn| {
            let now = Store::now();
            conn.execute(
                "INSERT INTO source_groups(chat_id, title, enabled, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     title=excluded.title,
                     updated_at=excluded.updated_at",
                params![chat_id, title, now],
            )?;
            get_source_group(conn, chat_id)?
                .ok_or_else(|| MirrorError::Store("source group upsert did not persist".into()))
        })
        .await
    }

    pub async fn get_source_group_by_chat_id(
        &self,
        chat_id: i64,
    ) -> Result<Option<SourceGroupRow>, MirrorError> {
        self.read(move |conn| get_source_group(conn, chat_id)).await
    }

    pub async fn get_source_group_by_id(
        &self,
        source_group_id: i64,
    ) -> Result<Option<SourceGroupRow>, MirrorError> {
        self.read(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM source_groups WHERE id=?1",
                    params![source_group_id],
                    source_group_from_row,
                )
                .optional()?)
        })
        .await
    }

    pub async fn list_source_groups(&self) -> Result<Vec<SourceGroupRow>, MirrorError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM source_groups ORDER BY id DESC")?;
            let rows = stmt
                .query_map([], source_group_from_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn set_source_group_enabled(
        &self,
        source_group_id: i64,
        enabled: bool,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE source_groups SET enabled=?1, updated_at=?2 WHERE id=?3",
                params![enabled, Store::now(), source_group_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Batch topic upsert: new topics arrive disabled, existing ones keep
    /// their flag and only refresh the title.
    pub async fn upsert_topics(
        &self,
        source_group_id: i64,
        topics: Vec<TopicUpsert>,
    ) -> Result<(), MirrorError> {
        if topics.is_empty() {
            return Ok(());
        }
        self.write(move |conn| {
            let now = Store::now();
            let tx = conn.transaction()?;
            for topic in &topics {
                tx.execute(
                    "INSERT INTO topics(source_group_id, topic_id, title, enabled, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 0, ?4, ?4)
                     ON CONFLICT(source_group_id, topic_id) DO UPDATE SET
                         title=excluded.title,
                         updated_at=excluded.updated_at",
                    params![source_group_id, topic.topic_id, topic.title, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn list_topics(
        &self,
        source_group_id: Option<i64>,
    ) -> Result<Vec<TopicRow>, MirrorError> {
        self.read(move |conn| {
            let rows = match source_group_id {
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM topics ORDER BY source_group_id ASC, topic_id ASC",
                    )?;
                    let rows = stmt.query_map([], topic_from_row)?.collect::<Result<_, _>>()?;
                    rows
                }
                Some(sg) => {
                    let mut stmt = conn
                        .prepare("SELECT * FROM topics WHERE source_group_id=?1 ORDER BY topic_id ASC")?;
                    let rows = stmt
                        .query_map(params![sg], topic_from_row)?
                        .collect::<Result<_, _>>()?;
                    rows
                }
            };
            Ok(rows)
        })
        .await
    }

    pub async fn get_topic(
        &self,
        source_group_id: i64,
        topic_id: i64,
    ) -> Result<Option<TopicRow>, MirrorError> {
        self.read(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM topics WHERE source_group_id=?1 AND topic_id=?2",
                    params![source_group_id, topic_id],
                    topic_from_row,
                )
                .optional()?)
        })
        .await
    }

    pub async fn set_topic_enabled(
        &self,
        source_group_id: i64,
        topic_id: i64,
        enabled: bool,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE topics SET enabled=?1, updated_at=?2 WHERE source_group_id=?3 AND topic_id=?4",
                params![enabled, Store::now(), source_group_id, topic_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Deletes a source group and everything hanging off it.
    ///
    /// Refused while the group still has a recovery job in `running` or
    /// `stopping`. Channels whose last active binding disappears with the
    /// group are released (`in_use=0`) but stay tracked while they have
    /// history.
    pub async fn delete_source_group(
        &self,
        source_group_id: i64,
    ) -> Result<DeleteReport, MirrorError> {
        self.write(move |conn| {
            let tx = conn.transaction()?;

            let busy: i64 = tx.query_row(
                "SELECT COUNT(*) FROM recovery_queue
                 WHERE source_group_id=?1 AND status IN ('running','stopping')",
                params![source_group_id],
                |row| row.get(0),
            )?;
            if busy > 0 {
                return Err(MirrorError::Precondition(format!(
                    "source group {source_group_id} has {busy} recovery job(s) still running"
                )));
            }

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM source_groups WHERE id=?1",
                    params![source_group_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(MirrorError::Precondition(format!(
                    "source group {source_group_id} does not exist"
                )));
            }

            let bound_channels: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT channel_chat_id FROM topic_bindings
                     WHERE source_group_id=?1 AND active=1",
                )?;
                let ids = stmt
                    .query_map(params![source_group_id], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;
                ids
            };

            let mut report = DeleteReport::default();
            report.jobs = tx.execute(
                "DELETE FROM recovery_queue WHERE source_group_id=?1",
                params![source_group_id],
            )? as u64;
            report.banned = tx.execute(
                "DELETE FROM banned_channels WHERE source_group_id=?1",
                params![source_group_id],
            )? as u64;
            report.bindings = tx.execute(
                "DELETE FROM topic_bindings WHERE source_group_id=?1",
                params![source_group_id],
            )? as u64;
            report.topics = tx.execute(
                "DELETE FROM topics WHERE source_group_id=?1",
                params![source_group_id],
            )? as u64;
            tx.execute(
                "DELETE FROM source_groups WHERE id=?1",
                params![source_group_id],
            )?;

            let now = Store::now();
            for chat_id in bound_channels {
                let remaining: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM topic_bindings WHERE channel_chat_id=?1 AND active=1",
                    params![chat_id],
                    |row| row.get(0),
                )?;
                if remaining == 0 {
                    let released = tx.execute(
                        "UPDATE channels SET in_use=0, updated_at=?1 WHERE chat_id=?2 AND in_use=1",
                        params![now, chat_id],
                    )?;
                    report.channels_released += released as u64;
                }
            }

            tx.commit()?;
            Ok(report)
        })
        .await
    }
}
