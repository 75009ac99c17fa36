// src/core/store/queue.rs

//! The durable recovery queue.
//!
//! Job status is a six-state machine:
//! `pending → running → {done | failed | stopping} → stopped`, with
//! `pending ↔ running` cycling on retry. The worker is the only mutator out
//! of `running`; every other transition is an explicit operator command.

use super::Store;
use crate::core::errors::MirrorError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Errors recorded on a job are truncated to keep rows bounded.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Stopped | JobStatus::Done | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryJobRow {
    pub id: i64,
    pub source_group_id: i64,
    pub topic_id: i64,
    pub old_channel_chat_id: i64,
    pub new_channel_chat_id: Option<i64>,
    pub reason: Option<String>,
    pub status: JobStatus,
    pub retry_count: u32,
    pub last_cloned_message_id: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub source_title: Option<String>,
    pub topic_title: Option<String>,
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<RecoveryJobRow> {
    let status_text: String = row.get("status")?;
    let status = JobStatus::from_str(&status_text).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown job status '{status_text}'").into(),
        )
    })?;
    Ok(RecoveryJobRow {
        id: row.get("id")?,
        source_group_id: row.get("source_group_id")?,
        topic_id: row.get("topic_id")?,
        old_channel_chat_id: row.get("old_channel_chat_id")?,
        new_channel_chat_id: row.get("new_channel_chat_id")?,
        reason: row.get("reason")?,
        status,
        retry_count: row.get("retry_count")?,
        last_cloned_message_id: row.get("last_cloned_message_id")?,
        last_error: row.get("last_error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        source_title: None,
        topic_title: None,
    })
}

fn get_job(conn: &Connection, job_id: i64) -> Result<Option<RecoveryJobRow>, MirrorError> {
    Ok(conn
        .query_row(
            "SELECT * FROM recovery_queue WHERE id=?1",
            params![job_id],
            job_from_row,
        )
        .optional()?)
}

fn find_open_job(
    conn: &Connection,
    source_group_id: i64,
    topic_id: i64,
    statuses: &[JobStatus],
) -> Result<Option<i64>, MirrorError> {
    let list = statuses
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(",");
    Ok(conn
        .query_row(
            &format!(
                "SELECT id FROM recovery_queue
                 WHERE source_group_id=?1 AND topic_id=?2 AND status IN ({list})
                 ORDER BY id DESC LIMIT 1"
            ),
            params![source_group_id, topic_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn truncate_error(text: &str) -> String {
    text.chars().take(MAX_ERROR_LEN).collect()
}

impl Store {
    /// Enqueues a recovery for `(source, topic)`. Idempotent: an existing
    /// `pending` or `running` job for the pair is returned unchanged.
    pub async fn enqueue_recovery(
        &self,
        source_group_id: i64,
        topic_id: i64,
        old_channel_chat_id: i64,
        reason: &str,
    ) -> Result<i64, MirrorError> {
        let reason = reason.to_string();
        self.write(move |conn| {
            if let Some(existing) = find_open_job(
                conn,
                source_group_id,
                topic_id,
                &[JobStatus::Pending, JobStatus::Running],
            )? {
                return Ok(existing);
            }

            let now = Store::now();
            conn.execute(
                "INSERT INTO recovery_queue(
                     source_group_id, topic_id, old_channel_chat_id, reason,
                     status, retry_count, last_cloned_message_id, created_at, updated_at
                 )
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, 0, ?5, ?5)",
                params![source_group_id, topic_id, old_channel_chat_id, reason, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Manual enqueue with a pre-assigned target channel. Idempotent against
    /// `pending`, `running`, *and* `stopping` jobs; the existing job id is
    /// returned untouched (second field `true`) so the caller can surface the
    /// refusal instead of guessing.
    pub async fn enqueue_manual_recovery(
        &self,
        source_group_id: i64,
        topic_id: i64,
        old_channel_chat_id: i64,
        new_channel_chat_id: i64,
        reason: &str,
    ) -> Result<(i64, bool), MirrorError> {
        let reason = reason.to_string();
        self.write(move |conn| {
            if let Some(existing) = find_open_job(
                conn,
                source_group_id,
                topic_id,
                &[JobStatus::Pending, JobStatus::Running, JobStatus::Stopping],
            )? {
                return Ok((existing, true));
            }

            let now = Store::now();
            conn.execute(
                "INSERT INTO recovery_queue(
                     source_group_id, topic_id, old_channel_chat_id, new_channel_chat_id, reason,
                     status, retry_count, last_cloned_message_id, created_at, updated_at
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, 0, ?6, ?6)",
                params![
                    source_group_id,
                    topic_id,
                    old_channel_chat_id,
                    new_channel_chat_id,
                    reason,
                    now
                ],
            )?;
            Ok((conn.last_insert_rowid(), false))
        })
        .await
    }

    /// Atomically claims the oldest pending job, transitioning it to
    /// `running`.
    pub async fn claim_next_recovery(&self) -> Result<Option<RecoveryJobRow>, MirrorError> {
        self.write(|conn| {
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    "SELECT * FROM recovery_queue WHERE status='pending' ORDER BY id ASC LIMIT 1",
                    [],
                    job_from_row,
                )
                .optional()?;
            let Some(mut job) = row else {
                return Ok(None);
            };

            let now = Store::now();
            tx.execute(
                "UPDATE recovery_queue SET status='running', updated_at=?1 WHERE id=?2",
                params![now, job.id],
            )?;
            tx.commit()?;

            job.status = JobStatus::Running;
            job.updated_at = now;
            Ok(Some(job))
        })
        .await
    }

    /// Claims one specific job. Refuses jobs that are `done` or already
    /// `running`; any other state transitions to `running`.
    pub async fn claim_recovery_by_id(
        &self,
        job_id: i64,
    ) -> Result<RecoveryJobRow, MirrorError> {
        self.write(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut job) = tx
                .query_row(
                    "SELECT * FROM recovery_queue WHERE id=?1",
                    params![job_id],
                    job_from_row,
                )
                .optional()?
            else {
                return Err(MirrorError::Precondition(format!("job {job_id} does not exist")));
            };

            match job.status {
                JobStatus::Done => {
                    return Err(MirrorError::Precondition(format!(
                        "job {job_id} is already done"
                    )));
                }
                JobStatus::Running => {
                    return Err(MirrorError::Precondition(format!(
                        "job {job_id} is already running"
                    )));
                }
                _ => {}
            }

            let now = Store::now();
            tx.execute(
                "UPDATE recovery_queue SET status='running', updated_at=?1 WHERE id=?2",
                params![now, job_id],
            )?;
            tx.commit()?;

            job.status = JobStatus::Running;
            job.updated_at = now;
            Ok(job)
        })
        .await
    }

    /// Puts a job back to `pending`. Forbidden on `done` jobs. With
    /// `restart`, the retry counter and the checkpoint are zeroed.
    pub async fn requeue_recovery(&self, job_id: i64, restart: bool) -> Result<(), MirrorError> {
        self.write(move |conn| {
            let Some(job) = get_job(conn, job_id)? else {
                return Err(MirrorError::Precondition(format!("job {job_id} does not exist")));
            };
            if job.status == JobStatus::Done {
                return Err(MirrorError::Precondition(format!(
                    "job {job_id} is done and cannot be requeued"
                )));
            }

            let now = Store::now();
            if restart {
                conn.execute(
                    "UPDATE recovery_queue
                     SET status='pending', retry_count=0, last_cloned_message_id=0, last_error=NULL, updated_at=?1
                     WHERE id=?2",
                    params![now, job_id],
                )?;
            } else {
                conn.execute(
                    "UPDATE recovery_queue SET status='pending', updated_at=?1 WHERE id=?2",
                    params![now, job_id],
                )?;
            }
            Ok(())
        })
        .await
    }

    /// Requests a stop: `pending` jobs stop immediately, `running` jobs are
    /// asked to stop cooperatively, `stopping` is a no-op, terminal states are
    /// rejected. Returns the resulting status.
    pub async fn stop_recovery(&self, job_id: i64) -> Result<JobStatus, MirrorError> {
        self.write(move |conn| {
            let Some(job) = get_job(conn, job_id)? else {
                return Err(MirrorError::Precondition(format!("job {job_id} does not exist")));
            };

            let now = Store::now();
            match job.status {
                JobStatus::Pending => {
                    conn.execute(
                        "UPDATE recovery_queue SET status='stopped', updated_at=?1 WHERE id=?2",
                        params![now, job_id],
                    )?;
                    Ok(JobStatus::Stopped)
                }
                JobStatus::Running => {
                    conn.execute(
                        "UPDATE recovery_queue SET status='stopping', updated_at=?1 WHERE id=?2",
                        params![now, job_id],
                    )?;
                    Ok(JobStatus::Stopping)
                }
                JobStatus::Stopping => Ok(JobStatus::Stopping),
                status => Err(MirrorError::Precondition(format!(
                    "job {job_id} is {status} and cannot be stopped"
                ))),
            }
        })
        .await
    }

    pub async fn mark_recovery_assigned_channel(
        &self,
        job_id: i64,
        new_channel_chat_id: i64,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE recovery_queue SET new_channel_chat_id=?1, updated_at=?2 WHERE id=?3",
                params![new_channel_chat_id, Store::now(), job_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn update_recovery_progress(
        &self,
        job_id: i64,
        last_cloned_message_id: i64,
    ) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute(
                "UPDATE recovery_queue SET last_cloned_message_id=?1, updated_at=?2 WHERE id=?3",
                params![last_cloned_message_id, Store::now(), job_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn mark_recovery_done(
        &self,
        job_id: i64,
        new_channel_chat_id: i64,
        summary: &str,
        last_cloned_message_id: Option<i64>,
    ) -> Result<(), MirrorError> {
        let summary = summary.to_string();
        self.write(move |conn| {
            conn.execute(
                "UPDATE recovery_queue
                 SET status='done',
                     new_channel_chat_id=?1,
                     last_error=?2,
                     last_cloned_message_id=COALESCE(?3, last_cloned_message_id),
                     updated_at=?4
                 WHERE id=?5",
                params![
                    new_channel_chat_id,
                    summary,
                    last_cloned_message_id,
                    Store::now(),
                    job_id
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Marks a cooperative stop. The checkpoint is preserved so a later
    /// `continue` resumes where the job left off.
    pub async fn mark_recovery_stopped(
        &self,
        job_id: i64,
        summary: &str,
    ) -> Result<(), MirrorError> {
        let summary = summary.to_string();
        self.write(move |conn| {
            conn.execute(
                "UPDATE recovery_queue SET status='stopped', last_error=?1, updated_at=?2 WHERE id=?3",
                params![summary, Store::now(), job_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Records a failure: back to `pending` with an incremented retry counter
    /// while `retry_count + 1 < max_retry`, otherwise parked as `failed`.
    pub async fn mark_recovery_failed(
        &self,
        job_id: i64,
        retry_count: u32,
        error_text: &str,
        max_retry: u32,
    ) -> Result<(), MirrorError> {
        let error_text = truncate_error(error_text);
        self.write(move |conn| {
            let now = Store::now();
            let status = if retry_count + 1 < max_retry {
                "pending"
            } else {
                "failed"
            };
            conn.execute(
                "UPDATE recovery_queue SET status=?1, retry_count=?2, last_error=?3, updated_at=?4 WHERE id=?5",
                params![status, retry_count + 1, error_text, now, job_id],
            )?;
            Ok(())
        })
        .await
    }

    /// True when the job has been asked to stop (or no longer exists).
    pub async fn is_stop_requested(&self, job_id: i64) -> Result<bool, MirrorError> {
        self.read(move |conn| {
            let Some(job) = get_job(conn, job_id)? else {
                return Ok(true);
            };
            Ok(matches!(job.status, JobStatus::Stopping | JobStatus::Stopped))
        })
        .await
    }

    /// Startup crash sweep: every `running` job goes back to `pending`,
    /// keeping its checkpoint. Returns the number of jobs reset.
    pub async fn reset_running_recoveries(&self) -> Result<u64, MirrorError> {
        self.write(|conn| {
            let reset = conn.execute(
                "UPDATE recovery_queue SET status='pending', updated_at=?1 WHERE status='running'",
                params![Store::now()],
            )?;
            Ok(reset as u64)
        })
        .await
    }

    pub async fn get_recovery_job(
        &self,
        job_id: i64,
    ) -> Result<Option<RecoveryJobRow>, MirrorError> {
        self.read(move |conn| get_job(conn, job_id)).await
    }

    pub async fn list_recovery_queue(&self) -> Result<Vec<RecoveryJobRow>, MirrorError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT q.*, s.title AS source_title, t.title AS topic_title
                 FROM recovery_queue q
                 LEFT JOIN source_groups s ON s.id=q.source_group_id
                 LEFT JOIN topics t ON t.source_group_id=q.source_group_id AND t.topic_id=q.topic_id
                 ORDER BY q.id DESC
                 LIMIT 500",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let mut job = job_from_row(row)?;
                    job.source_title = row.get("source_title")?;
                    job.topic_title = row.get("topic_title")?;
                    Ok(job)
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Removes a finished job row.
    pub async fn delete_recovery_job(&self, job_id: i64) -> Result<(), MirrorError> {
        self.write(move |conn| {
            conn.execute("DELETE FROM recovery_queue WHERE id=?1", params![job_id])?;
            Ok(())
        })
        .await
    }
}
