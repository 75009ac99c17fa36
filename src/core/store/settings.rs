// src/core/store/settings.rs

//! Key/value settings, used for cross-restart cursors.

use super::Store;
use crate::core::errors::MirrorError;
use rusqlite::{OptionalExtension, params};

impl Store {
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        let key = key.to_string();
        let value = value.to_string();
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO settings(key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value=excluded.value,
                     updated_at=excluded.updated_at",
                params![key, value, Store::now()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let key = key.to_string();
        self.read(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM settings WHERE key=?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }
}
