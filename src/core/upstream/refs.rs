// src/core/upstream/refs.rs

//! Chat reference normalization.
//!
//! Operators paste chat references in several shapes: raw ids, `@usernames`,
//! bare usernames, `t.me` links, and `t.me/c/<internal>/<msg>` message links.
//! Normalization folds all of them into either a numeric peer id or a
//! `@username`, which is what the provider resolvers accept.

use crate::core::errors::MirrorError;
use std::fmt;

/// A normalized chat reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    /// Always carries the leading `@`.
    Username(String),
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{id}"),
            ChatRef::Username(name) => write!(f, "{name}"),
        }
    }
}

impl From<i64> for ChatRef {
    fn from(id: i64) -> Self {
        ChatRef::Id(id)
    }
}

/// Case-insensitive ASCII substring search returning a byte offset that is
/// always a char boundary of `haystack` (the needle is pure ASCII).
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Normalizes a textual chat reference.
///
/// Rules:
/// - numeric input (optionally negative) passes through as an id;
/// - `t.me/c/<internal>/...` becomes `-100` concatenated with the internal id;
/// - `t.me/<username>[/...]` becomes `@username`;
/// - any other text gets `@` prepended when missing;
/// - empty input is rejected.
pub fn normalize_ref(input: &str) -> Result<ChatRef, MirrorError> {
    let mut text = input.trim().to_string();
    if text.is_empty() {
        return Err(MirrorError::InvalidInput(
            "chat reference cannot be empty".to_string(),
        ));
    }

    if let Some(pos) = find_ascii_ci(&text, "t.me/") {
        text = text[pos + "t.me/".len()..].trim_matches('/').to_string();

        if let Some(rest) = text.strip_prefix("c/") {
            let internal = rest.split('/').next().unwrap_or_default();
            if internal.is_empty() || !internal.chars().all(|c| c.is_ascii_digit()) {
                return Err(MirrorError::InvalidInput(format!(
                    "invalid internal channel id in reference: {input}"
                )));
            }
            let chat_id: i64 = format!("-100{internal}").parse().map_err(|_| {
                MirrorError::InvalidInput(format!("channel id out of range: {input}"))
            })?;
            return Ok(ChatRef::Id(chat_id));
        }

        if let Some((first, _)) = text.split_once('/') {
            text = first.to_string();
        }
        if text.is_empty() {
            return Err(MirrorError::InvalidInput(format!(
                "no username in link: {input}"
            )));
        }
    }

    let digits = text.strip_prefix('-').unwrap_or(&text);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .map(ChatRef::Id)
            .map_err(|_| MirrorError::InvalidInput(format!("chat id out of range: {input}")));
    }

    if text.starts_with('@') {
        Ok(ChatRef::Username(text))
    } else {
        Ok(ChatRef::Username(format!("@{text}")))
    }
}
