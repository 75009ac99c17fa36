// src/server/panel_auth.rs

//! Panel session tokens: HMAC-SHA256 over an expiry timestamp, keyed by the
//! configured panel password. Token shape: `"<expiry-seconds>.<hex-hmac>"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "panel_session";

pub struct PanelAuth {
    key: Vec<u8>,
    /// HMAC tag of the password itself, for constant-time password checks.
    password_tag: Vec<u8>,
    ttl_seconds: u64,
}

fn mac_with_key(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

impl PanelAuth {
    pub fn new(password: &str, ttl_seconds: u64) -> Self {
        let key = password.as_bytes().to_vec();
        let mut mac = mac_with_key(&key);
        mac.update(password.as_bytes());
        let password_tag = mac.finalize().into_bytes().to_vec();
        Self {
            key,
            password_tag,
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn now_ts() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Constant-time password comparison (both sides pass through the MAC).
    pub fn verify_password(&self, candidate: &str) -> bool {
        let mut mac = mac_with_key(&self.key);
        mac.update(candidate.as_bytes());
        mac.verify_slice(&self.password_tag).is_ok()
    }

    /// Builds a session token expiring `ttl_seconds` after `now_ts`.
    pub fn build_session_token(&self, now_ts: u64) -> String {
        let expiry = now_ts + self.ttl_seconds;
        let expiry_raw = expiry.to_string();
        let mut mac = mac_with_key(&self.key);
        mac.update(expiry_raw.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{expiry_raw}.{signature}")
    }

    pub fn verify_session_token(&self, token: &str, now_ts: u64) -> bool {
        let Some((expiry_raw, signature_hex)) = token.split_once('.') else {
            return false;
        };
        if expiry_raw.is_empty()
            || signature_hex.is_empty()
            || !expiry_raw.chars().all(|c| c.is_ascii_digit())
        {
            return false;
        }
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };

        let mut mac = mac_with_key(&self.key);
        mac.update(expiry_raw.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return false;
        }

        expiry_raw.parse::<u64>().map(|exp| exp >= now_ts).unwrap_or(false)
    }

    /// `Set-Cookie` value installing the session.
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.ttl_seconds
        )
    }

    /// `Set-Cookie` value clearing the session.
    pub fn clear_cookie(&self) -> String {
        format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
    }
}

/// Extracts the session token from a raw `Cookie` header value.
pub fn session_token_from_cookies(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}
