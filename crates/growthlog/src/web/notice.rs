//! One-shot notices shown on the next page render.
//!
//! A notice travels in a signed cookie: set by the submission handler,
//! read and removed by the index handler.

use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cookie carrying the pending notice.
pub const NOTICE_COOKIE: &str = "growthlog_notice";

/// BLAKE3 key-derivation context for the cookie signing key.
const KEY_CONTEXT: &str = "growthlog 2024-03-01 notice cookie signing key";

/// Kind of notice, used for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// The submission was recorded.
    Success,
    /// The submission was rejected.
    Error,
}

/// A message for the user, shown once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Kind of notice.
    pub level: NoticeLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notice {
    /// A success notice.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// An error notice.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Derive the cookie signing key from the configured secret.
///
/// The signing key needs 64 bytes; the secret can be any length.
#[must_use]
pub fn signing_key(secret: &str) -> Key {
    let mut material = [0u8; 64];
    let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
    hasher.update(secret.as_bytes());
    hasher.finalize_xof().fill(&mut material);
    Key::from(&material)
}

/// Queue a notice for the next page render.
#[must_use]
pub fn push(jar: SignedCookieJar, notice: &Notice) -> SignedCookieJar {
    let value = match serde_json::to_string(notice) {
        Ok(value) => value,
        Err(e) => {
            warn!("Dropping notice that failed to serialize: {}", e);
            return jar;
        }
    };
    jar.add(
        Cookie::build((NOTICE_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Take the pending notice, if any, removing it from the jar.
///
/// A cookie that fails signature verification never reaches this point; one
/// that verifies but does not decode is discarded.
#[must_use]
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Option<Notice>) {
    let Some(cookie) = jar.get(NOTICE_COOKIE) else {
        return (jar, None);
    };
    let notice = match serde_json::from_str(cookie.value()) {
        Ok(notice) => Some(notice),
        Err(e) => {
            warn!("Discarding undecodable notice cookie: {}", e);
            None
        }
    };
    (jar.remove(Cookie::build(NOTICE_COOKIE).path("/")), notice)
}
