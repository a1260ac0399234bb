//! Telegram Mini App `initData` verification for the filter API.
//!
//! The web app forwards the signed init data it received from Telegram in the
//! [`INIT_DATA_HEADER`] header. The signature is an HMAC-SHA256 over the sorted
//! `key=value` lines, keyed with `HMAC-SHA256("WebAppData", bot_token)`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use super::domain::UserId;

type HmacSha256 = Hmac<Sha256>;

pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

/// Init data older than this is rejected unless configured otherwise.
pub const DEFAULT_INIT_DATA_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("init data is missing")]
    Missing,
    #[error("init data carries no hash")]
    MissingHash,
    #[error("init data signature does not match")]
    BadSignature,
    #[error("init data carries no auth_date")]
    MissingAuthDate,
    #[error("init data has expired")]
    Expired,
    #[error("init data carries no user")]
    MissingUser,
    #[error("init data field `{0}` is malformed")]
    Malformed(String),
}

/// Telegram account described by verified init data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Checks init data signatures against one bot token.
#[derive(Clone)]
pub struct InitDataVerifier {
    secret: Vec<u8>,
    max_age_secs: i64,
}

impl fmt::Debug for InitDataVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitDataVerifier")
            .field("max_age_secs", &self.max_age_secs)
            .finish_non_exhaustive()
    }
}

impl InitDataVerifier {
    pub fn new(bot_token: &str) -> Self {
        let secret = keyed(b"WebAppData")
            .chain_update(bot_token.as_bytes())
            .finalize()
            .into_bytes()
            .to_vec();
        Self {
            secret,
            max_age_secs: DEFAULT_INIT_DATA_MAX_AGE.as_secs() as i64,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Validates the signature and freshness of `init_data` as of `now`.
    pub fn verify(&self, init_data: &str, now: DateTime<Utc>) -> Result<WebAppUser, AuthError> {
        if init_data.trim().is_empty() {
            return Err(AuthError::Missing);
        }

        let mut fields = BTreeMap::new();
        for pair in init_data.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value =
                urlencoding::decode(value).map_err(|_| AuthError::Malformed(key.to_string()))?;
            fields.insert(key, value.into_owned());
        }

        let hash = fields.remove("hash").ok_or(AuthError::MissingHash)?;
        let tag = hex::decode(hash.trim()).map_err(|_| AuthError::BadSignature)?;
        let check_string = fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");
        keyed(&self.secret)
            .chain_update(check_string.as_bytes())
            .verify_slice(&tag)
            .map_err(|_| AuthError::BadSignature)?;

        let auth_date = fields
            .get("auth_date")
            .ok_or(AuthError::MissingAuthDate)?
            .parse::<i64>()
            .map_err(|_| AuthError::Malformed("auth_date".to_string()))?;
        if now.timestamp().saturating_sub(auth_date) > self.max_age_secs {
            return Err(AuthError::Expired);
        }

        let user = fields.get("user").ok_or(AuthError::MissingUser)?;
        serde_json::from_str(user).map_err(|_| AuthError::Malformed("user".to_string()))
    }
}

fn keyed(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

#[cfg(test)]
impl InitDataVerifier {
    /// Encodes and signs `fields` the way Telegram does.
    pub(crate) fn sign(&self, fields: &[(&str, &str)]) -> String {
        let mut sorted = fields.to_vec();
        sorted.sort();
        let check_string = sorted
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");
        let hash = hex::encode(
            keyed(&self.secret)
                .chain_update(check_string.as_bytes())
                .finalize()
                .into_bytes(),
        );

        let mut encoded: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        encoded.push(format!("hash={hash}"));
        encoded.join("&")
    }
}

/// The caller's Telegram user, proven by the request's signed init data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedUser(pub UserId);

#[async_trait]
impl<St> FromRequestParts<St> for SignedUser
where
    Arc<InitDataVerifier>: FromRef<St>,
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<InitDataVerifier>::from_ref(state);
        let init_data = parts
            .headers
            .get(INIT_DATA_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        match verifier.verify(init_data, Utc::now()) {
            Ok(user) => Ok(SignedUser(UserId(user.id))),
            Err(err) => {
                debug!(error = %err, "init data rejected");
                let payload = json!({ "error": err.to_string() });
                Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
            }
        }
    }
}
