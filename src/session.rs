//! Session resolution against the external auth provider.
//!
//! The session credential is an opaque cookie issued by the provider. This
//! module reads it, asks the provider who it belongs to, and builds the
//! request-scoped [`CurrentSession`] handed to dashboard handlers.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use cookie::Cookie;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::TutorlyConfig;
use crate::error::{Result, TutorlyError};
use crate::role::Role;

/// User attached to a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Raw role string; see [`Role::parse`].
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A session as resolved by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: SessionUser,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// The user's role, if it is one of the known roles.
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.user.role)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Opaque session credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short stable fingerprint for log correlation.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..6])
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

/// Identity and role of the caller, passed explicitly to every handler
/// behind the access gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession {
    pub user: SessionUser,
    pub role: Role,
    pub token: Option<SessionToken>,
}

impl CurrentSession {
    /// Require the caller to hold `role`.
    pub fn require(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(TutorlyError::Forbidden(format!(
                "{} cannot access {} resources",
                self.role, role
            )))
        }
    }

    /// The credential to forward to the remote API.
    pub fn credential(&self) -> Result<&SessionToken> {
        self.token.as_ref().ok_or(TutorlyError::Unauthenticated)
    }
}

/// Source of sessions for incoming requests.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Resolve the session carried by `headers`.
    ///
    /// `Ok(None)` means unauthenticated. `Err` means the lookup itself
    /// failed; callers must treat that as unauthenticated too.
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Session>>;
}

/// Session provider backed by the remote auth endpoint.
pub struct HttpSessionProvider {
    client: Client,
    url: String,
    cookie_name: String,
}

impl HttpSessionProvider {
    /// Create a provider calling `{api_url}{endpoint}`.
    pub fn new(
        api_url: &str,
        endpoint: &str,
        cookie_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TutorlyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", api_url.trim_end_matches('/'), endpoint),
            cookie_name: cookie_name.into(),
        })
    }

    pub fn from_config(config: &TutorlyConfig) -> Result<Self> {
        Self::new(
            &config.api_url,
            &config.session_endpoint,
            config.session_cookie.clone(),
            config.session_timeout,
        )
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Session>> {
        let Some(token) = extract_session_token(headers, &self.cookie_name) else {
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.url)
            .header(header::COOKIE.as_str(), forwarded_cookies(headers))
            .send()
            .await
            .map_err(|e| {
                TutorlyError::SessionResolution(format!(
                    "request failed for token {}: {}",
                    token.fingerprint(),
                    e
                ))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TutorlyError::SessionResolution(format!(
                "provider answered {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TutorlyError::SessionResolution(format!("unreadable body: {}", e)))?;

        let value: serde_json::Value = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&body)
                .map_err(|e| TutorlyError::SessionResolution(format!("invalid JSON: {}", e)))?
        };

        decode_session(value, Utc::now())
    }
}

/// The incoming `Cookie` headers joined into one value, unchanged.
fn forwarded_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Deserialize)]
struct SessionPayload {
    #[serde(default)]
    user: Option<SessionUser>,
    #[serde(default)]
    session: Option<SessionMeta>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMeta {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Decode any accepted provider response into a session.
///
/// Accepted shapes: `null`, `{ "data": null, "error": .. }`,
/// `{ "data": { "user": .., "session": .. } }` and the bare
/// `{ "user": .., "session": .. }`. A reported error, a missing user or an
/// expired session all decode to `None`.
pub fn decode_session(value: serde_json::Value, now: DateTime<Utc>) -> Result<Option<Session>> {
    let payload = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(mut map) => {
            if map.get("error").is_some_and(|e| !e.is_null()) {
                return Ok(None);
            }
            if map.contains_key("data") {
                match map.remove("data") {
                    Some(serde_json::Value::Null) | None => return Ok(None),
                    Some(inner) => inner,
                }
            } else {
                serde_json::Value::Object(map)
            }
        }
        other => {
            return Err(TutorlyError::SessionResolution(format!(
                "unexpected session payload: {}",
                other
            )))
        }
    };

    if payload.is_null() {
        return Ok(None);
    }

    let payload: SessionPayload = serde_json::from_value(payload)
        .map_err(|e| TutorlyError::SessionResolution(format!("malformed session: {}", e)))?;

    let Some(user) = payload.user else {
        return Ok(None);
    };

    let session = Session {
        user,
        expires_at: payload.session.and_then(|s| s.expires_at),
    };

    if session.is_expired(now) {
        return Ok(None);
    }

    Ok(Some(session))
}

/// Read the session credential cookie from request headers.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<SessionToken> {
    for header_value in headers.get_all(header::COOKIE) {
        let Ok(cookie_str) = header_value.to_str() else {
            continue;
        };
        for piece in cookie_str.split(';') {
            if let Ok(c) = Cookie::parse(piece.trim().to_string()) {
                if c.name() == cookie_name && !c.value().is_empty() {
                    return Some(SessionToken::new(c.value()));
                }
            }
        }
    }
    None
}

/// Build a `Set-Cookie` value that expires the session cookie at path `/`.
pub fn clear_session_cookie(cookie_name: &str, secure: bool) -> Option<HeaderValue> {
    let cookie = Cookie::build((cookie_name, ""))
        .path("/")
        .http_only(true)
        .same_site(cookie::SameSite::Lax)
        .secure(secure)
        .max_age(cookie::time::Duration::ZERO)
        .build();

    HeaderValue::from_str(&cookie.to_string()).ok()
}
