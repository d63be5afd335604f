use std::path::Path;
use std::sync::Mutex;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to read service account file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed service account file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("jwt signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("token endpoint returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Credentials for the daemon's non-human identity, in the remote store's
/// documented service-account JSON layout.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Exchanges a signed-JWT assertion for a short-lived access token and
/// caches it until shortly before expiry.
pub struct TokenProvider {
    http: Client,
    key: ServiceAccountKey,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(key: ServiceAccountKey) -> Self {
        Self::with_scope(key, DEFAULT_SCOPE)
    }

    pub fn with_scope(key: ServiceAccountKey, scope: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            key,
            scope: scope.into(),
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        {
            let cached = self.cached.lock().expect("token cache mutex poisoned");
            if let Some(token) = cached.as_ref()
                && token.expires_at - EXPIRY_MARGIN_SECS > now
            {
                return Ok(token.access_token.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api { status, body });
        }
        let payload: TokenResponse = response.json().await?;

        let expires_at = now + payload.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        let mut cached = self.cached.lock().expect("token cache mutex poisoned");
        *cached = Some(CachedToken {
            access_token: payload.access_token.clone(),
            expires_at,
        });
        Ok(payload.access_token)
    }

    fn sign_assertion(&self, now: i64) -> Result<String, AuthError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }
}
