//! Bearer token acquisition for token-based SASL mechanisms.
//!
//! The transport layer holds one [`TokenProvider`] per configuration build
//! and consults it on every connection attempt. Providers must therefore
//! tolerate concurrent invocation.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// How long before expiry a cached token is considered stale.
const REFRESH_MARGIN: Duration = Duration::from_secs(2);

/// An opaque, time-limited credential presented as proof of authorization.
#[derive(Debug, Clone)]
pub struct BearerToken {
    /// The token value, handed to the SASL OAUTHBEARER handshake verbatim.
    pub value: String,
    /// When the token stops being valid, if the issuer said.
    pub expires_at: Option<SystemTime>,
}

/// Produces a current bearer token on demand.
///
/// One provider instance is shared across all reconnect attempts of a
/// transport; implementations own whatever cache state they need.
#[async_trait]
pub trait TokenProvider: Send + Sync + Debug {
    /// Return a bearer token valid at the time of the call.
    async fn token(&self) -> AuthResult<BearerToken>;
}

/// Performs one OAuth2 client-credentials exchange.
///
/// Split out from the provider so the caching behavior is testable without a
/// live identity provider.
#[async_trait]
pub trait TokenExchange: Send + Sync + Debug {
    /// Exchange client credentials for a fresh token.
    async fn exchange(&self) -> AuthResult<BearerToken>;
}

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client-credentials exchange against an OAuth2 token endpoint.
#[derive(Debug)]
pub struct ClientCredentialsExchange {
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl ClientCredentialsExchange {
    /// Create an exchange bound to a token endpoint.
    #[must_use]
    pub fn new(token_url: &str, client_id: &str, client_secret: &str, scopes: &[String]) -> Self {
        Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes: scopes.to_vec(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> AuthResult<BearerToken> {
        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        if !self.scopes.is_empty() {
            form.push(("scope", self.scopes.join(" ")));
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("malformed token response: {e}")))?;

        Ok(BearerToken {
            value: parsed.access_token,
            expires_at: parsed
                .expires_in
                .map(|secs| SystemTime::now() + Duration::from_secs(secs)),
        })
    }
}

/// Cached token and its expiry, always replaced as a unit.
#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: SystemTime,
}

/// Token provider wrapping an OAuth2 client-credentials flow with expiry
/// caching.
///
/// The cached token is returned while its expiry is more than
/// [`REFRESH_MARGIN`] in the future. Concurrent callers may race to refresh
/// an expired token; each performs its own exchange and the last write wins.
/// The cache slot is replaced under one lock, so a token is never observed
/// paired with another token's expiry.
#[derive(Debug)]
pub struct OAuth2TokenProvider {
    exchange: Box<dyn TokenExchange>,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuth2TokenProvider {
    /// Create a provider around a token exchange.
    #[must_use]
    pub fn new(exchange: Box<dyn TokenExchange>) -> Self {
        Self {
            exchange,
            cached: Mutex::new(None),
        }
    }

    fn cached_if_fresh(&self) -> Option<BearerToken> {
        let guard = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cached = guard.as_ref()?;
        if SystemTime::now() + REFRESH_MARGIN < cached.expires_at {
            Some(BearerToken {
                value: cached.value.clone(),
                expires_at: Some(cached.expires_at),
            })
        } else {
            None
        }
    }

    fn store(&self, token: &BearerToken) {
        // Tokens without an expiry are never reused.
        let Some(expires_at) = token.expires_at else {
            return;
        };
        let mut guard = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(CachedToken {
            value: token.value.clone(),
            expires_at,
        });
    }
}

#[async_trait]
impl TokenProvider for OAuth2TokenProvider {
    async fn token(&self) -> AuthResult<BearerToken> {
        if let Some(token) = self.cached_if_fresh() {
            return Ok(token);
        }

        debug!("cached token missing or stale, performing client-credentials exchange");
        let fresh = self.exchange.exchange().await?;
        self.store(&fresh);
        Ok(fresh)
    }
}
