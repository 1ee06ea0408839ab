//! Client-credentials token acquisition against the Microsoft identity platform.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::contract::{AccessToken, TokenProvider};
use crate::error::AuthError;

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Requests a fresh token from `{authority_host}/{tenant_id}/oauth2/v2.0/token` on every call.
pub struct ClientCredentials {
    http: Client,
    credentials: Credentials,
}

impl ClientCredentials {
    pub fn new(http: Client, credentials: Credentials) -> Self {
        Self { http, credentials }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.credentials.authority_host.trim_end_matches('/'),
            self.credentials.tenant_id
        )
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        let url = self.token_url();
        debug!(url = %url, client_id = %self.credentials.client_id, "[AUTH] Requesting client-credentials token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", self.credentials.scope.as_str()),
        ];
        let resp = self.http.post(&url).form(&form).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        // Error responses come back as JSON too; anything unparseable counts as "no token".
        let parsed: TokenResponse = serde_json::from_str(&body).unwrap_or(TokenResponse {
            access_token: None,
            expires_in: None,
            error: None,
            error_description: Some(body),
        });

        match parsed.access_token {
            Some(secret) if !secret.is_empty() => {
                info!(
                    expires_in = ?parsed.expires_in,
                    "[AUTH] Acquired access token"
                );
                Ok(AccessToken {
                    secret,
                    expires_in: parsed.expires_in,
                })
            }
            _ => Err(AuthError::MissingToken {
                status,
                error: parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
                description: parsed.error_description.unwrap_or_default(),
            }),
        }
    }
}

/// Wraps a [`TokenProvider`] and hands out the same token until it is about to expire.
///
/// Tokens without a reported lifetime are never cached.
pub struct CachedTokenProvider<P> {
    inner: P,
    cached: Mutex<Option<(AccessToken, Instant)>>,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, valid_until)) = cached.as_ref() {
            if Instant::now() < *valid_until {
                debug!("[AUTH] Reusing cached access token");
                return Ok(token.clone());
            }
        }

        let token = self.inner.access_token().await?;
        *cached = token.expires_in.and_then(|secs| {
            let lifetime = Duration::from_secs(secs).checked_sub(EXPIRY_MARGIN)?;
            Some((token.clone(), Instant::now() + lifetime))
        });
        Ok(token)
    }
}
