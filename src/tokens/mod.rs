//! Token lifecycle management.
//!
//! Exchanges authorization codes, tracks expiry, and refreshes access tokens
//! transparently. The token endpoint authenticates the application itself via
//! HTTP Basic client credentials; the end user is represented only by the
//! delegated tokens.
//!
//! Refresh policy: a token expiring within 5 minutes is refreshed before use.
//! A refresh the platform rejects outright deletes the stored record — a dead
//! refresh token can never be retried, only replaced by a fresh
//! authorization.

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SupabaseConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{Error, Result};

/// Provider key under which records are stored.
pub const PROVIDER: &str = "supabase";

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN_SECONDS: i64 = 300;

/// Fallback token lifetime when the endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Token endpoint response (standard OAuth 2.0).
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Manages the credential lifecycle for all identities.
///
/// Safe to share (`Arc`) across concurrent scans: refreshes for one identity
/// serialize on a per-identity lock, and the store replaces records
/// atomically, so callers never observe a half-written token pair.
pub struct TokenManager {
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    config: SupabaseConfig,
    /// Per-identity refresh locks. A second caller arriving mid-refresh waits
    /// for the in-flight refresh and then re-reads the record.
    refresh_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    /// Creates a token manager.
    pub fn new(store: Arc<CredentialStore>, config: SupabaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            store,
            http,
            config,
            refresh_locks: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Exchanges an authorization code for tokens and stores them.
    ///
    /// Called from the OAuth callback after state verification. Overwrites
    /// any previous record for the identity.
    pub async fn exchange_code(
        &self,
        identity: &str,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<Credentials> {
        debug!(identity = %identity, "Exchanging authorization code for tokens");

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenEndpoint(format!(
                "code exchange failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let credentials = self.credentials_from_response(token_response, None)?;

        self.store.put(identity, PROVIDER, &credentials)?;

        info!(identity = %identity, "Authorization code exchanged, credentials stored");

        Ok(credentials)
    }

    /// Returns a valid plaintext access token for an identity.
    ///
    /// Fast path: the stored token expires more than 5 minutes from now and
    /// is returned with no network call. Otherwise the refresh path runs
    /// under the identity's lock.
    pub async fn get_valid_token(&self, identity: &str) -> Result<String> {
        let record = self
            .store
            .get(identity, PROVIDER)?
            .ok_or_else(|| Error::CredentialNotFound(identity.to_string()))?;

        if is_fresh(&record) {
            return Ok(record.access_token);
        }

        let lock = self.refresh_lock(identity).await;
        let _guard = lock.lock().await;

        // Another caller may have finished a refresh while we waited
        let record = self
            .store
            .get(identity, PROVIDER)?
            .ok_or_else(|| Error::CredentialNotFound(identity.to_string()))?;

        if is_fresh(&record) {
            debug!(identity = %identity, "Token refreshed by concurrent caller");
            return Ok(record.access_token);
        }

        let refreshed = self.refresh(identity, &record).await?;
        Ok(refreshed.access_token)
    }

    /// Deletes the stored credentials for an identity.
    pub fn disconnect(&self, identity: &str) -> Result<bool> {
        self.store.delete(identity, PROVIDER)
    }

    /// Exchanges the refresh token for a new token pair and atomically
    /// replaces the stored record.
    ///
    /// A definitive rejection (HTTP 4xx) deletes the record and surfaces
    /// [`Error::ReauthorizationRequired`]. Transport failures and server
    /// errors leave the record in place.
    async fn refresh(&self, identity: &str, record: &Credentials) -> Result<Credentials> {
        info!(identity = %identity, "Refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", record.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                identity = %identity,
                status = %status,
                body = %body,
                "Refresh token rejected, deleting credential record"
            );
            self.store.delete(identity, PROVIDER)?;
            return Err(Error::ReauthorizationRequired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenEndpoint(format!(
                "refresh failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let credentials =
            self.credentials_from_response(token_response, Some(&record.refresh_token))?;

        // Single atomic replace — no caller can observe a mixed pair
        self.store.put(identity, PROVIDER, &credentials)?;

        info!(
            identity = %identity,
            expires_at = %credentials.expires_at,
            "Access token refreshed"
        );

        Ok(credentials)
    }

    fn credentials_from_response(
        &self,
        response: TokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Result<Credentials> {
        // Keep the existing refresh token when the provider did not rotate it
        let refresh_token = response
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .ok_or_else(|| {
                Error::TokenEndpoint("token response missing refresh_token".to_string())
            })?;

        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);

        Ok(Credentials {
            access_token: response.access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }

    async fn refresh_lock(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Whether the record's expiry is comfortably in the future.
fn is_fresh(record: &Credentials) -> bool {
    record.expires_at > Utc::now() + Duration::seconds(REFRESH_MARGIN_SECONDS)
}
