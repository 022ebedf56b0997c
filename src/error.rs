//! Error taxonomy for the scanner.
//!
//! Hard failures (credential acquisition, catalog introspection) carry their
//! own variants so callers can match on them. Per-table probe failures and
//! classifier failures are never represented here — they are contained inside
//! the scan and folded into the report.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed call argument (empty plaintext, undecodable state token, ...).
    /// Fatal to that call only.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Ciphertext authentication failed: tampered blob or wrong master key.
    #[error("ciphertext integrity check failed (tampered data or wrong key)")]
    Integrity,

    /// No credential record stored for this identity.
    #[error("no stored credentials for identity '{0}'")]
    CredentialNotFound(String),

    /// The platform rejected the refresh token. The credential record has
    /// been deleted; only a fresh authorization can recover.
    #[error("refresh token rejected by platform, re-authorization required")]
    ReauthorizationRequired,

    /// Catalog introspection failed. Aborts the whole scan.
    #[error("schema discovery failed: {0}")]
    SchemaQuery(String),

    /// Token endpoint returned an unexpected response (not a refresh
    /// rejection — those map to [`Error::ReauthorizationRequired`]).
    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    /// Credential store I/O failure.
    #[error("credential store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Outbound HTTP failure (client construction or transport).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
