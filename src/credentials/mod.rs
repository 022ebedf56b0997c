//! Encrypted credential storage for delegated OAuth tokens.
//!
//! Tokens are sealed with AES-256-GCM before they are persisted and unsealed
//! only inside this module's boundary. The master key comes from the
//! environment at startup and lives in memory for the process lifetime.
//!
//! ```no_run
//! use rowscan::credentials::{CredentialStore, Credentials};
//! use chrono::{Duration, Utc};
//!
//! # fn main() -> rowscan::Result<()> {
//! let key = std::env::var("ROWSCAN_ENCRYPTION_KEY").expect("key not set");
//! let store = CredentialStore::new("credentials.db", &key)?;
//!
//! let creds = Credentials {
//!     access_token: "sbp_access".to_string(),
//!     refresh_token: "sbp_refresh".to_string(),
//!     expires_at: Utc::now() + Duration::hours(1),
//! };
//! store.put("user1", "supabase", &creds)?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod store;
mod vault;

pub use store::CredentialStore;
pub use vault::Vault;

/// Delegated OAuth tokens for one (identity, provider) pair.
///
/// This is the plaintext shape seen only between the token endpoint and the
/// vault boundary. At rest both tokens are sealed blobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (bearer for management API calls)
    pub access_token: String,

    /// OAuth refresh token
    pub refresh_token: String,

    /// Absolute access-token expiry (UTC)
    pub expires_at: DateTime<Utc>,
}
