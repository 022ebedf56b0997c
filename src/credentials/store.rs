//! Encrypted credential record storage using SQLite.
//!
//! One record per (identity, provider) pair. Access and refresh tokens are
//! sealed by the vault before they touch the database; re-authorization and
//! refresh both go through the same upsert, so a record is always replaced
//! whole — SQLite's atomicity guarantees no half-old/half-new token pair is
//! ever observable.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::vault::Vault;
use super::Credentials;
use crate::error::Result;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id INTEGER PRIMARY KEY,
///     identity TEXT NOT NULL,
///     provider TEXT NOT NULL,
///     access_token TEXT NOT NULL,   -- Sealed blob
///     refresh_token TEXT NOT NULL,  -- Sealed blob
///     expires_at TEXT NOT NULL,     -- ISO 8601 timestamp
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(identity, provider)
/// );
/// ```
///
/// # Thread safety
/// The connection is wrapped in a Mutex; SQLite runs in serialized mode.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    vault: Vault,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file (`:memory:` in tests)
    /// * `master_key` - Base64-encoded 32-byte vault key
    pub fn new<P: AsRef<Path>>(db_path: P, master_key: &str) -> Result<Self> {
        let vault = Vault::new(master_key)?;

        let conn = Connection::open(db_path)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                identity TEXT NOT NULL,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(identity, provider)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_identity_provider ON credentials(identity, provider)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            vault,
        })
    }

    /// Stores credentials for an identity and provider.
    ///
    /// Existing credentials are replaced in a single atomic upsert.
    pub fn put(&self, identity: &str, provider: &str, credentials: &Credentials) -> Result<()> {
        let access_sealed = self.vault.seal(&credentials.access_token)?;
        let refresh_sealed = self.vault.seal(&credentials.refresh_token)?;
        let expires_at = credentials.expires_at.to_rfc3339();
        let now = Utc::now().to_rfc3339();

        self.conn.lock().unwrap().execute(
            r#"
            INSERT INTO credentials (
                identity, provider,
                access_token, refresh_token,
                expires_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(identity, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
            params![
                identity,
                provider,
                access_sealed,
                refresh_sealed,
                expires_at,
                now,
                now,
            ],
        )?;

        Ok(())
    }

    /// Retrieves and unseals credentials for an identity and provider.
    ///
    /// Returns `Ok(None)` when no record exists. An [`crate::Error::Integrity`]
    /// failure here means the stored blobs were tampered with or the master
    /// key changed — it propagates to the caller.
    pub fn get(&self, identity: &str, provider: &str) -> Result<Option<Credentials>> {
        let row: Option<(String, String, String)> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                r#"
                SELECT access_token, refresh_token, expires_at
                FROM credentials
                WHERE identity = ?1 AND provider = ?2
                "#,
                params![identity, provider],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };

        let Some((access_sealed, refresh_sealed, expires_at)) = row else {
            return Ok(None);
        };

        let access_token = self.vault.unseal(&access_sealed)?;
        let refresh_token = self.vault.unseal(&refresh_sealed)?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                crate::Error::InvalidInput(format!("stored expiry is not RFC 3339: {e}"))
            })?;

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Deletes credentials for an identity and provider.
    ///
    /// Returns whether a record existed.
    pub fn delete(&self, identity: &str, provider: &str) -> Result<bool> {
        let rows = self.conn.lock().unwrap().execute(
            "DELETE FROM credentials WHERE identity = ?1 AND provider = ?2",
            params![identity, provider],
        )?;

        Ok(rows > 0)
    }

    /// Lists all stored (identity, provider) pairs.
    ///
    /// Used by the surrounding system to enumerate connected projects.
    pub fn list_identities(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT identity, provider FROM credentials ORDER BY identity, provider")?;

        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;

        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::Duration;

    fn create_test_store() -> CredentialStore {
        let key = BASE64.encode([0u8; 32]);
        CredentialStore::new(":memory:", &key).expect("failed to create test store")
    }

    fn create_test_credentials() -> Credentials {
        Credentials {
            access_token: "sbp_access_12345".to_string(),
            refresh_token: "sbp_refresh_67890".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = create_test_store();
        let creds = create_test_credentials();

        store.put("user1", "supabase", &creds).expect("put failed");

        let retrieved = store
            .get("user1", "supabase")
            .expect("get failed")
            .expect("record missing");

        assert_eq!(retrieved.access_token, creds.access_token);
        assert_eq!(retrieved.refresh_token, creds.refresh_token);
        assert_eq!(
            retrieved.expires_at.timestamp(),
            creds.expires_at.timestamp()
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get("user1", "supabase").unwrap().is_none());
    }

    #[test]
    fn test_reauthorization_overwrites() {
        let store = create_test_store();
        store.put("user1", "supabase", &create_test_credentials()).unwrap();

        let newer = Credentials {
            access_token: "sbp_access_new".to_string(),
            refresh_token: "sbp_refresh_new".to_string(),
            expires_at: Utc::now() + Duration::hours(2),
        };
        store.put("user1", "supabase", &newer).unwrap();

        // One record, the new one
        let retrieved = store.get("user1", "supabase").unwrap().unwrap();
        assert_eq!(retrieved.access_token, "sbp_access_new");
        assert_eq!(store.list_identities().unwrap().len(), 1);
    }

    #[test]
    fn test_tokens_sealed_at_rest() {
        let store = create_test_store();
        let creds = create_test_credentials();
        store.put("user1", "supabase", &creds).unwrap();

        // Read the raw column: no plaintext token in the database
        let raw: String = store
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT access_token FROM credentials WHERE identity = 'user1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(raw, creds.access_token);
        assert!(!raw.contains("sbp_access"));
    }

    #[test]
    fn test_delete() {
        let store = create_test_store();
        store.put("user1", "supabase", &create_test_credentials()).unwrap();

        assert!(store.delete("user1", "supabase").unwrap());
        assert!(store.get("user1", "supabase").unwrap().is_none());
        assert!(!store.delete("user1", "supabase").unwrap());
    }

    #[test]
    fn test_list_identities() {
        let store = create_test_store();
        let creds = create_test_credentials();

        store.put("user2", "supabase", &creds).unwrap();
        store.put("user1", "supabase", &creds).unwrap();

        let pairs = store.list_identities().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "user1"); // Ordered
    }

    #[test]
    fn test_invalid_master_key() {
        assert!(CredentialStore::new(":memory:", "short").is_err());
        assert!(CredentialStore::new(":memory:", "not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_persistent_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.db");
        let key = BASE64.encode([3u8; 32]);

        {
            let store = CredentialStore::new(&path, &key).unwrap();
            store.put("user1", "supabase", &create_test_credentials()).unwrap();
        }

        // Reopen and verify the record survived
        let store = CredentialStore::new(&path, &key).unwrap();
        let creds = store.get("user1", "supabase").unwrap().unwrap();
        assert_eq!(creds.access_token, "sbp_access_12345");
    }
}
