//! Schema discovery via the Supabase management API.
//!
//! One catalog query per scan, bearer-authenticated with the delegated
//! management token. Any failure here aborts the scan — probing a partial
//! catalog would under-report silently.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::scan::TableDescriptor;

/// Fixed catalog introspection query: every table in the application
/// namespace joined against its row-security flag.
const CATALOG_QUERY: &str = "select tablename as name, rowsecurity as rls_enabled \
     from pg_tables where schemaname = 'public' order by tablename";

/// Row shape returned by the catalog query.
#[derive(Deserialize)]
struct CatalogRow {
    name: String,
    rls_enabled: bool,
}

/// Entry shape returned by the api-keys endpoint.
#[derive(Deserialize)]
struct ApiKeyEntry {
    name: String,
    api_key: String,
}

/// Catalog and API-key access for one management API deployment.
pub struct SchemaDiscovery {
    http: reqwest::Client,
    api_base_url: String,
}

impl SchemaDiscovery {
    /// Creates a discovery client with its own request timeout.
    pub fn new(api_base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Lists all public tables with their row-security flags.
    ///
    /// Zero tables is a valid outcome. Every failure mode — unreachable
    /// target, permission denied, malformed response — maps to
    /// [`Error::SchemaQuery`].
    pub async fn list_tables(
        &self,
        access_token: &str,
        project_ref: &str,
    ) -> Result<Vec<TableDescriptor>> {
        let url = format!(
            "{}/v1/projects/{}/database/query",
            self.api_base_url, project_ref
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({ "query": CATALOG_QUERY }))
            .send()
            .await
            .map_err(|e| Error::SchemaQuery(format!("catalog query request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SchemaQuery(format!(
                "catalog query returned status {status}: {body}"
            )));
        }

        let rows: Vec<CatalogRow> = response
            .json()
            .await
            .map_err(|e| Error::SchemaQuery(format!("malformed catalog response: {e}")))?;

        let mut tables: Vec<TableDescriptor> = rows
            .into_iter()
            .map(|row| TableDescriptor {
                name: row.name,
                rls_enabled: row.rls_enabled,
            })
            .collect();

        // The query orders server-side; sort again so determinism does not
        // depend on the remote end honoring it
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(project = %project_ref, table_count = tables.len(), "Catalog discovered");

        Ok(tables)
    }

    /// Fetches the project's `anon` API key — the unprivileged credential
    /// every probe runs under.
    pub async fn fetch_anon_key(&self, access_token: &str, project_ref: &str) -> Result<String> {
        let url = format!("{}/v1/projects/{}/api-keys", self.api_base_url, project_ref);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::SchemaQuery(format!("api-key request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::SchemaQuery(format!(
                "api-key request returned status {status}"
            )));
        }

        let keys: Vec<ApiKeyEntry> = response
            .json()
            .await
            .map_err(|e| Error::SchemaQuery(format!("malformed api-key response: {e}")))?;

        keys.into_iter()
            .find(|k| k.name == "anon")
            .map(|k| k.api_key)
            .ok_or_else(|| Error::SchemaQuery("project has no anon API key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn discovery(base: &str) -> SchemaDiscovery {
        SchemaDiscovery::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_tables() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/projects/abc123/database/query")
            .match_header("authorization", "Bearer mgmt_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"name":"orders","rls_enabled":true},
                    {"name":"users","rls_enabled":false}
                ]"#,
            )
            .create_async()
            .await;

        let tables = discovery(&server.url())
            .list_tables("mgmt_token", "abc123")
            .await
            .expect("discovery failed");

        mock.assert_async().await;
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "orders");
        assert!(tables[0].rls_enabled);
        assert_eq!(tables[1].name, "users");
        assert!(!tables[1].rls_enabled);
    }

    #[tokio::test]
    async fn test_tables_sorted_by_name() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/projects/abc123/database/query")
            .with_status(200)
            .with_body(
                r#"[
                    {"name":"zebras","rls_enabled":true},
                    {"name":"apples","rls_enabled":true}
                ]"#,
            )
            .create_async()
            .await;

        let tables = discovery(&server.url())
            .list_tables("mgmt_token", "abc123")
            .await
            .unwrap();

        assert_eq!(tables[0].name, "apples");
        assert_eq!(tables[1].name, "zebras");
    }

    #[tokio::test]
    async fn test_empty_catalog_is_valid() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/projects/abc123/database/query")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let tables = discovery(&server.url())
            .list_tables("mgmt_token", "abc123")
            .await
            .unwrap();
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_is_schema_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/projects/abc123/database/query")
            .with_status(403)
            .with_body(r#"{"message":"forbidden"}"#)
            .create_async()
            .await;

        let err = discovery(&server.url())
            .list_tables("mgmt_token", "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaQuery(_)));
    }

    #[tokio::test]
    async fn test_malformed_response_is_schema_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/projects/abc123/database/query")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let err = discovery(&server.url())
            .list_tables("mgmt_token", "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaQuery(_)));
    }

    #[tokio::test]
    async fn test_fetch_anon_key() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/projects/abc123/api-keys")
            .match_header("authorization", "Bearer mgmt_token")
            .with_status(200)
            .with_body(
                r#"[
                    {"name":"service_role","api_key":"srv_secret"},
                    {"name":"anon","api_key":"anon_key_123"}
                ]"#,
            )
            .create_async()
            .await;

        let key = discovery(&server.url())
            .fetch_anon_key("mgmt_token", "abc123")
            .await
            .unwrap();
        assert_eq!(key, "anon_key_123");
    }

    #[tokio::test]
    async fn test_missing_anon_key_is_schema_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/projects/abc123/api-keys")
            .with_status(200)
            .with_body(r#"[{"name":"service_role","api_key":"srv_secret"}]"#)
            .create_async()
            .await;

        let err = discovery(&server.url())
            .fetch_anon_key("mgmt_token", "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaQuery(_)));
    }
}
