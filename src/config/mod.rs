//! Scanner configuration.
//!
//! All endpoint URLs live in the config so tests can point every component at
//! stub servers — no process-wide client state. Secrets (master key, OAuth
//! client credentials, classifier API key) are not part of the TOML file;
//! the binary fills them in from environment variables.

use serde::Deserialize;

/// Complete rowscan configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RowscanConfig {
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Supabase OAuth and management API endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    /// OAuth authorization endpoint (browser redirect target)
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// OAuth token endpoint (code exchange and refresh)
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Management API base URL (catalog queries, API key retrieval)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// OAuth scopes requested at authorization time
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// OAuth client ID (from ROWSCAN_OAUTH_CLIENT_ID, not the TOML file)
    #[serde(skip)]
    pub client_id: String,
    /// OAuth client secret (from ROWSCAN_OAUTH_CLIENT_SECRET)
    #[serde(skip)]
    pub client_secret: String,
}

fn default_auth_url() -> String {
    "https://api.supabase.com/v1/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://api.supabase.com/v1/oauth/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.supabase.com".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["all".to_string()]
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            scopes: default_scopes(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

/// Scan limits and timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Maximum number of tables examined per scan
    #[serde(default = "default_max_tables")]
    pub max_tables: usize,
    /// Number of table probes in flight at once
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    /// Per-table probe timeout (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// Catalog query timeout (seconds)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_seconds: u64,
}

fn default_max_tables() -> usize {
    50
}

fn default_group_size() -> usize {
    5
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_tables: default_max_tables(),
            group_size: default_group_size(),
            probe_timeout_seconds: default_probe_timeout(),
            query_timeout_seconds: default_query_timeout(),
        }
    }
}

/// AI risk classifier configuration.
///
/// The classifier is optional: with no API key set, findings are reported
/// without annotation and no classifier request is ever made.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Messages API endpoint
    #[serde(default = "default_classifier_api_url")]
    pub api_url: String,
    /// Model identifier
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Per-finding request timeout (seconds)
    #[serde(default = "default_classifier_timeout")]
    pub timeout_seconds: u64,
    /// API key (from ANTHROPIC_API_KEY, not the TOML file)
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_classifier_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_classifier_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_classifier_timeout() -> u64 {
    30
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_url: default_classifier_api_url(),
            model: default_classifier_model(),
            timeout_seconds: default_classifier_timeout(),
            api_key: None,
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<RowscanConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: RowscanConfig = toml::from_str(&contents)?;
    Ok(config)
}
