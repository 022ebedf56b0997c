use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use rowscan::classifier::RiskClassifier;
use rowscan::config::{load_config, RowscanConfig};
use rowscan::credentials::CredentialStore;
use rowscan::scan::{ProbeEngine, ProjectTarget, Scanner, SchemaDiscovery};
use rowscan::tokens::TokenManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rowscan=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let identity = args.next().context("usage: rowscan <identity> <project-ref> [config.toml]")?;
    let project_ref = args.next().context("usage: rowscan <identity> <project-ref> [config.toml]")?;
    let config_path = args.next();

    let mut config = match config_path {
        Some(path) => load_config(&path)
            .map_err(|e| anyhow::anyhow!("failed to load config from {path}: {e}"))?,
        None => RowscanConfig::default(),
    };

    // Secrets come from the environment, never from the config file
    config.supabase.client_id = std::env::var("ROWSCAN_OAUTH_CLIENT_ID")
        .context("ROWSCAN_OAUTH_CLIENT_ID not set")?;
    config.supabase.client_secret = std::env::var("ROWSCAN_OAUTH_CLIENT_SECRET")
        .context("ROWSCAN_OAUTH_CLIENT_SECRET not set")?;
    config.classifier.api_key = std::env::var("ANTHROPIC_API_KEY").ok();

    let master_key = std::env::var("ROWSCAN_ENCRYPTION_KEY")
        .context("ROWSCAN_ENCRYPTION_KEY not set (base64, 32 bytes)")?;

    let db_path =
        std::env::var("ROWSCAN_DB_PATH").unwrap_or_else(|_| "credentials.db".to_string());

    let store = Arc::new(CredentialStore::new(&db_path, &master_key)?);
    let tokens = Arc::new(TokenManager::new(store, config.supabase.clone())?);

    let discovery = SchemaDiscovery::new(
        &config.supabase.api_base_url,
        std::time::Duration::from_secs(config.scan.query_timeout_seconds),
    )?;
    let probe = ProbeEngine::new(
        config.scan.group_size,
        std::time::Duration::from_secs(config.scan.probe_timeout_seconds),
    )?;
    let classifier = RiskClassifier::from_config(&config.classifier)?;

    let scanner = Scanner::new(tokens, discovery, probe, classifier, &config.scan);

    info!(identity = %identity, project = %project_ref, "Starting scan");

    let report = scanner.run(&identity, &ProjectTarget::new(&project_ref)).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
