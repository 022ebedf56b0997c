//! AI risk classification for findings.
//!
//! Best-effort enrichment: one messages-API request per finding, asking for a
//! strict JSON payload with a risk narrative, sensitive-data categories,
//! remediation steps, and a fix script. The classifier never decides whether
//! something is a finding — findings are final before it runs — and every
//! failure mode (unconfigured, unreachable, malformed output, timeout)
//! degrades to "no annotation" without touching the rest of the scan.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::error::Result;

/// Structured risk annotation attached to a finding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RiskAnalysis {
    /// Narrative description of what the exposure means
    pub risk_description: String,
    /// Labels for the kinds of sensitive data observed (e.g. "email", "credentials")
    pub sensitive_data_categories: Vec<String>,
    /// Ordered remediation steps
    pub remediation_steps: Vec<String>,
    /// SQL script that would close the exposure
    pub fix_script: String,
}

/// Response shape of the messages API (only what we read).
#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Client for the external reasoning service.
pub struct RiskClassifier {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl RiskClassifier {
    /// Builds a classifier, or `None` when no API key is configured.
    ///
    /// The unconfigured mode is fully supported: the scan simply skips the
    /// classification step.
    pub fn from_config(config: &ClassifierConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
            debug!("No classifier API key configured, findings will not be annotated");
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Some(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        }))
    }

    /// Analyzes one finding. Returns `None` on any failure.
    pub async fn analyze(
        &self,
        table: &str,
        rls_enabled: bool,
        columns: &[String],
        sample_row: &Value,
    ) -> Option<RiskAnalysis> {
        let prompt = build_prompt(table, rls_enabled, columns, sample_row);

        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let response = match self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(table = %table, error = %e, "Classifier request failed, finding left unannotated");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                table = %table,
                status = %response.status(),
                "Classifier returned an error, finding left unannotated"
            );
            return None;
        }

        let parsed: MessagesResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(table = %table, error = %e, "Malformed classifier response");
                return None;
            }
        };

        let text = parsed
            .content
            .first()
            .map(|block| block.text.as_str())
            .unwrap_or_default();

        match extract_first_json(text).and_then(|json| serde_json::from_str(json).ok()) {
            Some(analysis) => Some(analysis),
            None => {
                warn!(table = %table, "Classifier output had no parseable JSON payload");
                None
            }
        }
    }
}

fn build_prompt(table: &str, rls_enabled: bool, columns: &[String], sample_row: &Value) -> String {
    let protection = if rls_enabled {
        "row level security is enabled but its policies allow anonymous reads"
    } else {
        "row level security is disabled entirely"
    };

    format!(
        "A security scan found that the database table '{table}' is readable \
         by anonymous clients: {protection}. Observed columns: {columns:?}. \
         One sample row (already leaked): {sample_row}.\n\n\
         Respond with exactly one JSON object and no other text, with these \
         keys: \"risk_description\" (string), \"sensitive_data_categories\" \
         (array of strings), \"remediation_steps\" (array of strings, \
         ordered), \"fix_script\" (string, a SQL script that closes the \
         exposure)."
    )
}

/// Extracts the first balanced JSON object from free text.
///
/// Brace matching is string-aware so braces inside JSON string values do not
/// derail it. Returns `None` when no balanced object exists.
fn extract_first_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
