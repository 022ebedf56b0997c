//! Exposure scanning: discovery, probing, aggregation.
//!
//! A scan is one bounded batch job: discover the catalog, probe every table
//! (capped) under the anon key in bounded concurrent groups, optionally
//! annotate findings with the AI classifier, and aggregate a report. The only
//! hard failure points are credential acquisition and schema discovery; from
//! the first probe onward a scan always completes.

pub mod discovery;
pub mod probe;

pub use discovery::SchemaDiscovery;
pub use probe::{ProbeEngine, ProbeOutcome, ProbeTarget};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::{RiskAnalysis, RiskClassifier};
use crate::config::ScanConfig;
use crate::tokens::TokenManager;

/// One table in the discovered catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name in the public schema
    pub name: String,
    /// Whether row level security is configured for the table
    pub rls_enabled: bool,
}

/// Severity of a finding. Always critical under current policy: any row
/// readable anonymously is treated the same regardless of content.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
}

/// One detected instance of anonymously readable data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Finding {
    pub table: String,
    pub severity: Severity,
    /// Human-readable issue summary; wording depends on whether RLS was
    /// reported as configured
    pub issue: String,
    /// Column names observed on the leaked row
    pub leaked_fields: Vec<String>,
    /// The first row returned by the anonymous read, verbatim
    pub sample_row: Value,
    /// AI risk annotation, absent when the classifier is unconfigured or
    /// failed for this finding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<RiskAnalysis>,
}

/// Scan totals. `total = vulnerable + secure` always holds.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub vulnerable: usize,
    pub secure: usize,
}

/// The scan's single output artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanReport {
    pub success: bool,
    pub summary: ScanSummary,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanReport {
    /// Report for a scan that failed before any probing started.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: ScanSummary::default(),
            findings: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Which project a scan runs against.
#[derive(Clone, Debug)]
pub struct ProjectTarget {
    /// Supabase project reference (e.g. `abcdefghijklmnop`)
    pub project_ref: String,
    /// REST surface base URL; derived from the ref unless overridden
    pub rest_base_url: String,
}

impl ProjectTarget {
    /// Target with the conventional REST base URL for a project ref.
    pub fn new(project_ref: &str) -> Self {
        Self {
            project_ref: project_ref.to_string(),
            rest_base_url: format!("https://{project_ref}.supabase.co"),
        }
    }

    /// Target with an explicit REST base URL (stub servers in tests).
    pub fn with_rest_base_url(project_ref: &str, rest_base_url: &str) -> Self {
        Self {
            project_ref: project_ref.to_string(),
            rest_base_url: rest_base_url.to_string(),
        }
    }
}

/// Runs scans end to end.
pub struct Scanner {
    tokens: Arc<TokenManager>,
    discovery: SchemaDiscovery,
    probe: ProbeEngine,
    classifier: Option<RiskClassifier>,
    max_tables: usize,
}

impl Scanner {
    /// Assembles a scanner from its collaborators.
    pub fn new(
        tokens: Arc<TokenManager>,
        discovery: SchemaDiscovery,
        probe: ProbeEngine,
        classifier: Option<RiskClassifier>,
        scan_config: &ScanConfig,
    ) -> Self {
        Self {
            tokens,
            discovery,
            probe,
            classifier,
            max_tables: scan_config.max_tables,
        }
    }

    /// Runs one scan for an identity against a project.
    ///
    /// Returns a failed report (never an `Err`) when credentials cannot be
    /// obtained or the schema query fails; per-table trouble never fails the
    /// scan.
    pub async fn run(&self, identity: &str, target: &ProjectTarget) -> ScanReport {
        let token = match self.tokens.get_valid_token(identity).await {
            Ok(token) => token,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Scan aborted: no valid credential");
                return ScanReport::failed(e.to_string());
            }
        };

        let tables = match self.discovery.list_tables(&token, &target.project_ref).await {
            Ok(tables) => tables,
            Err(e) => {
                warn!(project = %target.project_ref, error = %e, "Scan aborted: schema discovery failed");
                return ScanReport::failed(e.to_string());
            }
        };

        let anon_key = match self
            .discovery
            .fetch_anon_key(&token, &target.project_ref)
            .await
        {
            Ok(key) => key,
            Err(e) => {
                warn!(project = %target.project_ref, error = %e, "Scan aborted: no anon key");
                return ScanReport::failed(e.to_string());
            }
        };

        // Cap the batch regardless of the target's true table count
        let mut tables = tables;
        tables.truncate(self.max_tables);

        info!(
            project = %target.project_ref,
            table_count = tables.len(),
            "Probing tables"
        );

        let probe_target = ProbeTarget {
            rest_base_url: target.rest_base_url.clone(),
            anon_key,
        };

        let outcomes = self.probe.probe_tables(&probe_target, &tables).await;

        let mut findings = Vec::new();
        for (table, outcome) in tables.iter().zip(outcomes) {
            match outcome {
                ProbeOutcome::Exposed {
                    columns,
                    sample_row,
                } => {
                    let ai_analysis = match &self.classifier {
                        Some(classifier) => {
                            classifier
                                .analyze(&table.name, table.rls_enabled, &columns, &sample_row)
                                .await
                        }
                        None => None,
                    };

                    findings.push(Finding {
                        table: table.name.clone(),
                        severity: Severity::Critical,
                        issue: issue_text(table),
                        leaked_fields: columns,
                        sample_row,
                        ai_analysis,
                    });
                }
                // Inconclusive folds into secure under the fail-open policy:
                // a transient blip must not become a false positive
                ProbeOutcome::Secure | ProbeOutcome::Inconclusive { .. } => {}
            }
        }

        let summary = ScanSummary {
            total: tables.len(),
            vulnerable: findings.len(),
            secure: tables.len() - findings.len(),
        };

        info!(
            project = %target.project_ref,
            total = summary.total,
            vulnerable = summary.vulnerable,
            "Scan complete"
        );

        ScanReport {
            success: true,
            summary,
            findings,
            error: None,
        }
    }
}

/// Issue wording depends on the protection flag; the severity does not.
fn issue_text(table: &TableDescriptor) -> String {
    if table.rls_enabled {
        format!(
            "Row level security is enabled on '{}' but its policies allow anonymous reads",
            table.name
        )
    } else {
        format!(
            "Row level security is disabled on '{}'; table data is publicly readable",
            table.name
        )
    }
}
