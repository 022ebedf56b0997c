//! Exposure probing under the unprivileged credential.
//!
//! Each table gets one anonymous `limit 1` read against the project's REST
//! surface. A read that comes back with data is a finding; a rejected or
//! empty read is the desired outcome and is never surfaced as an error.
//! Probes run in fixed-size concurrent groups: the whole group joins before
//! the next starts, so peak outstanding requests stay bounded no matter how
//! large the catalog is.

use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::scan::TableDescriptor;

/// Outcome of one table probe.
///
/// `Inconclusive` exists so tests (and future policy) can tell a transport
/// blip apart from a confirmed rejection; the report currently folds it into
/// "secure".
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// The anonymous read returned at least one row.
    Exposed {
        /// Column names observed on the first returned row
        columns: Vec<String>,
        /// The first returned row, verbatim
        sample_row: Value,
    },
    /// The read was rejected or returned zero rows.
    Secure,
    /// The probe itself failed (timeout, transport error); nothing was
    /// learned about the table.
    Inconclusive { reason: String },
}

/// Where probes are aimed: the project's REST surface plus the anon key.
#[derive(Clone, Debug)]
pub struct ProbeTarget {
    pub rest_base_url: String,
    pub anon_key: String,
}

/// Probes tables in bounded concurrent groups.
pub struct ProbeEngine {
    http: reqwest::Client,
    group_size: usize,
}

impl ProbeEngine {
    /// Creates a probe engine.
    ///
    /// `timeout` applies per probe; a timed-out probe is inconclusive, not an
    /// error.
    pub fn new(group_size: usize, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            group_size: group_size.max(1),
        })
    }

    /// Probes every table, returning outcomes in input order.
    pub async fn probe_tables(
        &self,
        target: &ProbeTarget,
        tables: &[TableDescriptor],
    ) -> Vec<ProbeOutcome> {
        run_in_groups(tables.to_vec(), self.group_size, |table| async move {
            self.probe_table(target, &table).await
        })
        .await
    }

    /// Issues one anonymous single-row read against a table.
    async fn probe_table(&self, target: &ProbeTarget, table: &TableDescriptor) -> ProbeOutcome {
        let url = format!(
            "{}/rest/v1/{}?select=*&limit=1",
            target.rest_base_url.trim_end_matches('/'),
            table.name
        );

        let response = match self
            .http
            .get(&url)
            .header("apikey", &target.anon_key)
            .bearer_auth(&target.anon_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(table = %table.name, error = %e, "Probe inconclusive");
                return ProbeOutcome::Inconclusive {
                    reason: e.to_string(),
                };
            }
        };

        if !response.status().is_success() {
            // A rejected anonymous read is exactly what a protected table
            // should produce
            debug!(table = %table.name, status = %response.status(), "Probe rejected");
            return ProbeOutcome::Secure;
        }

        let rows: Vec<Value> = match response.json().await {
            Ok(rows) => rows,
            Err(_) => return ProbeOutcome::Secure,
        };

        match rows.into_iter().next() {
            Some(row) => {
                let columns = match row.as_object() {
                    Some(obj) => obj.keys().cloned().collect(),
                    None => Vec::new(),
                };
                debug!(table = %table.name, column_count = columns.len(), "Probe returned data");
                ProbeOutcome::Exposed {
                    columns,
                    sample_row: row,
                }
            }
            None => ProbeOutcome::Secure,
        }
    }
}

/// Runs `f` over `items` in groups of `group_size`, joining each whole group
/// before the next one starts. Results come back in input order.
pub(crate) async fn run_in_groups<T, R, F, Fut>(items: Vec<T>, group_size: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let group_size = group_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut iter = items.into_iter();

    loop {
        let group: Vec<T> = iter.by_ref().take(group_size).collect();
        if group.is_empty() {
            break;
        }
        results.extend(join_all(group.into_iter().map(&f)).await);
    }

    results
}
