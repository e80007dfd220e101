use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::PortalConfig;
use crate::error::AppError;
use crate::models::{Request, RequestStatus};

/// A remote table holding a mirror of the request collection, keyed by id.
#[rocket::async_trait]
pub trait RemoteTable: Send + Sync {
    async fn select_ids(&self) -> Result<HashSet<String>, AppError>;

    async fn insert(&self, record: &Request) -> Result<(), AppError>;

    async fn sample(&self, limit: usize) -> Result<Vec<Value>, AppError>;

    /// Shortened credential shown on the status page.
    fn key_hint(&self) -> String;
}

/// PostgREST endpoint of a Supabase project.
pub struct SupabaseTable {
    client: Client,
    base_url: String,
    key: String,
    table: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

/// The columns of the remote table. Extra local fields stay local.
#[derive(Serialize)]
struct RemoteRow<'a> {
    id: &'a str,
    school_id: &'a str,
    category: &'a str,
    material: &'a str,
    quantity: u32,
    date: &'a str,
    ps_number: &'a str,
    status: RequestStatus,
}

impl<'a> From<&'a Request> for RemoteRow<'a> {
    fn from(request: &'a Request) -> Self {
        Self {
            id: &request.id,
            school_id: &request.school_id,
            category: &request.category,
            material: &request.material,
            quantity: request.quantity,
            date: &request.date,
            ps_number: &request.ps_number,
            status: request.status,
        }
    }
}

impl SupabaseTable {
    pub fn new(base_url: &str, key: &str, table: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            table: table.to_string(),
        })
    }

    pub fn from_config(config: &PortalConfig) -> Result<Option<Self>, AppError> {
        match config.remote_credentials() {
            Some((url, key)) => Ok(Some(Self::new(
                url,
                key,
                &config.remote_table,
                Duration::from_secs(config.remote_timeout_secs),
            )?)),
            None => Ok(None),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

#[rocket::async_trait]
impl RemoteTable for SupabaseTable {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn select_ids(&self) -> Result<HashSet<String>, AppError> {
        let rows: Vec<IdRow> = self
            .authorized(self.client.get(self.table_url()))
            .query(&[("select", "id")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    #[instrument(skip(self, record), fields(table = %self.table, request_id = %record.id))]
    async fn insert(&self, record: &Request) -> Result<(), AppError> {
        self.authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(&RemoteRow::from(record))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn sample(&self, limit: usize) -> Result<Vec<Value>, AppError> {
        let rows = self
            .authorized(self.client.get(self.table_url()))
            .query(&[("select", "*".to_string()), ("limit", limit.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rows)
    }

    fn key_hint(&self) -> String {
        key_hint(&self.key)
    }
}

pub fn key_hint(key: &str) -> String {
    if key.is_empty() {
        return "(missing)".to_string();
    }
    let prefix: String = key.chars().take(10).collect();
    format!("{}...", prefix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Skipped,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub inserted: usize,
    pub already_present: usize,
    pub message: String,
}

impl SyncReport {
    fn skipped(message: &str) -> Self {
        warn!("{}", message);
        Self {
            status: SyncStatus::Skipped,
            inserted: 0,
            already_present: 0,
            message: message.to_string(),
        }
    }
}

/// Pushes every local request the remote table does not have yet, one insert
/// per record. Running it again after a full sync inserts nothing.
///
/// A failing insert stops the loop; rows inserted before it stay in place.
#[instrument(skip_all, fields(local = local.len()))]
pub async fn sync_to_cloud(
    remote: Option<&dyn RemoteTable>,
    local: &[Request],
) -> Result<SyncReport, AppError> {
    let Some(remote) = remote else {
        return Ok(SyncReport::skipped("Remote store is not configured"));
    };

    if local.is_empty() {
        return Ok(SyncReport::skipped("No local requests to sync"));
    }

    let remote_ids = remote.select_ids().await?;
    let missing: Vec<&Request> = local
        .iter()
        .filter(|request| !remote_ids.contains(&request.id))
        .collect();
    let already_present = local.len() - missing.len();

    let mut inserted = 0;
    for request in missing {
        if let Err(err) = remote.insert(request).await {
            return Err(AppError::ExternalService(format!(
                "Sync stopped at request {} after {} inserts: {}",
                request.id, inserted, err
            )));
        }
        inserted += 1;
    }

    info!(inserted, already_present, "Sync completed");
    Ok(SyncReport {
        status: SyncStatus::Completed,
        inserted,
        already_present,
        message: format!("Inserted {} request(s) into the remote store", inserted),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProbe {
    pub configured: bool,
    pub reachable: bool,
    pub key_hint: Option<String>,
    pub sample: Vec<Value>,
    pub error: Option<String>,
}

/// Connection check: can the remote table be read, and what is in it.
#[instrument(skip_all)]
pub async fn probe(remote: Option<&dyn RemoteTable>) -> RemoteProbe {
    let Some(remote) = remote else {
        return RemoteProbe {
            configured: false,
            reachable: false,
            key_hint: None,
            sample: Vec::new(),
            error: None,
        };
    };

    match remote.sample(5).await {
        Ok(sample) => RemoteProbe {
            configured: true,
            reachable: true,
            key_hint: Some(remote.key_hint()),
            sample,
            error: None,
        },
        Err(err) => {
            warn!(error = %err, "Remote store probe failed");
            RemoteProbe {
                configured: true,
                reachable: false,
                key_hint: Some(remote.key_hint()),
                sample: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    }
}

/// Managed handle to the optional remote table.
#[derive(Clone, Default)]
pub struct RemoteMirror(pub Option<Arc<dyn RemoteTable>>);

impl RemoteMirror {
    pub fn table(&self) -> Option<&dyn RemoteTable> {
        self.0.as_deref()
    }
}
