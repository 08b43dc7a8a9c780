//! Box status values and the remote status store contract

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::debug;

/// Lifecycle status of a box, as written to the status store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Launching,
    Bootstrapping,
    Bootstrapped,
    Running,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Launching => "launching",
            Status::Bootstrapping => "bootstrapping",
            Status::Bootstrapped => "bootstrapped",
            Status::Running => "running",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote store holding per-box address, credential and status
///
/// Keyed by the box's catalog identifier.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn update_ip(&self, cat_id: &str, ip: &str) -> Result<()>;

    async fn update_credential(&self, cat_id: &str, credential: &str) -> Result<()>;

    async fn update_status(&self, cat_id: &str, status: Status) -> Result<()>;

    /// Current status, None when nothing was recorded yet
    async fn get_status(&self, cat_id: &str) -> Result<Option<Status>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxRecord {
    pub ip: Option<String>,
    pub credential: Option<String>,
    pub status: Option<Status>,
}

/// In-memory status store for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<String, BoxRecord>>,
    history: RwLock<Vec<(String, Status)>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, cat_id: &str) -> Option<BoxRecord> {
        self.records.read().ok()?.get(cat_id).cloned()
    }

    /// Every status write in order, as (cat_id, status)
    pub fn history(&self) -> Vec<(String, Status)> {
        self.history
            .read()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn update<F>(&self, cat_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut BoxRecord),
    {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::StatusStore("record lock poisoned".to_string()))?;
        f(records.entry(cat_id.to_string()).or_default());
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn update_ip(&self, cat_id: &str, ip: &str) -> Result<()> {
        self.update(cat_id, |r| r.ip = Some(ip.to_string()))
    }

    async fn update_credential(&self, cat_id: &str, credential: &str) -> Result<()> {
        self.update(cat_id, |r| r.credential = Some(credential.to_string()))
    }

    async fn update_status(&self, cat_id: &str, status: Status) -> Result<()> {
        self.update(cat_id, |r| r.status = Some(status))?;
        if let Ok(mut history) = self.history.write() {
            history.push((cat_id.to_string(), status));
        }
        Ok(())
    }

    async fn get_status(&self, cat_id: &str) -> Result<Option<Status>> {
        Ok(self.record(cat_id).and_then(|r| r.status))
    }
}

const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: Option<Status>,
}

/// Status store backed by the API server
///
/// Writes are `POST {api}/boxes/{cat_id}/{ip|sshkey|status}` with a JSON
/// body, reads are `GET {api}/boxes/{cat_id}/status`.
#[derive(Debug, Clone)]
pub struct HttpStatusStore {
    client: Client,
    api_url: String,
}

impl HttpStatusStore {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build with a client that gives up on unresponsive servers
    pub fn connect(api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self::new(client, api_url))
    }

    /// `{api}/boxes/{cat_id}/{field}` with `cat_id` escaped as one segment
    fn box_url(&self, cat_id: &str, field: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| Error::StatusStore(format!("invalid api url '{}': {}", self.api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::StatusStore(format!("api url '{}' cannot hold a path", self.api_url)))?
            .pop_if_empty()
            .extend(["boxes", cat_id, field]);
        Ok(url)
    }

    async fn post(&self, cat_id: &str, field: &str, body: serde_json::Value) -> Result<()> {
        let url = self.box_url(cat_id, field)?;
        debug!(url = %url, "Updating status store");

        let response = self.client.post(url.clone()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::StatusStore(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusStore for HttpStatusStore {
    async fn update_ip(&self, cat_id: &str, ip: &str) -> Result<()> {
        self.post(cat_id, "ip", serde_json::json!({ "ip": ip })).await
    }

    async fn update_credential(&self, cat_id: &str, credential: &str) -> Result<()> {
        self.post(cat_id, "sshkey", serde_json::json!({ "sshkey": credential }))
            .await
    }

    async fn update_status(&self, cat_id: &str, status: Status) -> Result<()> {
        self.post(cat_id, "status", serde_json::json!({ "status": status }))
            .await
    }

    async fn get_status(&self, cat_id: &str) -> Result<Option<Status>> {
        let url = self.box_url(cat_id, "status")?;
        let response = self.client.get(url.clone()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::StatusStore(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let body: StatusBody = response.json().await?;
        Ok(body.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Status::Bootstrapped).unwrap(),
            "\"bootstrapped\""
        );
        assert_eq!(Status::Running.to_string(), "running");
    }

    #[tokio::test]
    async fn test_memory_store_records_updates() {
        let store = MemoryStatusStore::new();

        assert_eq!(store.get_status("cat-1").await.unwrap(), None);

        store.update_ip("cat-1", "10.0.0.5").await.unwrap();
        store.update_credential("cat-1", "ssh-ed25519 AAAA").await.unwrap();
        store.update_status("cat-1", Status::Bootstrapped).await.unwrap();
        store.update_status("cat-1", Status::Running).await.unwrap();

        let record = store.record("cat-1").unwrap();
        assert_eq!(record.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.credential.as_deref(), Some("ssh-ed25519 AAAA"));
        assert_eq!(store.get_status("cat-1").await.unwrap(), Some(Status::Running));
        assert_eq!(
            store.history(),
            vec![
                ("cat-1".to_string(), Status::Bootstrapped),
                ("cat-1".to_string(), Status::Running),
            ]
        );
    }

    #[test]
    fn test_http_store_urls() {
        let store = HttpStatusStore::new(Client::new(), "http://api.local:9000/v2/");
        assert_eq!(
            store.box_url("cat-1", "sshkey").unwrap().as_str(),
            "http://api.local:9000/v2/boxes/cat-1/sshkey"
        );

        let bare = HttpStatusStore::new(Client::new(), "http://api.local:9000");
        assert_eq!(
            bare.box_url("cat-1", "ip").unwrap().as_str(),
            "http://api.local:9000/boxes/cat-1/ip"
        );
    }

    #[test]
    fn test_http_store_escapes_cat_id() {
        let store = HttpStatusStore::new(Client::new(), "http://api.local:9000/v2");
        let url = store.box_url("a/b?c#d", "status").unwrap();

        assert_eq!(url.as_str(), "http://api.local:9000/v2/boxes/a%2Fb%3Fc%23d/status");
        assert_eq!(url.path_segments().unwrap().count(), 4);
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_http_store_rejects_bad_api_url() {
        let store = HttpStatusStore::new(Client::new(), "not a url");
        assert!(matches!(store.box_url("cat-1", "ip"), Err(Error::StatusStore(_))));
    }
}
