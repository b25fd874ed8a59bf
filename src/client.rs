//! Commvault API client.
//!
//! This module provides a client for the Commvault web console REST API:
//! a one-shot login that yields an `Authtoken`, plus the two read calls the
//! exporter polls (VM status list and V4 disk storage list).
//!
//! Response records are deliberately partial: every field is optional and kept
//! as a raw JSON value, because the API returns numbers and strings
//! interchangeably and omits fields freely. Defaults are applied later, when
//! the records are rendered into metrics.

use crate::config::CommvaultConfig;
use crate::error::{CommvaultError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

const LOGIN_PATH: &str = "webconsole/api/Login";
const VM_PATH: &str = "webconsole/api/VM";
const DISK_STORAGE_PATH: &str = "webconsole/api/V4/Storage/Disk";

/// Header carrying the session token on authenticated calls.
const AUTH_HEADER: &str = "Authtoken";

/// First record and page size requested from the VM list.
const VM_PAGING: &str = "0,10000";
/// Ascending sort on the VM list's second column.
const VM_SORTING: &str = "asc:2";

/// Session lifetime (minutes) requested at login.
const LOGIN_TIMEOUT_MINUTES: u32 = 30;

/// Commvault API client.
#[derive(Clone)]
pub struct CommvaultClient {
    client: Client,
    config: CommvaultConfig,
    token: Option<String>,
}

impl CommvaultClient {
    /// Create a new Commvault API client. No request is made until
    /// [`CommvaultClient::login`] is called.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use commvault_exporter::client::CommvaultClient;
    /// use commvault_exporter::config::CommvaultConfig;
    ///
    /// let config = CommvaultConfig {
    ///     base_url: "https://commvault.example.com/".to_string(),
    ///     username: "api".to_string(),
    ///     password: "secret".to_string(),
    ///     verify_tls: false,
    ///     timeout_seconds: 15,
    ///     poll_interval_seconds: 30,
    /// };
    /// let client = CommvaultClient::new(config).unwrap();
    /// ```
    pub fn new(config: CommvaultConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            config,
            token: None,
        })
    }

    pub fn config(&self) -> &CommvaultConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Authenticate against the web console and keep the returned token.
    ///
    /// There is no refresh: the token is held for the life of the client.
    /// Every failure mode (transport, status, body, missing token) is returned
    /// as an error and the caller is expected to treat it as fatal.
    pub async fn login(&mut self) -> Result<()> {
        let url = self.config.api_url(LOGIN_PATH);
        debug!("Authenticating against: {}", url);

        let request = LoginRequest {
            username: &self.config.username,
            password: &self.config.password,
            timeout: LOGIN_TIMEOUT_MINUTES,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(CommvaultError::Auth(format!(
                "login at {} returned {}",
                url, status
            )));
        }

        let body = response.text().await?;
        let login: LoginResponse = serde_json::from_str(&body).map_err(|e| {
            CommvaultError::Auth(format!("login response from {} is not JSON: {}", url, e))
        })?;

        match login.token.filter(|token| !token.trim().is_empty()) {
            Some(token) => {
                self.token = Some(token);
                info!("Commvault token acquired from {}", self.config.base_url);
                Ok(())
            }
            None => Err(CommvaultError::Auth(format!(
                "login response from {} carries no token",
                url
            ))),
        }
    }

    /// Get the VM status list (first 10000 records, ascending).
    pub async fn get_vm_status(&self) -> Result<VmStatusResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("paginginfo", HeaderValue::from_static(VM_PAGING));
        headers.insert("sortinginfo", HeaderValue::from_static(VM_SORTING));

        self.get_json(VM_PATH, headers, "VM status").await
    }

    /// Get the V4 disk storage pool list.
    pub async fn get_disk_storage(&self) -> Result<DiskStorageResponse> {
        self.get_json(DISK_STORAGE_PATH, HeaderMap::new(), "disk storage")
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        headers: HeaderMap,
        what: &str,
    ) -> Result<T> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| CommvaultError::Auth("client is not logged in".to_string()))?;

        let url = self.config.api_url(path);
        debug!("Fetching {} from: {}", what, url);

        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, token)
            .headers(headers)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Failed to get {}: {}", what, response.status());
        }
        let response = response.error_for_status()?;

        let body = response.text().await?;
        debug!("Raw {} response: {} bytes", what, body.len());

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            CommvaultError::ParseError(format!(
                "Failed to parse {}: {}. Body preview: {}...",
                what, e, preview
            ))
        })
    }
}

/// Login request body.
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    timeout: u32,
}

/// Login response body.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// VM status list response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmStatusResponse {
    /// Per-VM records
    #[serde(default)]
    pub vm_status_info_list: Option<Vec<VmRecord>>,
    /// Total number of VMs known to the server (may exceed the page size)
    #[serde(default)]
    pub total_records: Option<Value>,
}

impl VmStatusResponse {
    pub fn records(&self) -> &[VmRecord] {
        self.vm_status_info_list.as_deref().unwrap_or_default()
    }

    /// Reported total, or 0 when the server did not send a usable number.
    pub fn total_records(&self) -> u64 {
        self.total_records
            .as_ref()
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(0)
    }
}

/// A single VM as reported by the VM status list. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRecord {
    pub name: Option<Value>,
    pub vm_status: Option<Value>,
    pub sla_status: Option<Value>,
    pub subclient_name: Option<Value>,
    #[serde(rename = "strGUID")]
    pub str_guid: Option<Value>,
    /// Object carrying `planName`
    pub plan: Option<Value>,
    /// Object carrying `status`
    pub last_backup_job_info: Option<Value>,
    /// Completion time of the last backup (Unix epoch seconds)
    pub bkp_end_time: Option<Value>,
    pub vm_size: Option<Value>,
    pub vm_used_space: Option<Value>,
}

/// Disk storage list response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskStorageResponse {
    /// Storage pools; the API returns a bare object when there is only one
    #[serde(default)]
    pub disk_storage: Option<OneOrMany<DiskStorageRecord>>,
}

impl DiskStorageResponse {
    pub fn pools(&self) -> &[DiskStorageRecord] {
        self.disk_storage
            .as_ref()
            .map(OneOrMany::as_slice)
            .unwrap_or_default()
    }
}

/// A value that may be sent either on its own or as a list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => std::slice::from_ref(item),
        }
    }
}

/// A single disk storage pool. Capacity and free space are in the API's own units.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskStorageRecord {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub storage_pool_type: Option<Value>,
    pub status: Option<Value>,
    pub capacity: Option<Value>,
    pub free_space: Option<Value>,
}
