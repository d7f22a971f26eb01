//! Authenticated REST client for the external scheduler API.
//!
//! Every failure path is a value: non-2xx responses become an [`ApiError`]
//! carrying the HTTP status, transport failures become an [`ApiError`] with
//! code 0. The only unrecoverable error in the subsystem is constructing a
//! client without a credential.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CRATE_NAME: &str = "cronwatch-client";

pub const DEFAULT_BASE_URL: &str = "https://api.cron-job.org";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Uniform error envelope for every external call. `code` is the HTTP status
/// for API-level failures and 0 for transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("scheduler api error (code {code}): {message}")]
pub struct ApiError {
    pub message: String,
    pub code: u16,
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 0,
        }
    }

    pub fn http(code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.code == 0
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

/// One job as the external scheduler reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalJob {
    pub job_id: i64,
    pub title: String,
    pub url: String,
    pub enabled: bool,
    #[serde(default)]
    pub schedule: ExternalSchedule,
    #[serde(default)]
    pub last_execution: Option<i64>,
    #[serde(default)]
    pub next_execution: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSchedule {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub hours: Vec<i32>,
    #[serde(default)]
    pub minutes: Vec<i32>,
    #[serde(default)]
    pub mdays: Vec<i32>,
    #[serde(default)]
    pub months: Vec<i32>,
    #[serde(default)]
    pub wdays: Vec<i32>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ExternalSchedule {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            hours: vec![-1],
            minutes: vec![-1],
            mdays: vec![-1],
            months: vec![-1],
            wdays: vec![-1],
        }
    }
}

/// One entry of a job's execution history. `identifier` is absent on some
/// older accounts; callers synthesize an identity from job + timestamp then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalHistoryEntry {
    #[serde(default)]
    pub identifier: Option<String>,
    /// Epoch seconds of the execution start.
    pub date: i64,
    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: i64,
    /// Numeric status code; 1 success, 0 failed, -1 timeout.
    pub status: i64,
    #[serde(default)]
    pub http_status: Option<i32>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Partial update pushed to the external service before the local mirror is
/// touched. Absent fields are left unchanged externally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalJobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ExternalSchedule>,
}

impl ExternalJobPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none() && self.enabled.is_none() && self.schedule.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<ExternalJob>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<ExternalHistoryEntry>,
}

/// Seam for the sync and operations layers; production code uses
/// [`SchedulerClient`], tests substitute a scripted mock.
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<ExternalJob>, ApiError>;
    async fn job_history(&self, external_id: i64) -> Result<Vec<ExternalHistoryEntry>, ApiError>;
    async fn update_job(&self, external_id: i64, patch: &ExternalJobPatch) -> Result<(), ApiError>;
    async fn delete_job(&self, external_id: i64) -> Result<(), ApiError>;
    async fn run_job(&self, external_id: i64) -> Result<(), ApiError>;
}

#[derive(Debug)]
pub struct SchedulerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SchedulerClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("scheduler API key is not configured");
        }

        let mut builder = reqwest::Client::builder().gzip(true).timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let http = builder.build().context("building reqwest client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%method, endpoint, "scheduler api request");

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| status.to_string());
            return Err(ApiError::http(status.as_u16(), message));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let response = self.send(Method::GET, endpoint, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::transport(format!("decoding {endpoint} response: {err}")))
    }
}

#[async_trait]
impl SchedulerApi for SchedulerClient {
    async fn list_jobs(&self) -> Result<Vec<ExternalJob>, ApiError> {
        let response: JobsResponse = self.get_json("/jobs").await?;
        Ok(response.jobs)
    }

    async fn job_history(&self, external_id: i64) -> Result<Vec<ExternalHistoryEntry>, ApiError> {
        let response: HistoryResponse = self.get_json(&format!("/jobs/{external_id}/history")).await?;
        Ok(response.history)
    }

    async fn update_job(&self, external_id: i64, patch: &ExternalJobPatch) -> Result<(), ApiError> {
        let body = serde_json::json!({ "job": patch });
        self.send(Method::PATCH, &format!("/jobs/{external_id}"), Some(body))
            .await?;
        Ok(())
    }

    async fn delete_job(&self, external_id: i64) -> Result<(), ApiError> {
        self.send(Method::DELETE, &format!("/jobs/{external_id}"), None)
            .await?;
        Ok(())
    }

    async fn run_job(&self, external_id: i64) -> Result<(), ApiError> {
        self.send(Method::PATCH, &format!("/jobs/{external_id}/run"), None)
            .await?;
        Ok(())
    }
}
