//! QC executor speaking a small JSON job API over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{QcError, QcExecutor, QcOutcome, QcPoll};
use crate::config::QcConfig;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    batch_id: &'a str,
    input_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    artifact_path: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote QC backend reached through `POST /jobs` and `GET /jobs/{id}`.
pub struct HttpQcExecutor {
    config: QcConfig,
    client: Client,
}

impl HttpQcExecutor {
    pub fn new(config: QcConfig) -> Result<Self, QcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QcError::Rejected(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}", self.base_url(), urlencoding::encode(job_id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }
}

fn map_send_error(e: reqwest::Error) -> QcError {
    if e.is_timeout() {
        QcError::Retryable("request timed out".to_string())
    } else if e.is_connect() {
        QcError::Retryable(format!("connection failed: {}", e))
    } else {
        QcError::Retryable(e.to_string())
    }
}

/// Overload and server faults are worth retrying; other client errors are not.
fn classify_status(status: StatusCode, body: &str) -> QcError {
    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        QcError::Retryable(message)
    } else {
        QcError::Rejected(message)
    }
}

fn parse_outcome(status: &str) -> Option<QcOutcome> {
    match status {
        "pending" | "queued" | "running" => Some(QcOutcome::Pending),
        "passed" | "pass" | "succeeded" => Some(QcOutcome::Pass),
        "failed" | "fail" => Some(QcOutcome::Fail),
        _ => None,
    }
}

#[async_trait]
impl QcExecutor for HttpQcExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, batch_id: &str, input_path: &str) -> Result<String, QcError> {
        let url = format!("{}/jobs", self.base_url());
        let body = SubmitRequest {
            batch_id,
            input_path,
            image: self.config.image.as_deref(),
        };

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(batch_id = %batch_id, status = %status, "QC submission refused");
            return Err(classify_status(status, &text));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| QcError::Retryable(format!("invalid submit response: {}", e)))?;

        debug!(batch_id = %batch_id, job_id = %parsed.job_id, "QC job submitted");
        Ok(parsed.job_id)
    }

    async fn poll_result(&self, job_id: &str) -> Result<QcPoll, QcError> {
        let response = self
            .authorize(self.client.get(self.job_url(job_id)))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| QcError::Retryable(format!("invalid job response: {}", e)))?;

        let outcome = parse_outcome(&job.status).ok_or_else(|| {
            QcError::Rejected(format!("unknown job status '{}'", job.status))
        })?;

        Ok(QcPoll {
            outcome,
            artifact_path: job.artifact_path,
            message: job.message,
        })
    }
}
