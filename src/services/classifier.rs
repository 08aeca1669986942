//! Boundary contract for the external breed-classification service, plus the
//! production HTTP implementation.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::models::payload::ImagePayload;
use crate::models::record::RawClassification;

/// Opaque reference to a job the remote service is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

/// One observation from the remote service.
#[derive(Debug, Clone)]
pub enum PollUpdate {
    Progress { percent: f64 },
    Finished(RawClassification),
    Failed { code: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier service unreachable: {0}")]
    Unavailable(String),

    #[error("malformed classifier reply: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        ClassifierError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Malformed(err.to_string())
    }
}

/// Pluggable classifier boundary. The job controller only sees this trait, so
/// the remote backend can be swapped without touching the state machine.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Hand an image to the service. Fails with
    /// [`ClassifierError::Unavailable`] when the service cannot be reached.
    async fn submit(&self, payload: &ImagePayload) -> Result<JobHandle, ClassifierError>;

    /// Fetch the latest progress/terminal observation for a job.
    async fn poll(&self, handle: &JobHandle) -> Result<PollUpdate, ClassifierError>;

    /// Best-effort remote cancellation. Never fails observably.
    async fn cancel(&self, handle: &JobHandle);

    /// Reachability probe for health checks.
    async fn health_check(&self) -> Result<(), ClassifierError>;
}

/// HTTP client for the classification service.
pub struct HttpClassifier {
    http: Client,
    base_url: String,
    api_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
enum PollResponse {
    Done {
        result: RawClassification,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        error_code: String,
        message: String,
    },
    Progress {
        percent: f64,
    },
}

impl HttpClassifier {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn submit(&self, payload: &ImagePayload) -> Result<JobHandle, ClassifierError> {
        let url = format!("{}/v1/classifications", self.base_url);
        let body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(payload.bytes()),
            "mimeType": payload.mime().to_string(),
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: SubmitResponse = response.json().await?;
        Ok(JobHandle(parsed.job_id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollUpdate, ClassifierError> {
        let url = format!("{}/v1/classifications/{}", self.base_url, handle.0);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let parsed: PollResponse = serde_json::from_str(&body)?;

        Ok(match parsed {
            PollResponse::Progress { percent } => PollUpdate::Progress { percent },
            PollResponse::Done { result } => PollUpdate::Finished(result),
            PollResponse::Failed {
                error_code,
                message,
            } => PollUpdate::Failed {
                code: error_code,
                message,
            },
        })
    }

    async fn cancel(&self, handle: &JobHandle) {
        let url = format!("{}/v1/classifications/{}/cancel", self.base_url, handle.0);
        if let Err(e) = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
        {
            // Best-effort: the local state machine is already terminal.
            tracing::debug!(handle = %handle.0, error = %e, "remote cancel request failed");
        }
    }

    async fn health_check(&self) -> Result<(), ClassifierError> {
        let url = format!("{}/health", self.base_url);
        self.http.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}
