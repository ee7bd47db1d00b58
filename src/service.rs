//! The remote document service and its HTTP implementation.
//!
//! [`DocumentService`] is the seam between the workflow and the network:
//! coordinators only ever call the trait, so tests and alternative transports
//! plug in without touching the state machines. [`HttpDocumentService`] is
//! the plain reqwest client for the document backend:
//!
//! | call | request | response |
//! |------|---------|----------|
//! | upload | `POST /upload`, multipart field `file` | [`ProcessedFields`] JSON |
//! | submit | `POST /review`, JSON payload | `{ "filename", "download_url"? }` |
//! | fetch | `GET /download/{filename}` | document bytes |
//! | latest review | `GET /review` | [`ProcessedFields`] JSON |

use crate::config::ClientConfig;
use crate::error::{Operation, TransportError, WorkflowError};
use crate::model::{GeneratedArtifactRef, ProcessedFields, RawUploadFile, ValidatedReviewPayload};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Longest error body kept in a [`TransportError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Calls the workflow makes against the remote service.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Upload a PDF and receive the fields extracted from it.
    async fn upload(&self, file: &RawUploadFile) -> Result<ProcessedFields, TransportError>;

    /// Generate the output document from reviewed data.
    async fn submit(
        &self,
        payload: &ValidatedReviewPayload,
    ) -> Result<GeneratedArtifactRef, TransportError>;

    /// Fetch the bytes of a generated document.
    async fn fetch(&self, filename: &str) -> Result<Vec<u8>, TransportError>;

    /// Fields of the most recently processed upload.
    async fn latest_review(&self) -> Result<ProcessedFields, TransportError>;
}

/// reqwest-backed [`DocumentService`].
#[derive(Debug, Clone)]
pub struct HttpDocumentService {
    client: Client,
    config: ClientConfig,
}

impl HttpDocumentService {
    pub fn new(config: &ClientConfig) -> Result<Self, WorkflowError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| WorkflowError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }
}

#[async_trait]
impl DocumentService for HttpDocumentService {
    async fn upload(&self, file: &RawUploadFile) -> Result<ProcessedFields, TransportError> {
        let op = Operation::Upload;
        let url = self.config.endpoint("upload");
        info!("Uploading '{}' ({} bytes) to {}", file.name, file.bytes.len(), url);

        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.media_type)
            .map_err(|e| TransportError::Network {
                operation: op,
                reason: format!("invalid media type '{}': {e}", file.media_type),
            })?;
        let form = multipart::Form::new().part("file", part);

        let secs = self.config.upload_timeout_secs;
        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(secs))
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error(e, op, secs))?;

        let response = ensure_success(response, op).await?;
        response
            .json::<ProcessedFields>()
            .await
            .map_err(|e| decode_error(e, op))
    }

    async fn submit(
        &self,
        payload: &ValidatedReviewPayload,
    ) -> Result<GeneratedArtifactRef, TransportError> {
        let op = Operation::Submit;
        let url = self.config.endpoint("review");
        info!("Submitting review for case {}", payload.numero_processo());

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout())
            .json(payload)
            .send()
            .await
            .map_err(|e| send_error(e, op, self.config.request_timeout_secs))?;

        let response = ensure_success(response, op).await?;
        let artifact = response
            .json::<GeneratedArtifactRef>()
            .await
            .map_err(|e| decode_error(e, op))?;

        if artifact.filename.trim().is_empty() {
            return Err(TransportError::Decode {
                operation: op,
                reason: "response has an empty filename".into(),
            });
        }
        debug!("Server generated '{}'", artifact.filename);
        Ok(artifact)
    }

    async fn fetch(&self, filename: &str) -> Result<Vec<u8>, TransportError> {
        let op = Operation::Fetch;
        let url = download_url(&self.config, filename)?;
        info!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| send_error(e, op, self.config.request_timeout_secs))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound {
                filename: filename.to_string(),
            });
        }
        let response = ensure_success(response, op).await?;
        let bytes = response.bytes().await.map_err(|e| TransportError::Network {
            operation: op,
            reason: e.to_string(),
        })?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn latest_review(&self) -> Result<ProcessedFields, TransportError> {
        let op = Operation::LatestReview;
        let response = self
            .client
            .get(self.config.endpoint("review"))
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| send_error(e, op, self.config.request_timeout_secs))?;

        let response = ensure_success(response, op).await?;
        response
            .json::<ProcessedFields>()
            .await
            .map_err(|e| decode_error(e, op))
    }
}

/// Build `{base}/download/{filename}` with the filename percent-encoded as a
/// single path segment.
pub fn download_url(config: &ClientConfig, filename: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::Decode {
        operation: Operation::Fetch,
        reason,
    };
    let mut url = Url::parse(&config.endpoint("download"))
        .map_err(|e| invalid(format!("invalid API URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| invalid("API URL cannot be a base".into()))?
        .push(filename);
    Ok(url)
}

async fn ensure_success(
    response: Response,
    operation: Operation,
) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        operation,
        status: status.as_u16(),
        body: truncate_body(&body),
    })
}

fn send_error(e: reqwest::Error, operation: Operation, secs: u64) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { operation, secs }
    } else {
        TransportError::Network {
            operation,
            reason: e.to_string(),
        }
    }
}

fn decode_error(e: reqwest::Error, operation: Operation) -> TransportError {
    TransportError::Decode {
        operation,
        reason: e.to_string(),
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let cut: String = body.chars().take(MAX_ERROR_BODY_CHARS - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        body.to_string()
    }
}
