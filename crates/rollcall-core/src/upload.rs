//! Recognition-service client.
//!
//! A batch of captures is posted as one JSON envelope
//! `{"images": ["data:image/jpeg;base64,...", ...]}`; the service answers with
//! `{"present": ["<student name>", ...]}`.

use crate::types::CapturedImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("network error: {0}")]
    Status(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Request body sent to the recognition service.
#[derive(Debug, Serialize)]
pub struct UploadEnvelope<'a> {
    pub images: &'a [CapturedImage],
}

/// Names the service recognized in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadResponse {
    pub present: Vec<String>,
}

/// Wire shape: `present` may be missing or null.
#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    present: Option<Vec<String>>,
}

impl UploadResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self, UploadError> {
        let raw: RawResponse = serde_json::from_slice(body)?;
        Ok(Self {
            present: raw.present.unwrap_or_default(),
        })
    }
}

/// Something that can turn a batch of captures into a recognition result.
pub trait RecognitionService: Send + Sync + 'static {
    fn submit(
        &self,
        images: Vec<CapturedImage>,
    ) -> impl Future<Output = Result<UploadResponse, UploadError>> + Send;
}

/// HTTP recognition backend.
pub struct HttpRecognitionService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRecognitionService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl RecognitionService for HttpRecognitionService {
    fn submit(
        &self,
        images: Vec<CapturedImage>,
    ) -> impl Future<Output = Result<UploadResponse, UploadError>> + Send {
        async move {
            let envelope = UploadEnvelope { images: &images };
            let bytes: usize = images.iter().map(CapturedImage::len).sum();
            tracing::info!(
                endpoint = %self.endpoint,
                images = images.len(),
                bytes,
                "uploading capture batch"
            );

            let response = self
                .client
                .post(&self.endpoint)
                .json(&envelope)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let reason = status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| status.as_str().to_string());
                return Err(UploadError::Status(reason));
            }

            let body = response.bytes().await?;
            let parsed = UploadResponse::from_slice(&body)?;
            tracing::info!(present = parsed.present.len(), "recognition response received");
            Ok(parsed)
        }
    }
}
