//! Resumable upload API client
//!
//! HTTP client for the chunked upload endpoints.
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::client::{ApiKey, ResumableApi, ResumableClient, ResumableClientConfig};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ResumableClientConfig {
//!     server_url: "http://localhost:1352".to_string(),
//!     api_key: ApiKey::new("my-api-key"),
//!     timeout: None,
//! };
//!
//! let client = ResumableClient::new(config)?;
//!
//! let chunk = Bytes::from("Hello, World!");
//! let result = client
//!     .upload_chunk("hello.txt", chunk, 0, 1, "12", "/docs/hello.txt")
//!     .await?;
//! let finalized = client.finalize(result.file_id.as_deref().unwrap_or_default(), 1).await?;
//! println!("Finalized: {:?}", finalized);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | Upload chunk | `resumable.upload_chunk` | project, destination, chunk_index, total_chunks, bytes, file_id, status_code |
//! | Finalize | `resumable.finalize` | file_id, total_chunks, status_code |
//! | Status | `resumable.status` | file_id, status_code |

mod credentials;

pub use credentials::{ApiKey, ApiKeyProvider, CredentialsError, API_KEY_ENV};

use crate::metrics;
use crate::upload::UploadError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, Instant};

/// Header carrying the API key on every request
pub const API_KEY_HEADER: &str = "apikey";

const UPLOAD_PATH: &str = "/resumable-upload/upload";
const FINALIZE_PATH: &str = "/resumable-upload/finalize";
const STATUS_PATH: &str = "/resumable-upload/status";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ResumableClientConfig {
    pub server_url: String,
    pub api_key: ApiKey,
    pub timeout: Option<Duration>,
}

/// Decode a server identifier that may be sent as a JSON number or string
fn deserialize_server_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Text(s)) => Some(s),
        Some(RawId::Int(n)) => Some(n.to_string()),
        Some(RawId::Uint(n)) => Some(n.to_string()),
        None => None,
    })
}

/// Response to a chunk upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChunkUploadResult {
    #[serde(default, deserialize_with = "deserialize_server_id")]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_server_id")]
    pub file_uuid: Option<String>,
    #[serde(default)]
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub total_chunks: Option<u32>,
    #[serde(default)]
    pub bytes_written: Option<u64>,
}

/// Response to a status query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    #[serde(default, deserialize_with = "deserialize_server_id")]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_server_id")]
    pub file_uuid: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub has_chunks: bool,
    #[serde(default)]
    pub chunk_count: u32,
}

/// Server-side resumable upload API
///
/// Implemented by [`ResumableClient`] over HTTP. No call is retried here;
/// retry policy belongs to the caller.
#[async_trait]
pub trait ResumableApi: Send + Sync {
    /// Upload one chunk of a file
    #[allow(clippy::too_many_arguments)]
    async fn upload_chunk(
        &self,
        file_name: &str,
        chunk: Bytes,
        chunk_index: u32,
        total_chunks: u32,
        project_id: &str,
        destination_path: &str,
    ) -> Result<ChunkUploadResult, UploadError>;

    /// Assemble all uploaded chunks into the final file
    async fn finalize(
        &self,
        file_id: &str,
        total_chunks: u32,
    ) -> Result<serde_json::Map<String, serde_json::Value>, UploadError>;

    /// Query the server-side state of an upload
    async fn status(&self, file_id: &str) -> Result<UploadStatus, UploadError>;
}

/// HTTP client for the resumable upload API
pub struct ResumableClient {
    config: ResumableClientConfig,
    http_client: reqwest::Client,
}

impl ResumableClient {
    /// Create a new client
    pub fn new(config: ResumableClientConfig) -> Result<Self, UploadError> {
        if !config.server_url.starts_with("http://") && !config.server_url.starts_with("https://") {
            return Err(UploadError::Configuration(format!(
                "server URL must start with http:// or https://, got: {}",
                config.server_url
            )));
        }

        if reqwest::header::HeaderValue::from_str(config.api_key.expose()).is_err() {
            return Err(UploadError::Configuration(
                "API key is not a valid header value".into(),
            ));
        }

        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http_client = builder
            .build()
            .map_err(|e| UploadError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the server base URL
    pub fn server_url(&self) -> &str {
        self.config.server_url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UploadError> {
        response
            .json::<T>()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))
    }
}

/// Map a failed send; a request that could not even be built is a setup problem
fn transport_error(err: reqwest::Error) -> UploadError {
    if err.is_builder() {
        return UploadError::Configuration(err.to_string());
    }
    UploadError::Transport(err.to_string())
}

#[async_trait]
impl ResumableApi for ResumableClient {
    #[tracing::instrument(
        name = "resumable.upload_chunk",
        skip(self, chunk),
        fields(
            http.method = "POST",
            upload.project = %project_id,
            upload.destination = %destination_path,
            upload.chunk_index = chunk_index,
            upload.total_chunks = total_chunks,
            upload.bytes = chunk.len(),
            upload.file_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn upload_chunk(
        &self,
        file_name: &str,
        chunk: Bytes,
        chunk_index: u32,
        total_chunks: u32,
        project_id: &str,
        destination_path: &str,
    ) -> Result<ChunkUploadResult, UploadError> {
        let bytes = chunk.len() as u64;
        let start_time = Instant::now();

        let response = self
            .http_client
            .post(self.endpoint(UPLOAD_PATH))
            .query(&[
                ("project_id", project_id.to_string()),
                ("destination_path", destination_path.to_string()),
                ("chunk_index", chunk_index.to_string()),
                ("total_chunks", total_chunks.to_string()),
            ])
            .header(API_KEY_HEADER, self.config.api_key.expose())
            .body(chunk)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("http.status_code", status.as_u16());

        if !status.is_success() {
            metrics::record_chunk_failure();
            return Err(UploadError::ChunkUpload {
                status: status.as_u16(),
                chunk_index,
            });
        }

        let result: ChunkUploadResult = Self::decode(response).await?;
        if let Some(file_id) = &result.file_id {
            span.record("upload.file_id", file_id.as_str());
        }

        metrics::record_chunk_success(bytes, start_time.elapsed().as_secs_f64());

        tracing::debug!(
            file = %file_name,
            chunk_index = chunk_index,
            bytes = bytes,
            "Chunk uploaded"
        );

        Ok(result)
    }

    #[tracing::instrument(
        name = "resumable.finalize",
        skip(self),
        fields(
            http.method = "POST",
            upload.file_id = %file_id,
            upload.total_chunks = total_chunks,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn finalize(
        &self,
        file_id: &str,
        total_chunks: u32,
    ) -> Result<serde_json::Map<String, serde_json::Value>, UploadError> {
        let start_time = Instant::now();

        let response = self
            .http_client
            .post(self.endpoint(FINALIZE_PATH))
            .query(&[
                ("file_id", file_id.to_string()),
                ("total_chunks", total_chunks.to_string()),
            ])
            .header(API_KEY_HEADER, self.config.api_key.expose())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        metrics::record_finalize_duration(start_time.elapsed().as_secs_f64());

        if !status.is_success() {
            return Err(UploadError::Finalize {
                status: status.as_u16(),
            });
        }

        let metadata = Self::decode(response).await?;

        tracing::info!(file_id = %file_id, total_chunks = total_chunks, "Upload finalized");

        Ok(metadata)
    }

    #[tracing::instrument(
        name = "resumable.status",
        skip(self),
        fields(
            http.method = "GET",
            upload.file_id = %file_id,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn status(&self, file_id: &str) -> Result<UploadStatus, UploadError> {
        let response = self
            .http_client
            .get(self.endpoint(STATUS_PATH))
            .query(&[("file_id", file_id)])
            .header(API_KEY_HEADER, self.config.api_key.expose())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::StatusCheck {
                status: status.as_u16(),
            });
        }

        Self::decode(response).await
    }
}
