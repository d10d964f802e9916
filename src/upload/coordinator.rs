//! Single-file upload coordinator
//!
//! Drives one file through the protocol: all chunks are launched at once,
//! progress is folded in as each response arrives, and the file is finalized
//! once every chunk has succeeded.
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::client::{ApiKey, ResumableClient, ResumableClientConfig};
//! use resumable_uploadr::upload::{FileUploadRequest, UploadCoordinator, DEFAULT_CHUNK_SIZE};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ResumableClient::new(ResumableClientConfig {
//!     server_url: "http://localhost:1352".to_string(),
//!     api_key: ApiKey::new("my-api-key"),
//!     timeout: None,
//! })?;
//! let coordinator = UploadCoordinator::new(Arc::new(client), DEFAULT_CHUNK_SIZE)?;
//!
//! let payload = Bytes::from(vec![0u8; 3 * 1024 * 1024]);
//! let request = FileUploadRequest {
//!     file_id: "local-1".to_string(),
//!     name: "data.bin".to_string(),
//!     size: payload.len() as u64,
//!     payload,
//!     project_id: "12".to_string(),
//!     destination_path: "/raw/data.bin".to_string(),
//! };
//!
//! let result = coordinator.upload_file(&request).await?;
//! println!("Uploaded as file {}", result.file_id);
//! # Ok(())
//! # }
//! ```

use super::chunk::ChunkSplitter;
use super::progress::{SessionState, UploadProgress};
use super::{FileUploadRequest, FinalizeResult, UploadError};
use crate::client::ResumableApi;
use crate::metrics;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Callback invoked with a file's id and its progress after every change
pub type ProgressCallback = Arc<dyn Fn(&str, &UploadProgress) + Send + Sync>;

/// Identifiers assigned by the server, taken from chunk 0's response
#[derive(Debug, Clone, Default)]
struct ServerIds {
    file_id: Option<String>,
    file_uuid: Option<String>,
}

/// Settles a file in its state when the upload ends, however it ends
struct ActiveUpload<'a> {
    state: &'a SessionState,
    file_id: &'a str,
}

impl Drop for ActiveUpload<'_> {
    fn drop(&mut self) {
        self.state.settle(self.file_id);
    }
}

/// Uploads a single file chunk by chunk
pub struct UploadCoordinator {
    api: Arc<dyn ResumableApi>,
    splitter: ChunkSplitter,
    state: Arc<SessionState>,
    on_progress: Option<ProgressCallback>,
}

impl UploadCoordinator {
    /// Create a coordinator with its own progress state
    pub fn new(api: Arc<dyn ResumableApi>, chunk_size: u64) -> Result<Self, UploadError> {
        Ok(Self {
            api,
            splitter: ChunkSplitter::new(chunk_size)?,
            state: Arc::new(SessionState::new()),
            on_progress: None,
        })
    }

    /// Record progress into a session-owned state instead of a private one
    pub fn with_state(mut self, state: Arc<SessionState>) -> Self {
        self.state = state;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn chunk_size(&self) -> u64 {
        self.splitter.chunk_size()
    }

    /// Current progress of a file handled by this coordinator
    pub fn progress(&self, file_id: &str) -> Option<UploadProgress> {
        self.state.get(file_id)
    }

    fn notify(&self, file_id: &str, progress: &UploadProgress) {
        if let Some(callback) = &self.on_progress {
            callback(file_id, progress);
        }
    }

    /// Upload every chunk of `request` and finalize the file
    ///
    /// Fails with the first chunk error; chunks already accepted by the
    /// server are left in place. A second upload of the same file id while
    /// the first is running fails with `Validation`.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, request),
        fields(
            file.id = %request.file_id,
            file.name = %request.name,
            upload.bytes = request.size,
            upload.chunk_size = self.splitter.chunk_size()
        ),
        err
    )]
    pub async fn upload_file(
        &self,
        request: &FileUploadRequest,
    ) -> Result<FinalizeResult, UploadError> {
        let start_time = Instant::now();
        let result = self.run(request).await;
        let elapsed = start_time.elapsed();

        match &result {
            Ok(finalized) => {
                metrics::record_file_success(
                    self.splitter.total_chunks(request.size).unwrap_or_default(),
                    elapsed.as_secs_f64(),
                );
                tracing::info!(
                    server_file_id = %finalized.file_id,
                    duration_ms = elapsed.as_millis(),
                    "File upload completed"
                );
            }
            Err(e) => {
                // The one place a failed file is counted by error kind
                metrics::record_file_failure(elapsed.as_secs_f64());
                metrics::record_error(e.kind());
                tracing::error!(
                    error = %e,
                    status = ?e.status_code(),
                    destination = %request.destination_path,
                    duration_ms = elapsed.as_millis(),
                    "File upload failed"
                );
            }
        }

        result
    }

    async fn run(&self, request: &FileUploadRequest) -> Result<FinalizeResult, UploadError> {
        request.validate()?;

        let chunk_size = self.splitter.chunk_size();
        let total_chunks = self.splitter.total_chunks(request.size)?;
        let file_id = request.file_id.as_str();

        let progress = self.state.begin(file_id, total_chunks, request.size)?;
        let _active = ActiveUpload {
            state: self.state.as_ref(),
            file_id,
        };
        self.notify(file_id, &progress);

        // Written once, by chunk 0's response only
        let ids: OnceLock<ServerIds> = OnceLock::new();

        let mut pending: FuturesUnordered<_> = self
            .splitter
            .split(request.size)?
            .map(|chunk| {
                let ids = &ids;
                let payload = request
                    .payload
                    .slice(chunk.start as usize..chunk.end as usize);

                async move {
                    let response = self
                        .api
                        .upload_chunk(
                            &request.name,
                            payload,
                            chunk.index,
                            chunk.total_chunks,
                            &request.project_id,
                            &request.destination_path,
                        )
                        .await?;

                    if chunk.index == 0 {
                        let _ = ids.set(ServerIds {
                            file_id: response.file_id.clone(),
                            file_uuid: response.file_uuid.clone(),
                        });
                    }

                    if let Some(progress) = self.state.record_chunk(file_id, chunk.index, chunk_size)
                    {
                        self.notify(file_id, &progress);
                    }

                    Ok::<_, UploadError>(chunk.index)
                }
            })
            .collect();

        while let Some(result) = pending.next().await {
            let index = result?;
            tracing::trace!(chunk_index = index, "Chunk accepted");
        }
        drop(pending);

        // Only read after every chunk, chunk 0 included, has settled
        let ids = ids.into_inner().unwrap_or_default();
        let server_file_id = ids.file_id.ok_or_else(|| {
            UploadError::InvalidResponse("chunk 0 response carried no file_id".into())
        })?;

        let metadata = self.api.finalize(&server_file_id, total_chunks).await?;

        if let Some(progress) = self.state.complete(file_id) {
            self.notify(file_id, &progress);
        }

        Ok(FinalizeResult {
            file_id: server_file_id,
            file_uuid: ids.file_uuid,
            metadata,
        })
    }
}
