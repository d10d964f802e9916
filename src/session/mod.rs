//! Upload sessions
//!
//! An [`UploadSessionManager`] takes a batch of host file ids, runs one
//! [`UploadCoordinator`] per file concurrently and reports each file's
//! outcome back to the host. Files fail independently: one file's error
//! never cancels its siblings.
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::config::ClientConfig;
//! use resumable_uploadr::session::{LocalHost, PendingFile, UploadSessionManager};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let host = Arc::new(LocalHost::new());
//! let id = host.add_file(
//!     PendingFile::new("f1", "notes.txt", Bytes::from("hello"))
//!         .with_meta("projectId", "12")
//!         .with_meta("destinationPath", "/docs/notes.txt"),
//! );
//!
//! let mut config = ClientConfig::default();
//! config.api_key = Some("my-api-key".to_string());
//! let manager = Arc::new(UploadSessionManager::from_config(&config, host.clone())?);
//! manager.install(host.as_ref());
//!
//! let outcome = manager.upload(vec![id]).await;
//! assert!(!outcome.has_failures());
//! # Ok(())
//! # }
//! ```

mod host;
mod local;

pub use host::{
    PendingFile, UploadEvent, UploadHost, Uploader, UploaderRegistry, META_DESTINATION_PATH,
    META_PROJECT_ID,
};
pub use local::{EventListener, LocalHost};

use crate::client::{ApiKeyProvider, ResumableApi, ResumableClient, ResumableClientConfig, UploadStatus};
use crate::config::ClientConfig;
use crate::metrics;
use crate::upload::progress::AggregateProgress;
use crate::upload::{
    ChunkSplitter, FileId, FinalizeResult, SessionState, UploadCoordinator, UploadError,
    UploadProgress,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Settled outcome of one upload invocation
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub results: Vec<(FileId, Result<FinalizeResult, UploadError>)>,
    /// Last progress snapshot of every file that got as far as uploading
    pub progress: HashMap<FileId, UploadProgress>,
}

impl SessionOutcome {
    fn empty(session_id: String) -> Self {
        Self {
            session_id,
            results: Vec::new(),
            progress: HashMap::new(),
        }
    }

    /// Final progress of one file
    pub fn progress(&self, file_id: &str) -> Option<&UploadProgress> {
        self.progress.get(file_id)
    }

    /// Totals over the session's final progress snapshots
    pub fn aggregate_progress(&self) -> AggregateProgress {
        AggregateProgress::of(self.progress.values())
    }

    /// Whether at least one file failed
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|(_, r)| r.is_err())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&FileId, &FinalizeResult)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().ok().map(|ok| (id, ok)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&FileId, &UploadError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|err| (id, err)))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Outcome of one file, if it was part of this session
    pub fn get(&self, file_id: &str) -> Option<&Result<FinalizeResult, UploadError>> {
        self.results
            .iter()
            .find(|(id, _)| id == file_id)
            .map(|(_, r)| r)
    }
}

/// Runs upload sessions against a host
///
/// Every [`upload`](Self::upload) call gets its own [`SessionState`]; the
/// manager only keeps it while the session is running.
pub struct UploadSessionManager {
    id: String,
    host: Arc<dyn UploadHost>,
    api: Arc<dyn ResumableApi>,
    chunk_size: u64,
    sessions: DashMap<String, Arc<SessionState>>,
}

/// Drops a session's state from the manager when the session ends
struct LiveSession<'a> {
    sessions: &'a DashMap<String, Arc<SessionState>>,
    session_id: &'a str,
}

impl Drop for LiveSession<'_> {
    fn drop(&mut self) {
        self.sessions.remove(self.session_id);
    }
}

impl UploadSessionManager {
    /// Create a manager; fails on a zero chunk size
    pub fn new(
        id: impl Into<String>,
        host: Arc<dyn UploadHost>,
        api: Arc<dyn ResumableApi>,
        chunk_size: u64,
    ) -> Result<Self, UploadError> {
        ChunkSplitter::new(chunk_size)?;

        Ok(Self {
            id: id.into(),
            host,
            api,
            chunk_size,
            sessions: DashMap::new(),
        })
    }

    /// Create a manager talking HTTP to the configured server
    pub fn from_config(config: &ClientConfig, host: Arc<dyn UploadHost>) -> Result<Self, UploadError> {
        let api_key = ApiKeyProvider::resolve(config.api_key.as_deref())
            .map_err(|e| UploadError::Configuration(e.to_string()))?;

        let client = ResumableClient::new(ResumableClientConfig {
            server_url: config.server_url.clone(),
            api_key,
            timeout: config.timeout_seconds.map(Duration::from_secs),
        })?;

        Self::new(config.id.clone(), host, Arc::new(client), config.chunk_size)
    }

    /// Register with the host's uploader list
    ///
    /// The registry does not keep the manager alive; the caller's `Arc` does.
    pub fn install(self: &Arc<Self>, registry: &dyn UploaderRegistry) {
        registry.register_uploader(self.clone());
        tracing::debug!(uploader = %self.id, "Uploader installed");
    }

    /// Remove from the host's uploader list
    pub fn uninstall(&self, registry: &dyn UploaderRegistry) {
        registry.unregister_uploader(&self.id);
        tracing::debug!(uploader = %self.id, "Uploader uninstalled");
    }

    /// Progress of a file that is uploading in a running session
    pub fn progress(&self, file_id: &str) -> Option<UploadProgress> {
        self.sessions
            .iter()
            .find_map(|session| session.value().get(file_id))
    }

    /// Totals over every file still uploading in a running session
    pub fn aggregate_progress(&self) -> AggregateProgress {
        let snapshots: Vec<UploadProgress> = self
            .sessions
            .iter()
            .flat_map(|session| session.value().snapshot())
            .collect();
        AggregateProgress::of(&snapshots)
    }

    /// Number of sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Ask the server how far an upload has got
    pub async fn check_upload_status(&self, server_file_id: &str) -> Result<UploadStatus, UploadError> {
        let result = self.api.status(server_file_id).await;
        if let Err(e) = &result {
            metrics::record_error(e.kind());
        }
        result
    }

    /// Upload a batch of files, resolving once every file has settled
    #[tracing::instrument(
        name = "session.upload",
        skip(self, file_ids),
        fields(
            uploader = %self.id,
            session.id = tracing::field::Empty,
            session.files = file_ids.len()
        )
    )]
    pub async fn upload(&self, file_ids: Vec<FileId>) -> SessionOutcome {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("session.id", session_id.as_str());

        if file_ids.is_empty() {
            return SessionOutcome::empty(session_id);
        }

        // A file is uploaded once per session, however often it is listed
        let mut seen = HashSet::with_capacity(file_ids.len());
        let file_ids: Vec<FileId> = file_ids
            .into_iter()
            .filter(|id| {
                let first = seen.insert(id.clone());
                if !first {
                    tracing::warn!(file_id = %id, "Duplicate file id in batch ignored");
                }
                first
            })
            .collect();

        let state = Arc::new(SessionState::new());
        self.sessions.insert(session_id.clone(), state.clone());
        let _live = LiveSession {
            sessions: &self.sessions,
            session_id: &session_id,
        };

        let uploads = file_ids.into_iter().map(|file_id| {
            let state = state.clone();
            async move {
                let result = self.upload_one(&file_id, state.clone()).await;
                // Retire the file as soon as it settles
                let progress = state.remove(&file_id);
                (file_id, result, progress)
            }
        });
        let settled = futures::future::join_all(uploads).await;

        let mut results = Vec::with_capacity(settled.len());
        let mut progress = HashMap::new();
        for (file_id, result, snapshot) in settled {
            if let Some(snapshot) = snapshot {
                progress.insert(file_id.clone(), snapshot);
            }
            results.push((file_id, result));
        }

        let outcome = SessionOutcome {
            session_id: session_id.clone(),
            results,
            progress,
        };

        tracing::info!(
            succeeded = outcome.succeeded().count(),
            failed = outcome.failed().count(),
            "Upload session settled"
        );

        outcome
    }

    async fn upload_one(
        &self,
        file_id: &str,
        state: Arc<SessionState>,
    ) -> Result<FinalizeResult, UploadError> {
        let Some(file) = self.host.get_file(file_id) else {
            let error = UploadError::Validation(format!("Unknown file '{}'", file_id));
            self.host.emit(UploadEvent::Error {
                file_id: file_id.to_string(),
                error: error.clone(),
            });
            return Err(error);
        };

        self.host.emit(UploadEvent::Started {
            file_id: file_id.to_string(),
        });

        let result = match self.coordinator(state) {
            Ok(coordinator) => coordinator.upload_file(&file.to_request()).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(finalized) => self.host.emit(UploadEvent::Success {
                file_id: file_id.to_string(),
                result: finalized.clone(),
            }),
            Err(error) => self.host.emit(UploadEvent::Error {
                file_id: file_id.to_string(),
                error: error.clone(),
            }),
        }

        result
    }

    fn coordinator(&self, state: Arc<SessionState>) -> Result<UploadCoordinator, UploadError> {
        let host = self.host.clone();

        Ok(UploadCoordinator::new(self.api.clone(), self.chunk_size)?
            .with_state(state)
            .with_progress_callback(Arc::new(move |file_id: &str, progress: &UploadProgress| {
                host.emit(UploadEvent::Progress {
                    file_id: file_id.to_string(),
                    progress: progress.clone(),
                });
            })))
    }
}

#[async_trait]
impl Uploader for UploadSessionManager {
    fn id(&self) -> &str {
        &self.id
    }

    async fn upload(&self, file_ids: Vec<FileId>) -> SessionOutcome {
        UploadSessionManager::upload(self, file_ids).await
    }
}
