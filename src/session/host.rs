//! Host collaborator interface
//!
//! The host owns file selection and presentation. It hands pending files to
//! registered uploaders and receives their notifications.

use crate::upload::{FileId, FileUploadRequest, FinalizeResult, UploadError, UploadProgress};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata key holding the target project
pub const META_PROJECT_ID: &str = "projectId";

/// Metadata key holding the destination path inside the project
pub const META_DESTINATION_PATH: &str = "destinationPath";

/// A file queued in the host
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub id: FileId,
    pub name: String,
    pub data: Bytes,
    pub size: u64,
    pub meta: HashMap<String, String>,
}

impl PendingFile {
    pub fn new(id: impl Into<FileId>, name: impl Into<String>, data: Bytes) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: data.len() as u64,
            data,
            meta: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Build the upload request; missing metadata becomes empty and is
    /// rejected when the upload validates it
    pub fn to_request(&self) -> FileUploadRequest {
        let meta = |key: &str| self.meta.get(key).cloned().unwrap_or_default();

        FileUploadRequest {
            file_id: self.id.clone(),
            name: self.name.clone(),
            payload: self.data.clone(),
            size: self.size,
            project_id: meta(META_PROJECT_ID),
            destination_path: meta(META_DESTINATION_PATH),
        }
    }
}

/// Notification sent to the host
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started {
        file_id: FileId,
    },
    Progress {
        file_id: FileId,
        progress: UploadProgress,
    },
    Success {
        file_id: FileId,
        result: FinalizeResult,
    },
    Error {
        file_id: FileId,
        error: UploadError,
    },
}

impl UploadEvent {
    /// Event name as seen by the host
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "upload-started",
            Self::Progress { .. } => "upload-progress",
            Self::Success { .. } => "upload-success",
            Self::Error { .. } => "upload-error",
        }
    }

    pub fn file_id(&self) -> &str {
        match self {
            Self::Started { file_id }
            | Self::Progress { file_id, .. }
            | Self::Success { file_id, .. }
            | Self::Error { file_id, .. } => file_id,
        }
    }
}

/// Services the host provides to an uploader
pub trait UploadHost: Send + Sync {
    /// Look up a pending file
    fn get_file(&self, file_id: &str) -> Option<PendingFile>;

    /// Deliver a notification
    fn emit(&self, event: UploadEvent);
}

/// Something the host can hand a batch of file ids to
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Identifier the uploader is registered under
    fn id(&self) -> &str;

    /// Upload the given files, resolving once every file has settled
    async fn upload(&self, file_ids: Vec<FileId>) -> super::SessionOutcome;
}

/// Host-side registry of uploaders
///
/// Implementations hold uploaders weakly. An uploader usually owns an
/// `Arc` of its host, so a strong reference here would keep both alive.
pub trait UploaderRegistry {
    fn register_uploader(&self, uploader: Arc<dyn Uploader>);

    fn unregister_uploader(&self, uploader_id: &str);
}
