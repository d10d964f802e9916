//! Upload module
//!
//! Splits files into chunks, drives the concurrent chunk uploads for a single
//! file and finalizes the assembled file on the server.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod chunk;
pub mod coordinator;
pub mod progress;

pub use chunk::{ChunkDescriptor, ChunkSplitter};
pub use coordinator::UploadCoordinator;
pub use progress::{SessionState, UploadProgress};

/// Default chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Opaque, host-assigned file identifier
pub type FileId = String;

/// Upload errors
///
/// Errors are `Clone` so the same value can be handed to the host's error
/// notification and returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upload failed with status {status} (chunk {chunk_index})")]
    ChunkUpload { status: u16, chunk_index: u32 },

    #[error("Finalize failed with status {status}")]
    Finalize { status: u16 },

    #[error("Status check failed with status {status}")]
    StatusCheck { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// HTTP status code carried by the error, if it came from a server response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ChunkUpload { status, .. }
            | Self::Finalize { status }
            | Self::StatusCheck { status } => Some(*status),
            _ => None,
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::ChunkUpload { .. } => "chunk_upload",
            Self::Finalize { .. } => "finalize",
            Self::StatusCheck { .. } => "status_check",
            Self::Transport(_) => "transport",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// A single file to upload
///
/// Built once per file when its upload starts and discarded when the
/// coordinator settles.
#[derive(Debug, Clone)]
pub struct FileUploadRequest {
    pub file_id: FileId,
    pub name: String,
    pub payload: Bytes,
    pub size: u64,
    pub project_id: String,
    pub destination_path: String,
}

impl FileUploadRequest {
    /// Check required metadata before any network call is made
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.project_id.trim().is_empty() || self.destination_path.trim().is_empty() {
            return Err(UploadError::Validation(
                "Project ID and destination path are required".into(),
            ));
        }

        if self.payload.len() as u64 != self.size {
            return Err(UploadError::Validation(format!(
                "File '{}' declares {} bytes but payload holds {}",
                self.name,
                self.size,
                self.payload.len()
            )));
        }

        Ok(())
    }
}

/// Result of a completed file upload
///
/// The server's finalize metadata merged with the identifiers captured from
/// chunk 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeResult {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "fileUuid")]
    pub file_uuid: Option<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl FinalizeResult {
    /// Whether the server reported the file as assembled
    pub fn finalized(&self) -> bool {
        self.metadata
            .get("finalized")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Assembled size reported by the server
    pub fn file_size(&self) -> Option<u64> {
        self.metadata
            .get("file_size")
            .and_then(serde_json::Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(project_id: &str, destination_path: &str) -> FileUploadRequest {
        FileUploadRequest {
            file_id: "f1".into(),
            name: "data.bin".into(),
            payload: Bytes::from_static(b"hello"),
            size: 5,
            project_id: project_id.into(),
            destination_path: destination_path.into(),
        }
    }

    #[test]
    fn test_validate_requires_metadata() {
        assert!(request("12", "/data/data.bin").validate().is_ok());
        assert!(matches!(
            request("", "/data/data.bin").validate(),
            Err(UploadError::Validation(_))
        ));
        assert!(matches!(
            request("12", "  ").validate(),
            Err(UploadError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_size_mismatch() {
        let mut req = request("12", "/data/data.bin");
        req.size = 10;
        assert!(matches!(req.validate(), Err(UploadError::Validation(_))));
    }

    #[test]
    fn test_status_code() {
        let err = UploadError::ChunkUpload {
            status: 500,
            chunk_index: 2,
        };
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.to_string(), "Upload failed with status 500 (chunk 2)");
        assert_eq!(UploadError::Transport("reset".into()).status_code(), None);
    }

    #[test]
    fn test_finalize_result_serializes_flat() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("finalized".into(), serde_json::Value::Bool(true));
        metadata.insert("file_size".into(), serde_json::json!(2048));

        let result = FinalizeResult {
            file_id: "42".into(),
            file_uuid: Some("uuid-42".into()),
            metadata,
        };

        assert!(result.finalized());
        assert_eq!(result.file_size(), Some(2048));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["fileId"], "42");
        assert_eq!(value["fileUuid"], "uuid-42");
        assert_eq!(value["finalized"], true);
    }
}
