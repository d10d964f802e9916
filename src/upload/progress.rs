//! Upload progress tracking
//!
//! Each file's [`UploadProgress`] lives in a [`SessionState`] created for
//! one upload session and shared with the coordinators it runs. Chunk
//! completions are applied as a single read-modify-write under the map entry
//! lock, so two chunk responses arriving together cannot lose an update.

use super::{FileId, UploadError};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::collections::HashSet;

/// Progress of a single file upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub upload_started: bool,
    pub upload_complete: bool,
    pub chunks_completed: HashSet<u32>,
    pub total_chunks: u32,
    pub percentage: u8,
    pub bytes_uploaded: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    /// Fresh progress for a file that is about to upload
    pub fn started(total_chunks: u32, bytes_total: u64) -> Self {
        Self {
            upload_started: true,
            total_chunks,
            bytes_total,
            ..Default::default()
        }
    }

    /// Record a completed chunk and recompute the derived fields
    ///
    /// Returns `false` if the chunk was already recorded.
    pub fn record_chunk(&mut self, index: u32, chunk_size: u64) -> bool {
        if !self.chunks_completed.insert(index) {
            return false;
        }

        let done = self.chunks_completed.len() as u64;
        self.percentage = if self.total_chunks == 0 {
            0
        } else {
            (done as f64 / self.total_chunks as f64 * 100.0).round() as u8
        };
        // The last chunk may be short
        self.bytes_uploaded = (done * chunk_size).min(self.bytes_total);
        true
    }

    /// Terminal state after a successful finalize
    pub fn complete(&mut self) {
        self.upload_complete = true;
        self.upload_started = true;
        self.percentage = 100;
        self.bytes_uploaded = self.bytes_total;
    }

    pub fn completed_count(&self) -> usize {
        self.chunks_completed.len()
    }
}

/// Aggregate progress over every file in a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateProgress {
    pub files: usize,
    pub files_complete: usize,
    pub bytes_uploaded: u64,
    pub bytes_total: u64,
    pub percentage: u8,
}

impl AggregateProgress {
    /// Sum a set of per-file snapshots
    pub fn of<'a>(files: impl IntoIterator<Item = &'a UploadProgress>) -> Self {
        let mut agg = Self::default();
        for progress in files {
            agg.include(progress);
        }
        agg.finish()
    }

    fn include(&mut self, progress: &UploadProgress) {
        self.files += 1;
        if progress.upload_complete {
            self.files_complete += 1;
        }
        self.bytes_uploaded += progress.bytes_uploaded;
        self.bytes_total += progress.bytes_total;
    }

    fn finish(mut self) -> Self {
        self.percentage = if self.bytes_total == 0 {
            if self.files > 0 && self.files == self.files_complete {
                100
            } else {
                0
            }
        } else {
            (self.bytes_uploaded as f64 / self.bytes_total as f64 * 100.0).round() as u8
        };
        self
    }
}

/// Per-session upload state
///
/// A file may have at most one upload in flight per state; a second
/// [`begin`](Self::begin) for it fails until the first is settled.
#[derive(Debug, Default)]
pub struct SessionState {
    progress: DashMap<FileId, UploadProgress>,
    active: DashSet<FileId>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a file, resetting any progress left by an earlier run
    pub fn begin(
        &self,
        file_id: &str,
        total_chunks: u32,
        bytes_total: u64,
    ) -> Result<UploadProgress, UploadError> {
        if !self.active.insert(file_id.to_string()) {
            return Err(UploadError::Validation(format!(
                "File '{}' is already being uploaded",
                file_id
            )));
        }

        let progress = UploadProgress::started(total_chunks, bytes_total);
        self.progress.insert(file_id.to_string(), progress.clone());
        Ok(progress)
    }

    /// Mark a file's upload as no longer in flight; its progress is kept
    pub fn settle(&self, file_id: &str) {
        self.active.remove(file_id);
    }

    pub fn is_active(&self, file_id: &str) -> bool {
        self.active.contains(file_id)
    }

    /// Atomically record a completed chunk, returning the updated snapshot
    pub fn record_chunk(&self, file_id: &str, index: u32, chunk_size: u64) -> Option<UploadProgress> {
        let mut entry = self.progress.get_mut(file_id)?;
        entry.record_chunk(index, chunk_size);
        Some(entry.value().clone())
    }

    /// Mark a file as fully uploaded and finalized
    pub fn complete(&self, file_id: &str) -> Option<UploadProgress> {
        let mut entry = self.progress.get_mut(file_id)?;
        entry.complete();
        Some(entry.value().clone())
    }

    pub fn get(&self, file_id: &str) -> Option<UploadProgress> {
        self.progress.get(file_id).map(|p| p.value().clone())
    }

    /// Stop tracking a file, returning its last snapshot
    pub fn remove(&self, file_id: &str) -> Option<UploadProgress> {
        self.active.remove(file_id);
        self.progress.remove(file_id).map(|(_, p)| p)
    }

    pub fn is_empty(&self) -> bool {
        self.progress.is_empty()
    }

    /// Copies of every tracked file's progress
    pub fn snapshot(&self) -> Vec<UploadProgress> {
        self.progress.iter().map(|p| p.value().clone()).collect()
    }

    pub fn aggregate(&self) -> AggregateProgress {
        let mut agg = AggregateProgress::default();
        for entry in self.progress.iter() {
            agg.include(entry.value());
        }
        agg.finish()
    }
}
