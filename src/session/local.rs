//! In-process host
//!
//! Keeps pending files in memory and records every event it receives. Used
//! by the command-line tool and by tests.

use super::host::{PendingFile, UploadEvent, UploadHost, Uploader, UploaderRegistry};
use crate::upload::FileId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Callback receiving each event as it is emitted
pub type EventListener = Box<dyn Fn(&UploadEvent) + Send + Sync>;

/// Host backed by in-memory tables
///
/// Registered uploaders are held weakly: an uploader that is dropped simply
/// disappears from the registry.
#[derive(Default)]
pub struct LocalHost {
    files: DashMap<FileId, PendingFile>,
    events: Mutex<Vec<UploadEvent>>,
    listeners: Mutex<Vec<EventListener>>,
    uploaders: Mutex<Vec<Weak<dyn Uploader>>>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file, returning its id
    pub fn add_file(&self, file: PendingFile) -> FileId {
        let id = file.id.clone();
        self.files.insert(id.clone(), file);
        id
    }

    pub fn remove_file(&self, file_id: &str) -> Option<PendingFile> {
        self.files.remove(file_id).map(|(_, f)| f)
    }

    pub fn on_event(&self, listener: EventListener) {
        self.listeners.lock().push(listener);
    }

    /// Every event emitted so far, in order
    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().clone()
    }

    /// Events for one file, excluding progress updates
    pub fn lifecycle_events(&self, file_id: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.file_id() == file_id && !matches!(e, UploadEvent::Progress { .. }))
            .map(UploadEvent::name)
            .collect()
    }

    pub fn uploader_ids(&self) -> Vec<String> {
        self.uploaders
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|u| u.id().to_string())
            .collect()
    }

    /// Hand a batch of files to the first live registered uploader
    pub async fn upload(&self, file_ids: Vec<FileId>) -> Option<super::SessionOutcome> {
        let uploader = self.uploaders.lock().iter().find_map(Weak::upgrade)?;
        Some(uploader.upload(file_ids).await)
    }
}

impl UploadHost for LocalHost {
    fn get_file(&self, file_id: &str) -> Option<PendingFile> {
        self.files.get(file_id).map(|f| f.value().clone())
    }

    fn emit(&self, event: UploadEvent) {
        for listener in self.listeners.lock().iter() {
            listener(&event);
        }
        self.events.lock().push(event);
    }
}

impl UploaderRegistry for LocalHost {
    fn register_uploader(&self, uploader: Arc<dyn Uploader>) {
        let mut uploaders = self.uploaders.lock();
        uploaders.retain(|u| u.upgrade().is_some_and(|u| u.id() != uploader.id()));
        uploaders.push(Arc::downgrade(&uploader));
    }

    fn unregister_uploader(&self, uploader_id: &str) {
        self.uploaders
            .lock()
            .retain(|u| u.upgrade().is_some_and(|u| u.id() != uploader_id));
    }
}
