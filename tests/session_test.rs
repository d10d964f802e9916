//! Upload Session Tests
//!
//! Multi-file sessions against a mock server: failure isolation, event
//! ordering and aggregate progress.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use resumable_uploadr::client::{ApiKey, ResumableClient, ResumableClientConfig};
    use resumable_uploadr::session::{
        LocalHost, PendingFile, UploadEvent, UploadSessionManager, META_DESTINATION_PATH,
        META_PROJECT_ID,
    };
    use resumable_uploadr::UploadError;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_manager(server_url: String, host: Arc<LocalHost>) -> Arc<UploadSessionManager> {
        let client = ResumableClient::new(ResumableClientConfig {
            server_url,
            api_key: ApiKey::new("test-api-key"),
            timeout: None,
        })
        .unwrap();
        Arc::new(UploadSessionManager::new("ResumableUpload", host, Arc::new(client), 100).unwrap())
    }

    fn pending(id: &str, destination: &str, len: usize) -> PendingFile {
        PendingFile::new(id, destination.trim_start_matches('/'), Bytes::from(vec![7u8; len]))
            .with_meta(META_PROJECT_ID, "12")
            .with_meta(META_DESTINATION_PATH, destination)
    }

    // ========================================================================
    // TEST: Failure isolation
    // ========================================================================

    #[tokio::test]
    async fn test_failed_file_does_not_abort_sibling() {
        let mock_server = MockServer::start().await;

        // File A's chunk 2 is rejected
        Mock::given(method("POST"))
            .and(path("/resumable-upload/upload"))
            .and(query_param("destination_path", "/a.bin"))
            .and(query_param("chunk_index", "2"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/upload"))
            .and(query_param("destination_path", "/a.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file_id": 1})))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/upload"))
            .and(query_param("destination_path", "/b.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file_id": 2, "file_uuid": "uuid-b"})))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/finalize"))
            .and(query_param("file_id", "2"))
            .and(query_param("total_chunks", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file_id": 2,
                "file_uuid": "uuid-b",
                "file_size": 250,
                "chunks": 3,
                "finalized": true
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let host = Arc::new(LocalHost::new());
        let a = host.add_file(pending("A", "/a.bin", 450));
        let b = host.add_file(pending("B", "/b.bin", 250));

        let manager = create_manager(mock_server.uri(), host.clone());
        let outcome = manager.upload(vec![a, b]).await;

        assert_eq!(outcome.len(), 2);
        assert!(outcome.has_failures());
        assert_eq!(
            outcome.get("A"),
            Some(&Err(UploadError::ChunkUpload {
                status: 500,
                chunk_index: 2
            }))
        );

        let finalized = outcome.get("B").unwrap().as_ref().unwrap();
        assert_eq!(finalized.file_id, "2");
        assert_eq!(finalized.file_uuid.as_deref(), Some("uuid-b"));
        assert_eq!(finalized.file_size(), Some(250));

        assert_eq!(
            host.lifecycle_events("A"),
            vec!["upload-started", "upload-error"]
        );
        assert_eq!(
            host.lifecycle_events("B"),
            vec!["upload-started", "upload-success"]
        );

        assert!(!outcome.progress("A").unwrap().upload_complete);
        assert!(outcome.progress("B").unwrap().upload_complete);
        assert!(manager.progress("B").is_none());
    }

    // ========================================================================
    // TEST: Events and progress
    // ========================================================================

    #[tokio::test]
    async fn test_progress_events_are_monotonic() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file_id": 11})))
            .expect(5)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/finalize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"finalized": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let host = Arc::new(LocalHost::new());
        let id = host.add_file(pending("C", "/c.bin", 500));

        let manager = create_manager(mock_server.uri(), host.clone());
        let outcome = manager.upload(vec![id]).await;
        assert!(!outcome.has_failures());

        let percentages: Vec<u8> = host
            .events()
            .iter()
            .filter_map(|event| match event {
                UploadEvent::Progress { progress, .. } => Some(progress.percentage),
                _ => None,
            })
            .collect();

        assert!(!percentages.is_empty());
        assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percentages.last(), Some(&100));

        let aggregate = outcome.aggregate_progress();
        assert_eq!(aggregate.files, 1);
        assert_eq!(aggregate.files_complete, 1);
        assert_eq!(aggregate.bytes_uploaded, 500);
        assert_eq!(manager.aggregate_progress().files, 0);
    }

    #[tokio::test]
    async fn test_repeated_file_id_uploaded_once() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file_id": 21})))
            .expect(4)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/resumable-upload/finalize"))
            .and(query_param("file_id", "21"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"finalized": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let host = Arc::new(LocalHost::new());
        let id = host.add_file(pending("E", "/e.bin", 400));

        let manager = create_manager(mock_server.uri(), host.clone());
        let outcome = manager.upload(vec![id.clone(), id]).await;

        assert_eq!(outcome.len(), 1);
        assert!(!outcome.has_failures());

        let counts: Vec<usize> = host
            .events()
            .iter()
            .filter_map(|event| match event {
                UploadEvent::Progress { progress, .. } => Some(progress.completed_count()),
                _ => None,
            })
            .collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(counts.last(), Some(&4));
    }

    #[tokio::test]
    async fn test_missing_metadata_fails_before_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let host = Arc::new(LocalHost::new());
        let id = host.add_file(PendingFile::new("D", "d.bin", Bytes::from_static(b"data")));

        let manager = create_manager(mock_server.uri(), host.clone());
        let outcome = manager.upload(vec![id]).await;

        assert!(matches!(
            outcome.get("D"),
            Some(Err(UploadError::Validation(_)))
        ));
        assert_eq!(
            host.lifecycle_events("D"),
            vec!["upload-started", "upload-error"]
        );
    }

    // ========================================================================
    // TEST: Status
    // ========================================================================

    #[tokio::test]
    async fn test_check_upload_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/resumable-upload/status"))
            .and(query_param("file_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file_id": 42,
                "file_uuid": "uuid-42",
                "file_size": 2048,
                "exists": true,
                "has_chunks": false,
                "chunk_count": 0
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let manager = create_manager(mock_server.uri(), Arc::new(LocalHost::new()));
        let status = manager.check_upload_status("42").await.unwrap();

        assert!(status.exists);
        assert_eq!(status.file_size, 2048);
        assert_eq!(status.file_uuid.as_deref(), Some("uuid-42"));
    }
}
