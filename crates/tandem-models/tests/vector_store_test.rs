//! Integration tests for the vector store half of the OpenAI client.

use mockito::{Matcher, Server};
use serde_json::json;
use std::fs;
use std::time::Duration;
use tandem_abstraction::{ChunkingPolicy, DocumentIndexService, IndexId, IndexReference, ServiceError};
use tandem_models::OpenAIAssistantsClient;
use tempfile::TempDir;

fn fast_client(server: &Server) -> OpenAIAssistantsClient {
    OpenAIAssistantsClient::with_base_url("test-key", server.url()).with_batch_polling(
        Duration::from_millis(1),
        Duration::from_millis(5),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_create_index_sends_static_chunking() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/vector_stores")
        .match_body(Matcher::PartialJson(json!({
            "name": "cosmology",
            "chunking_strategy": {
                "type": "static",
                "static": { "max_chunk_size_tokens": 400, "chunk_overlap_tokens": 200 }
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"vs_1","name":"cosmology","file_counts":{"completed":0,"failed":0}}"#)
        .create_async()
        .await;

    let index =
        fast_client(&server).create_index("cosmology", &ChunkingPolicy::default()).await.unwrap();

    assert_eq!(index.id, IndexId::new("vs_1"));
    assert_eq!(index.name.as_deref(), Some("cosmology"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_upload_files_batches_and_polls() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("planck.txt");
    let second = dir.path().join("notes.md");
    fs::write(&first, "H0 = 67.4").unwrap();
    fs::write(&second, "# Distances").unwrap();

    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/files")
        .match_body(Matcher::Regex(r#"name="purpose""#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"file-1","object":"file"}"#)
        .expect(2)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/vector_stores/vs_1/file_batches")
        .match_body(Matcher::PartialJson(json!({ "file_ids": ["file-1", "file-1"] })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"vsfb_1","status":"in_progress","file_counts":{"completed":0,"failed":0}}"#)
        .create_async()
        .await;
    let poll = server
        .mock("GET", "/vector_stores/vs_1/file_batches/vsfb_1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"vsfb_1","status":"completed","file_counts":{"completed":2,"failed":0}}"#)
        .create_async()
        .await;

    let summary = fast_client(&server)
        .upload_files(&IndexReference::new("vs_1"), &[first, second])
        .await
        .unwrap();

    assert_eq!(summary.batch_id, "vsfb_1");
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    upload.assert_async().await;
    batch.assert_async().await;
    poll.assert_async().await;
}

#[tokio::test]
async fn test_failed_batch_is_an_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("data.csv");
    fs::write(&file, "z,d\n0.1,432").unwrap();

    let mut server = Server::new_async().await;
    let _upload = server
        .mock("POST", "/files")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"file-1"}"#)
        .create_async()
        .await;
    let _batch = server
        .mock("POST", "/vector_stores/vs_1/file_batches")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"vsfb_1","status":"failed"}"#)
        .create_async()
        .await;

    let result = fast_client(&server).upload_files(&IndexReference::new("vs_1"), &[file]).await;
    assert!(matches!(result, Err(ServiceError::Other(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_accepts_non_utf8_file_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join(OsStr::from_bytes(b"hubble\xff.txt"));
    fs::write(&file, "H0 = 70").unwrap();

    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/files")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"file-1"}"#)
        .create_async()
        .await;
    let _batch = server
        .mock("POST", "/vector_stores/vs_1/file_batches")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"vsfb_1","status":"completed","file_counts":{"completed":1,"failed":0}}"#)
        .create_async()
        .await;

    let summary =
        fast_client(&server).upload_files(&IndexReference::new("vs_1"), &[file]).await.unwrap();

    assert_eq!(summary.completed, 1);
    upload.assert_async().await;
}

#[tokio::test]
async fn test_upload_nothing_makes_no_requests() {
    let server = Server::new_async().await;
    let summary = fast_client(&server).upload_files(&IndexReference::new("vs_1"), &[]).await.unwrap();
    assert_eq!(summary.completed, 0);
}

#[tokio::test]
async fn test_delete_missing_index_is_ok() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/vector_stores/vs_gone")
        .with_status(404)
        .with_body(r#"{"error":{"message":"No vector store found"}}"#)
        .create_async()
        .await;

    fast_client(&server).delete_index(&IndexId::new("vs_gone")).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_indexes() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/vector_stores")
        .match_query(Matcher::UrlEncoded("limit".to_string(), "100".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [
                    { "id": "vs_1", "name": "cosmology", "file_counts": { "completed": 4, "failed": 0 } },
                    { "id": "vs_2", "name": null }
                ],
                "has_more": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let indexes = fast_client(&server).list_indexes().await.unwrap();

    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[0].file_count, 4);
    assert_eq!(indexes[1].name, None);
}
