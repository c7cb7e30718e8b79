//! OpenAI vector store implementation.
//!
//! This module implements `DocumentIndexService` on top of the vector store
//! and file APIs: files are uploaded individually, attached to the store as a
//! single file batch, and the batch is polled until indexing settles.

use crate::openai::{HasId, IdOnly, OpenAIAssistantsClient};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tandem_abstraction::{
    ChunkingPolicy, DocumentIndexService, IndexId, IndexReference, ServiceError, UploadSummary,
};
use tracing::{debug, warn};

/// Vector store as returned by the API.
#[derive(Debug, Deserialize)]
struct WireVectorStore {
    id: String,
    name: Option<String>,
    #[serde(default)]
    file_counts: WireFileCounts,
}

impl HasId for WireVectorStore {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<WireVectorStore> for IndexReference {
    fn from(store: WireVectorStore) -> Self {
        Self { id: IndexId::new(store.id), name: store.name, file_count: store.file_counts.completed }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireFileCounts {
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    failed: u64,
}

/// Batch state as returned by the file batch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BatchState {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Deserialize)]
struct WireFileBatch {
    id: String,
    status: BatchState,
    #[serde(default)]
    file_counts: WireFileCounts,
}

impl OpenAIAssistantsClient {
    /// Uploads one file with `purpose=assistants` and returns its file id.
    async fn upload_file(&self, file_path: &Path) -> Result<String, ServiceError> {
        debug!(path = %file_path.display(), "Uploading file");

        let invalid = |reason: String| ServiceError::InvalidFile {
            path: file_path.display().to_string(),
            reason,
        };

        let file_bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| invalid(format!("Failed to read file: {}", e)))?;

        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| invalid("Invalid filename".to_string()))?;

        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(file_bytes).file_name(file_name));

        let uploaded: IdOnly =
            self.send_json(self.request(Method::POST, "/files").multipart(form), "file upload").await?;

        debug!(path = %file_path.display(), file_id = %uploaded.id, "File uploaded");
        Ok(uploaded.id)
    }

    async fn get_file_batch(
        &self,
        index: &IndexId,
        batch_id: &str,
    ) -> Result<WireFileBatch, ServiceError> {
        self.send_json(
            self.request(
                Method::GET,
                &format!("/vector_stores/{}/file_batches/{}", index, batch_id),
            ),
            "retrieve file batch",
        )
        .await
    }

    /// Polls a file batch until it leaves `in_progress`.
    ///
    /// Uses exponential backoff from `batch_poll_initial`, capped at
    /// `batch_poll_max`, and gives up after `batch_timeout`.
    async fn poll_batch(
        &self,
        index: &IndexId,
        mut batch: WireFileBatch,
    ) -> Result<WireFileBatch, ServiceError> {
        let start_time = Instant::now();
        let mut delay = self.batch_poll_initial;

        while batch.status == BatchState::InProgress {
            if start_time.elapsed() > self.batch_timeout {
                return Err(ServiceError::Timeout(format!(
                    "file batch {} still in progress after {:?}",
                    batch.id, self.batch_timeout
                )));
            }

            debug!(
                batch_id = %batch.id,
                elapsed = ?start_time.elapsed(),
                "File batch still processing, waiting..."
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.batch_poll_max);

            batch = self.get_file_batch(index, &batch.id).await?;
        }

        Ok(batch)
    }
}

#[async_trait]
impl DocumentIndexService for OpenAIAssistantsClient {
    async fn create_index(
        &self,
        name: &str,
        chunking: &ChunkingPolicy,
    ) -> Result<IndexReference, ServiceError> {
        debug!(
            name,
            max_chunk_size_tokens = chunking.max_chunk_size_tokens,
            chunk_overlap_tokens = chunking.chunk_overlap_tokens,
            "Creating vector store"
        );

        let body = json!({
            "name": name,
            "chunking_strategy": {
                "type": "static",
                "static": {
                    "max_chunk_size_tokens": chunking.max_chunk_size_tokens,
                    "chunk_overlap_tokens": chunking.chunk_overlap_tokens,
                }
            }
        });

        let store: WireVectorStore = self
            .send_json(self.request(Method::POST, "/vector_stores").json(&body), "create vector store")
            .await?;
        Ok(store.into())
    }

    async fn upload_files(
        &self,
        index: &IndexReference,
        files: &[PathBuf],
    ) -> Result<UploadSummary, ServiceError> {
        if files.is_empty() {
            return Ok(UploadSummary { batch_id: String::new(), completed: 0, failed: 0 });
        }

        let mut file_ids = Vec::with_capacity(files.len());
        for path in files {
            file_ids.push(self.upload_file(path).await?);
        }

        let batch: WireFileBatch = self
            .send_json(
                self.request(Method::POST, &format!("/vector_stores/{}/file_batches", index.id))
                    .json(&json!({ "file_ids": file_ids })),
                "create file batch",
            )
            .await?;

        let batch = self.poll_batch(&index.id, batch).await?;
        match batch.status {
            BatchState::Completed => {
                if batch.file_counts.failed > 0 {
                    warn!(
                        batch_id = %batch.id,
                        failed = batch.file_counts.failed,
                        "Some files could not be indexed"
                    );
                }
                Ok(UploadSummary {
                    batch_id: batch.id,
                    completed: batch.file_counts.completed,
                    failed: batch.file_counts.failed,
                })
            }
            state => Err(ServiceError::Other(format!(
                "file batch {} ended as {:?}",
                batch.id, state
            ))),
        }
    }

    async fn delete_index(&self, index: &IndexId) -> Result<(), ServiceError> {
        debug!(index_id = %index, "Deleting vector store");

        let result: Result<Value, ServiceError> = self
            .send_json(
                self.request(Method::DELETE, &format!("/vector_stores/{}", index)),
                "delete vector store",
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // Already gone
            Err(ServiceError::NotFound(_)) => {
                debug!(index_id = %index, "Vector store not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_indexes(&self) -> Result<Vec<IndexReference>, ServiceError> {
        let stores: Vec<WireVectorStore> =
            self.list_all("/vector_stores", &[], "list vector stores").await?;
        Ok(stores.into_iter().map(IndexReference::from).collect())
    }
}
