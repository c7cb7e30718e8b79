//! Document index provisioning.
//!
//! Builds the shared search index both agents consult: every visible file
//! under a data directory is uploaded into one freshly created index.

use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tandem_abstraction::{ChunkingPolicy, DocumentIndexService, IndexId, IndexReference};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Default name for indexes created by the provisioner.
pub const DEFAULT_INDEX_NAME: &str = "tandem_store";

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().as_encoded_bytes().starts_with(b".")
}

/// Lists every regular file under `root`, skipping hidden files and
/// directories. Paths are returned sorted.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_hidden(e)) {
        let entry = entry.map_err(|e| {
            PipelineError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other(format!("failed to walk {}", root.display()))
            }))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Creates, attaches to and removes document indexes.
pub struct IndexProvisioner {
    service: Arc<dyn DocumentIndexService>,
    index_name: String,
    chunking: ChunkingPolicy,
}

impl std::fmt::Debug for IndexProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexProvisioner")
            .field("index_name", &self.index_name)
            .field("chunking", &self.chunking)
            .finish_non_exhaustive()
    }
}

impl IndexProvisioner {
    pub fn new(service: Arc<dyn DocumentIndexService>) -> Self {
        Self {
            service,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            chunking: ChunkingPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingPolicy) -> Self {
        self.chunking = chunking;
        self
    }

    /// Creates an index and uploads every file under `data_dir` into it.
    ///
    /// A missing `data_dir` is created, which yields an empty index.
    pub async fn provision_index(&self, data_dir: &Path) -> Result<IndexReference> {
        fs::create_dir_all(data_dir)?;
        self.chunking.validate().map_err(PipelineError::Provisioning)?;

        let files = discover_files(data_dir)?;
        info!(
            data_dir = %data_dir.display(),
            files = files.len(),
            name = %self.index_name,
            "Provisioning document index"
        );

        let start = Instant::now();
        let mut index = self
            .service
            .create_index(&self.index_name, &self.chunking)
            .await
            .map_err(|e| PipelineError::Provisioning(format!("failed to create index: {}", e)))?;

        if files.is_empty() {
            warn!(index_id = %index.id, "No files to upload, index is empty");
        } else {
            let summary = match self.service.upload_files(&index, &files).await {
                Ok(summary) => summary,
                Err(e) => {
                    if let Err(cleanup) = self.service.delete_index(&index.id).await {
                        warn!(index_id = %index.id, error = %cleanup, "Failed to remove partial index");
                    }
                    return Err(PipelineError::Provisioning(format!(
                        "failed to upload files to {}: {}",
                        index.id, e
                    )));
                }
            };
            if summary.failed > 0 {
                warn!(index_id = %index.id, failed = summary.failed, "Some files were not indexed");
            }
            index.file_count = summary.completed;
        }

        info!(
            index_id = %index.id,
            file_count = index.file_count,
            elapsed = ?start.elapsed(),
            "Document index ready"
        );
        Ok(index)
    }

    /// Looks up an index that already exists on the service.
    pub async fn attach_existing(&self, id: &IndexId) -> Result<IndexReference> {
        let indexes = self.list().await?;
        let index = indexes
            .into_iter()
            .find(|index| &index.id == id)
            .ok_or_else(|| PipelineError::Provisioning(format!("index {} not found", id)))?;
        debug!(index_id = %index.id, file_count = index.file_count, "Attached to existing index");
        Ok(index)
    }

    pub async fn list(&self) -> Result<Vec<IndexReference>> {
        Ok(self.service.list_indexes().await?)
    }

    /// Deletes an index. Deleting an index that no longer exists succeeds.
    pub async fn teardown(&self, id: &IndexId) -> Result<()> {
        self.service.delete_index(id).await?;
        info!(index_id = %id, "Document index deleted");
        Ok(())
    }
}
