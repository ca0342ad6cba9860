//! The caller-facing portal service.
//!
//! Owns the lazily-initialized storage connection and exposes the file and
//! directory operations consumed by the HTTP surface. All durable state is
//! delegated to the injected [`BlobStore`]; this type only derives views and
//! tracks connection readiness.

use crate::models::{directory_item::DirectoryItem, file_item::FileItem};
use crate::services::directory_index::{self, DIRECTORY_PLACEHOLDER, PLACEHOLDER_CONTENT};
use crate::store::{BlobStore, ObjectRecord, ProgressSender, StoreError};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),
    #[error("upload of `{key}` failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("download of `{key}` failed: {source}")]
    DownloadFailed {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("delete of `{key}` failed: {source}")]
    DeleteFailed {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("directory `{path}` could not be created: {source}")]
    DirectoryCreateFailed {
        path: String,
        #[source]
        source: StoreError,
    },
}

pub type PortalResult<T> = Result<T, PortalError>;

/// Connection lifecycle of one service instance.
///
/// `Uninitialized -> Initializing -> Ready | Failed`. There is no automatic
/// retry loop; a `Failed` connection is only re-attempted by the next
/// `test_connection` call (or `create_directory`, which initializes
/// implicitly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

struct InitState {
    state: ConnectionState,
    /// Completed initialization attempts. Lets a caller that waited on the
    /// init lock tell "someone finished an attempt while I waited" apart
    /// from "the previous attempt failed before I arrived".
    attempts: u64,
}

/// One file handed to `upload_file`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub body: Bytes,
}

pub struct FilePortalService {
    store: Arc<dyn BlobStore>,
    init: RwLock<InitState>,
    init_lock: Mutex<()>,
}

/// Compose the object key for a file name within a directory.
fn object_key(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}

/// The directory path owning a key: everything before the last delimiter.
fn parent_directory(key: &str) -> &str {
    key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

impl FilePortalService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            init: RwLock::new(InitState {
                state: ConnectionState::Uninitialized,
                attempts: 0,
            }),
            init_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.init.read().unwrap().state
    }

    fn ensure_ready(&self) -> PortalResult<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            _ => Err(PortalError::StorageUnavailable(
                "storage connection is not ready".into(),
            )),
        }
    }

    /// Run at most one initialization attempt, shared by concurrent callers.
    ///
    /// Whoever acquires the init lock first performs the attempt; everyone
    /// queued behind it observes that attempt's outcome instead of starting
    /// another one. Returns whether the service is `Ready` afterwards.
    async fn try_initialize(&self) -> bool {
        let observed_attempts = {
            let init = self.init.read().unwrap();
            if init.state == ConnectionState::Ready {
                return true;
            }
            init.attempts
        };

        let _guard = self.init_lock.lock().await;
        {
            let init = self.init.read().unwrap();
            if init.attempts != observed_attempts {
                return init.state == ConnectionState::Ready;
            }
        }

        self.init.write().unwrap().state = ConnectionState::Initializing;
        debug!("initializing storage connection");
        let outcome = self.store.ensure_container().await;

        let mut init = self.init.write().unwrap();
        init.attempts += 1;
        match outcome {
            Ok(()) => {
                init.state = ConnectionState::Ready;
                info!("storage connection ready");
                true
            }
            Err(err) => {
                init.state = ConnectionState::Failed;
                warn!("storage initialization failed: {}", err);
                false
            }
        }
    }

    /// Verify the backend is reachable and the container exists.
    ///
    /// Re-attempts initialization opportunistically and returns `false`
    /// rather than erroring on any failure, so callers can render a
    /// degraded "disconnected" state.
    pub async fn test_connection(&self) -> bool {
        if !self.try_initialize().await {
            return false;
        }
        match self.store.container_exists().await {
            Ok(exists) => exists,
            Err(err) => {
                warn!("connection test failed: {}", err);
                false
            }
        }
    }

    /// List the files directly inside `directory` (root when empty).
    ///
    /// Enumeration order is the store's own; no reordering is applied.
    pub async fn list_files(&self, directory: &str) -> PortalResult<Vec<FileItem>> {
        self.ensure_ready()?;
        let prefix = directory_index::list_prefix(directory);
        let records = self
            .store
            .list(&prefix)
            .await
            .map_err(|err| PortalError::StorageUnavailable(err.to_string()))?;

        let index = directory_index::partition(directory, records.iter().map(|r| r.key.as_str()));
        let by_key: HashMap<&str, &ObjectRecord> =
            records.iter().map(|r| (r.key.as_str(), r)).collect();

        let files: Vec<FileItem> = index
            .local_files
            .iter()
            .filter_map(|key| by_key.get(key.as_str()))
            .map(|record| FileItem::from_record(record, directory))
            .collect();
        debug!(directory, count = files.len(), "listed files");
        Ok(files)
    }

    /// List the first-level child directories of `directory` with their
    /// recursive descendant counts.
    pub async fn list_directories(&self, directory: &str) -> PortalResult<Vec<DirectoryItem>> {
        self.ensure_ready()?;
        let prefix = directory_index::list_prefix(directory);
        let records = self
            .store
            .list(&prefix)
            .await
            .map_err(|err| PortalError::StorageUnavailable(err.to_string()))?;

        let index = directory_index::partition(directory, records.iter().map(|r| r.key.as_str()));
        let directories: Vec<DirectoryItem> = index
            .child_dirs
            .into_iter()
            .map(|(name, file_count)| DirectoryItem {
                path: object_key(directory, &name),
                name,
                file_count,
            })
            .collect();
        debug!(directory, count = directories.len(), "listed directories");
        Ok(directories)
    }

    /// Upload one file into `directory`, overwriting any object already at
    /// the composed key. Progress percentages are emitted through
    /// `progress` while bytes transfer.
    pub async fn upload_file(
        &self,
        directory: &str,
        upload: UploadRequest,
        progress: Option<ProgressSender>,
    ) -> PortalResult<FileItem> {
        self.ensure_ready()?;
        let key = object_key(directory, &upload.name);
        info!(%key, size = upload.body.len(), "uploading file");
        let record = self
            .store
            .put(
                &key,
                upload.body,
                upload.content_type,
                upload.metadata,
                progress,
            )
            .await
            .map_err(|source| PortalError::UploadFailed {
                key: key.clone(),
                source,
            })?;
        Ok(FileItem::from_record(&record, directory))
    }

    /// Upload a batch strictly sequentially: one file fully completes or
    /// fails before the next begins, and the batch stops at the first
    /// failure.
    pub async fn upload_files(
        &self,
        directory: &str,
        uploads: Vec<UploadRequest>,
    ) -> PortalResult<Vec<FileItem>> {
        let mut items = Vec::with_capacity(uploads.len());
        for upload in uploads {
            items.push(self.upload_file(directory, upload, None).await?);
        }
        Ok(items)
    }

    /// Fetch the full body of the object identified by `file_id`.
    pub async fn download_file(&self, file_id: &str) -> PortalResult<(FileItem, Bytes)> {
        self.ensure_ready()?;
        let (record, body) =
            self.store
                .get(file_id)
                .await
                .map_err(|source| PortalError::DownloadFailed {
                    key: file_id.to_string(),
                    source,
                })?;
        let item = FileItem::from_record(&record, parent_directory(file_id));
        Ok((item, body))
    }

    /// Delete the object identified by `file_id`. No soft-delete or
    /// versioning.
    pub async fn delete_file(&self, file_id: &str) -> PortalResult<()> {
        self.ensure_ready()?;
        info!(key = file_id, "deleting file");
        self.store
            .delete(file_id)
            .await
            .map_err(|source| PortalError::DeleteFailed {
                key: file_id.to_string(),
                source,
            })
    }

    /// Create the placeholder object that keeps `directory` enumerable
    /// before it holds any real files.
    ///
    /// Unlike the other mutating operations this initializes the connection
    /// implicitly when it is not ready yet.
    pub async fn create_directory(&self, directory: &str) -> PortalResult<()> {
        if directory.is_empty() {
            return Err(PortalError::DirectoryCreateFailed {
                path: String::new(),
                source: StoreError::InvalidKey,
            });
        }
        if !self.try_initialize().await {
            return Err(PortalError::StorageUnavailable(
                "storage connection is not ready".into(),
            ));
        }

        let key = format!("{}/{}", directory, DIRECTORY_PLACEHOLDER);
        info!(%key, "creating directory placeholder");
        self.store
            .put(
                &key,
                Bytes::from_static(PLACEHOLDER_CONTENT.as_bytes()),
                Some("text/plain".into()),
                HashMap::new(),
                None,
            )
            .await
            .map(|_| ())
            .map_err(|source| PortalError::DirectoryCreateFailed {
                path: directory.to_string(),
                source,
            })
    }

    /// Delete every object under `directory`, one at a time.
    ///
    /// There is no bulk or atomic delete: a failure part-way leaves the
    /// directory partially deleted (already-deleted objects stay deleted,
    /// no rollback) and only the first failure is reported.
    pub async fn delete_directory(&self, directory: &str) -> PortalResult<()> {
        self.ensure_ready()?;
        let prefix = format!("{}/", directory);
        let records = self
            .store
            .list(&prefix)
            .await
            .map_err(|err| PortalError::StorageUnavailable(err.to_string()))?;

        info!(directory, count = records.len(), "deleting directory");
        for record in records {
            self.store
                .delete(&record.key)
                .await
                .map_err(|source| PortalError::DeleteFailed {
                    key: record.key.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
