//! Local-disk implementation of `BlobStore`.
//!
//! Durable metadata lives in SQLite; object payloads are written beneath
//! `base_path/{shard}/{shard}/{key}` where the shards are derived from the
//! key hash. Suits self-hosted deployments where no cloud account exists.

use super::{
    BlobStore, ObjectRecord, PROGRESS_CHUNK, ProgressReporter, ProgressSender, StoreError,
    StoreResult, ensure_key_safe,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ObjectRow {
    key: String,
    content_type: Option<String>,
    size_bytes: i64,
    last_modified: DateTime<Utc>,
    metadata: String,
}

impl ObjectRow {
    fn into_record(self) -> ObjectRecord {
        ObjectRecord {
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
            key: self.key,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            last_modified: self.last_modified,
        }
    }
}

/// Disk-backed store: SQLite rows for metadata, sharded files for payloads.
#[derive(Clone)]
pub struct FsStore {
    /// Shared SQLite connection pool used for metadata operations.
    db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,
}

impl FsStore {
    /// Create a new `FsStore` backed by the provided SQLite pool and using
    /// `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hexadecimal
    /// strings (00-ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path
    /// (`base_path/{shard}/{shard}/{key}`). Parent directories may not exist
    /// yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_row(&self, key: &str) -> StoreResult<ObjectRow> {
        sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, last_modified, metadata
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(key.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Recursively remove empty directories up to the store root.
    ///
    /// Stops when a directory is not empty, not found, or the root is
    /// reached.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Escape `%`, `_` and `\` so a key prefix can be used in a LIKE pattern.
fn like_escape(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl BlobStore for FsStore {
    /// "Container" creation for this backend means the payload root directory
    /// plus the metadata table.
    async fn ensure_container(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS objects (
                 key TEXT PRIMARY KEY,
                 content_type TEXT,
                 size_bytes INTEGER NOT NULL,
                 etag TEXT NOT NULL,
                 last_modified TEXT NOT NULL,
                 metadata TEXT NOT NULL DEFAULT '{}'
             )",
        )
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'objects'",
        )
        .fetch_one(&*self.db)
        .await?;
        Ok(tables > 0 && self.base_path.is_dir())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectRecord>> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, last_modified, metadata
             FROM objects WHERE key LIKE ? ESCAPE '\\' ORDER BY key ASC",
        )
        .bind(format!("{}%", like_escape(prefix)))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(ObjectRow::into_record).collect())
    }

    /// Writes bytes incrementally to a temporary file, computes the MD5 etag
    /// while copying, fsyncs, then atomically renames into the final
    /// location and upserts the metadata row (overwrite semantics).
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
        progress: Option<ProgressSender>,
    ) -> StoreResult<ObjectRecord> {
        ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut reporter = ProgressReporter::new(progress, body.len() as u64);
        let mut digest = Context::new();
        for chunk in body.chunks(PROGRESS_CHUNK) {
            digest.consume(chunk);
            if let Err(err) = file.write_all(chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
            reporter.advance(chunk.len() as u64);
        }
        reporter.advance(0);
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let last_modified = Utc::now();
        let etag = format!("{:x}", digest.compute());
        let metadata_json =
            serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());

        let insert_result = sqlx::query(
            "INSERT INTO objects (key, content_type, size_bytes, etag, last_modified, metadata)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 content_type = excluded.content_type,
                 size_bytes = excluded.size_bytes,
                 etag = excluded.etag,
                 last_modified = excluded.last_modified,
                 metadata = excluded.metadata",
        )
        .bind(key)
        .bind(content_type.clone())
        .bind(body.len() as i64)
        .bind(&etag)
        .bind(last_modified)
        .bind(&metadata_json)
        .execute(&*self.db)
        .await;

        match insert_result {
            Ok(_) => Ok(ObjectRecord {
                key: key.to_string(),
                size_bytes: body.len() as i64,
                content_type,
                last_modified,
                metadata,
            }),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<(ObjectRecord, Bytes)> {
        ensure_key_safe(key)?;
        let record = self.fetch_row(key).await?.into_record();

        let file_path = self.object_path(key);
        let body = fs::read(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;
        Ok((record, Bytes::from(body)))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let result = sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn test_store() -> (FsStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = FsStore::new(Arc::new(pool), dir.path().join("objects"));
        store.ensure_container().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn container_lifecycle() {
        let dir = TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = FsStore::new(Arc::new(pool), dir.path().join("objects"));

        assert!(!store.container_exists().await.unwrap());
        store.ensure_container().await.unwrap();
        assert!(store.container_exists().await.unwrap());
        // Idempotent.
        store.ensure_container().await.unwrap();
    }

    #[tokio::test]
    async fn upload_roundtrips_bytes_and_metadata() {
        let (store, _dir) = test_store().await;

        let mut metadata = HashMap::new();
        metadata.insert("client".to_string(), "acme".to_string());
        let record = store
            .put(
                "tax-documents/report.pdf",
                Bytes::from_static(b"annual report"),
                Some("application/pdf".into()),
                metadata.clone(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.size_bytes, 13);

        let (fetched, body) = store.get("tax-documents/report.pdf").await.unwrap();
        assert_eq!(&body[..], b"annual report");
        assert_eq!(fetched.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(fetched.metadata, metadata);
    }

    #[tokio::test]
    async fn overwrite_replaces_payload_and_row() {
        let (store, _dir) = test_store().await;
        store
            .put("a.txt", Bytes::from_static(b"v1"), None, HashMap::new(), None)
            .await
            .unwrap();
        store
            .put("a.txt", Bytes::from_static(b"version-2"), None, HashMap::new(), None)
            .await
            .unwrap();

        let (record, body) = store.get("a.txt").await.unwrap();
        assert_eq!(record.size_bytes, 9);
        assert_eq!(&body[..], b"version-2");
        assert_eq!(store.list("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_prefix_scoped() {
        let (store, _dir) = test_store().await;
        for key in ["a/x.txt", "a/b/y.txt", "ab/z.txt"] {
            store
                .put(key, Bytes::from_static(b"x"), None, HashMap::new(), None)
                .await
                .unwrap();
        }

        let keys: Vec<String> = store
            .list("a/")
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.key)
            .collect();
        assert_eq!(keys, vec!["a/b/y.txt", "a/x.txt"]);
    }

    #[tokio::test]
    async fn like_wildcards_in_prefix_are_literal() {
        let (store, _dir) = test_store().await;
        store
            .put("a_c/file.txt", Bytes::from_static(b"x"), None, HashMap::new(), None)
            .await
            .unwrap();
        store
            .put("abc/file.txt", Bytes::from_static(b"x"), None, HashMap::new(), None)
            .await
            .unwrap();

        let keys: Vec<String> = store
            .list("a_c/")
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.key)
            .collect();
        assert_eq!(keys, vec!["a_c/file.txt"]);
    }

    #[tokio::test]
    async fn delete_removes_row_payload_and_empty_shards() {
        let (store, _dir) = test_store().await;
        store
            .put("only.txt", Bytes::from_static(b"x"), None, HashMap::new(), None)
            .await
            .unwrap();
        let payload_path = store.object_path("only.txt");
        assert!(payload_path.exists());

        store.delete("only.txt").await.unwrap();
        assert!(!payload_path.exists());
        // Shard directories are pruned once empty.
        assert!(!payload_path.parent().unwrap().exists());
        assert!(store.base_path.exists());

        assert!(matches!(
            store.delete("only.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn progress_reaches_completion() {
        let (store, _dir) = test_store().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        store
            .put(
                "big.bin",
                Bytes::from(vec![0u8; 200 * 1024]),
                None,
                HashMap::new(),
                Some(tx),
            )
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(pct) = rx.try_recv() {
            seen.push(pct);
        }
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(100));
    }
}
