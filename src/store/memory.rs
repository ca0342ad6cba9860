//! An in-memory implementation of `BlobStore`, intended primarily for
//! testing.

use super::{
    BlobStore, ObjectRecord, PROGRESS_CHUNK, ProgressReporter, ProgressSender, StoreError,
    StoreResult, ensure_key_safe,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{
    RwLock,
    atomic::{AtomicBool, Ordering},
};

struct StoredObject {
    body: Bytes,
    record: ObjectRecord,
}

/// Keeps objects in a `BTreeMap` so enumeration order is deterministic.
/// The container starts out absent, mirroring a fresh cloud account.
pub struct MemoryStore {
    container_name: String,
    container_created: AtomicBool,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            container_created: AtomicBool::new(false),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    fn require_container(&self) -> StoreResult<()> {
        if self.container_created.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::ContainerNotFound(self.container_name.clone()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("documents")
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn ensure_container(&self) -> StoreResult<()> {
        self.container_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        Ok(self.container_created.load(Ordering::SeqCst))
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectRecord>> {
        self.require_container()?;
        let objects = self.objects.read().unwrap();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, stored)| stored.record.clone())
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
        progress: Option<ProgressSender>,
    ) -> StoreResult<ObjectRecord> {
        ensure_key_safe(key)?;
        self.require_container()?;

        let mut reporter = ProgressReporter::new(progress, body.len() as u64);
        let mut copied = 0usize;
        while copied < body.len() {
            let step = PROGRESS_CHUNK.min(body.len() - copied);
            copied += step;
            reporter.advance(step as u64);
        }
        reporter.advance(0);

        let record = ObjectRecord {
            key: key.to_string(),
            size_bytes: body.len() as i64,
            content_type,
            last_modified: Utc::now(),
            metadata,
        };
        self.objects.write().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn get(&self, key: &str) -> StoreResult<(ObjectRecord, Bytes)> {
        self.require_container()?;
        let objects = self.objects.read().unwrap();
        objects
            .get(key)
            .map(|stored| (stored.record.clone(), stored.body.clone()))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.require_container()?;
        let mut objects = self.objects.write().unwrap();
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
