//! Test doubles for probing and binding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::storage::{
    Document, FileStore, Filter, FindOptions, RecordStore, StorageError, StorageResult,
};

use super::prober::{BackendKind, Candidate, Connector};

/// How a fake backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reach {
    /// Probe and connect succeed
    Up,
    /// Probe fails immediately
    Refused,
    /// Probe never completes
    Hang,
    /// Probe succeeds, connect fails
    ProbeOnly,
    /// Probe succeeds, connect never completes
    ConnectHang,
}

/// Connector whose reachability can be flipped at runtime.
#[derive(Clone)]
pub(crate) struct FakeConnector {
    reach: Arc<Mutex<Reach>>,
    pub probes: Arc<AtomicUsize>,
    pub connects: Arc<AtomicUsize>,
    store: Arc<dyn RecordStore>,
    _dir: Arc<TempDir>,
}

impl FakeConnector {
    pub fn new(reach: Reach) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        Self::with_store(reach, store, dir)
    }

    pub fn with_store(reach: Reach, store: Arc<dyn RecordStore>, dir: TempDir) -> Self {
        Self {
            reach: Arc::new(Mutex::new(reach)),
            probes: Arc::new(AtomicUsize::new(0)),
            connects: Arc::new(AtomicUsize::new(0)),
            store,
            _dir: Arc::new(dir),
        }
    }

    pub fn set_reach(&self, reach: Reach) {
        *self.reach.lock().unwrap() = reach;
    }

    pub fn candidate(&self, kind: BackendKind, timeout: Duration) -> Candidate {
        Candidate::new(kind, timeout, Arc::new(self.clone()))
    }

    fn reach(&self) -> Reach {
        *self.reach.lock().unwrap()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn target(&self) -> String {
        "fake://backend".to_string()
    }

    async fn probe(&self) -> StorageResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.reach() {
            Reach::Up | Reach::ProbeOnly | Reach::ConnectHang => Ok(()),
            Reach::Refused => Err(StorageError::connection("connection refused")),
            Reach::Hang => std::future::pending().await,
        }
    }

    async fn connect(&self) -> StorageResult<Arc<dyn RecordStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.reach() {
            Reach::Up => Ok(Arc::clone(&self.store)),
            Reach::Refused | Reach::ProbeOnly => {
                Err(StorageError::connection("authentication failed"))
            }
            Reach::Hang | Reach::ConnectHang => std::future::pending().await,
        }
    }
}

/// Store that fails deletes on one collection and forwards everything else.
pub(crate) struct FaultyStore {
    inner: FileStore,
    fail_delete_on: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new(dir: &TempDir) -> Self {
        Self {
            inner: FileStore::new(dir.path()),
            fail_delete_on: Mutex::new(None),
        }
    }

    pub fn fail_deletes_on(&self, collection: &str) {
        *self.fail_delete_on.lock().unwrap() = Some(collection.to_string());
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn insert(&self, collection: &str, document: Document) -> StorageResult<String> {
        self.inner.insert(collection, document).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StorageResult<Vec<Document>> {
        self.inner.find(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        self.inner.find_one(collection, filter).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> StorageResult<u64> {
        self.inner.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let failing = self.fail_delete_on.lock().unwrap().clone();
        if failing.as_deref() == Some(collection) {
            return Err(StorageError::write("injected delete fault"));
        }
        self.inner.delete(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        self.inner.count(collection, filter).await
    }
}
