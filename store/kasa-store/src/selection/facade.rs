//! StorageFacade - Bind once, forward everything
//!
//! TigerStyle: Explicit lifecycle, no module-level singleton.
//!
//! ```text
//!  Uninitialized ──first call──▶ Probing ──select()──▶ Bound(kind)
//!                                                        (terminal)
//! ```
//!
//! The first operation triggers the probe sequence; concurrent first
//! callers all await that same probe. Once bound, the facade never
//! re-probes: a remote that becomes reachable later is ignored, and a
//! bound backend that fails surfaces its errors to callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::StoreConfig;
use crate::storage::{Document, Filter, FindOptions, RecordStore, StorageResult};

use super::prober::{BackendKind, BackendProber, Binding};

/// Lifecycle of a facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeState {
    /// No operation has run yet
    Uninitialized,
    /// A probe sequence is in flight
    Probing,
    /// Bound for the rest of the process lifetime
    Bound(BackendKind),
}

/// Informational snapshot of the binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    /// Bound backend, if any
    pub backend_kind: Option<BackendKind>,
    /// Bound and not closed
    pub connected: bool,
    /// Human readable description
    pub description: String,
}

/// Uniform record access over whichever backend won the probe.
pub struct StorageFacade {
    prober: BackendProber,
    binding: OnceCell<Binding>,
    probing: AtomicBool,
    closed: AtomicBool,
}

impl StorageFacade {
    /// Facade that will probe with `prober` on first use.
    #[must_use]
    pub fn new(prober: BackendProber) -> Self {
        Self {
            prober,
            binding: OnceCell::new(),
            probing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Facade over the standard candidate order for `config`.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(BackendProber::from_config(config))
    }

    /// Bind now instead of on first operation. Idempotent.
    pub async fn init(&self) -> BackendKind {
        self.binding().await.kind
    }

    async fn binding(&self) -> &Binding {
        self.binding
            .get_or_init(|| async {
                let _probing = ProbingFlag::raise(&self.probing);
                self.prober.select().await
            })
            .await
    }

    async fn store(&self) -> &Arc<dyn RecordStore> {
        &self.binding().await.store
    }

    /// Current lifecycle state. Never triggers a probe.
    #[must_use]
    pub fn state(&self) -> FacadeState {
        match self.binding.get() {
            Some(binding) => FacadeState::Bound(binding.kind),
            None if self.probing.load(Ordering::Acquire) => FacadeState::Probing,
            None => FacadeState::Uninitialized,
        }
    }

    /// Bound backend kind, if bound.
    #[must_use]
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.binding.get().map(|b| b.kind)
    }

    /// Snapshot for operators. Never triggers a probe.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        match self.binding.get() {
            Some(binding) => StoreStatus {
                backend_kind: Some(binding.kind),
                connected: !self.closed.load(Ordering::Acquire),
                description: binding.description.clone(),
            },
            None => StoreStatus {
                backend_kind: None,
                connected: false,
                description: match self.state() {
                    FacadeState::Probing => "Probing backends".to_string(),
                    _ => "Not initialized".to_string(),
                },
            },
        }
    }
}

/// Holds the probing flag up while a probe runs. Lowered on drop, so a
/// cancelled first caller leaves the facade `Uninitialized`.
struct ProbingFlag<'a>(&'a AtomicBool);

impl<'a> ProbingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ProbingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFacade")
            .field("state", &self.state())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordStore for StorageFacade {
    async fn insert(&self, collection: &str, document: Document) -> StorageResult<String> {
        self.store().await.insert(collection, document).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StorageResult<Vec<Document>> {
        self.store().await.find(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        self.store().await.find_one(collection, filter).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> StorageResult<u64> {
        self.store().await.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        self.store().await.delete(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        self.store().await.count(collection, filter).await
    }

    /// Close the bound store. The binding itself is kept.
    async fn close(&self) -> StorageResult<()> {
        let Some(binding) = self.binding.get() else {
            return Ok(());
        };
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(kind = %binding.kind, "closing storage backend");
        binding.store.close().await
    }
}
