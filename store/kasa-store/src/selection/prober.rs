//! BackendProber - Ordered availability probing
//!
//! TigerStyle: Strict candidate order, every attempt bounded, the embedded
//! store is the unconditional last resort.
//!
//! ```text
//! remote (3000ms) ──fail──▶ local (2000ms) ──fail──▶ embedded (always)
//!      │ ok                      │ ok
//!      ▼                         ▼
//!   Binding                   Binding
//! ```
//!
//! A candidate that times out is treated exactly like one that refused the
//! connection. Failures are logged and swallowed; callers only ever see a
//! binding.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::storage::{FileStore, RecordStore, StorageError, StorageResult};

// =============================================================================
// BackendKind
// =============================================================================

/// Which backend a facade is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Managed database reached over the network
    Remote,
    /// Same engine on the loopback interface
    Local,
    /// JSON files on local disk
    Embedded,
}

impl BackendKind {
    /// Short machine name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
            Self::Embedded => "embedded",
        }
    }

    /// Human readable name.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Remote => "Remote database",
            Self::Local => "Local database",
            Self::Embedded => "Embedded file store",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Reaches one network backend.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Where this connector points, safe to log.
    fn target(&self) -> String;

    /// Lightweight reachability check. Leaves nothing open.
    async fn probe(&self) -> StorageResult<()>;

    /// Open the backend for use.
    async fn connect(&self) -> StorageResult<Arc<dyn RecordStore>>;
}

/// One entry in the probe order.
#[derive(Clone)]
pub struct Candidate {
    /// Kind reported once bound
    pub kind: BackendKind,
    /// Bound on probe and connect together
    pub timeout: Duration,
    /// How to reach it
    pub connector: Arc<dyn Connector>,
}

impl Candidate {
    /// Create a candidate.
    ///
    /// # Panics
    /// If `kind` is `Embedded`; the embedded store is not probed.
    #[must_use]
    pub fn new(kind: BackendKind, timeout: Duration, connector: Arc<dyn Connector>) -> Self {
        assert!(
            kind != BackendKind::Embedded,
            "embedded store is the fallback, not a candidate"
        );
        assert!(!timeout.is_zero(), "candidate timeout must be positive");

        Self {
            kind,
            timeout,
            connector,
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("target", &self.connector.target())
            .finish()
    }
}

// =============================================================================
// Binding
// =============================================================================

/// Outcome of a probe run.
#[derive(Clone)]
pub struct Binding {
    /// Which backend won
    pub kind: BackendKind,
    /// The store to use from now on
    pub store: Arc<dyn RecordStore>,
    /// Human readable description for status
    pub description: String,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// BackendProber
// =============================================================================

/// Probes candidates in order and binds the first that answers.
#[derive(Debug)]
pub struct BackendProber {
    candidates: Vec<Candidate>,
    data_dir: PathBuf,
}

impl BackendProber {
    /// Prober with no network candidates: always binds the embedded store.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            candidates: Vec::new(),
            data_dir: data_dir.into(),
        }
    }

    /// Append a candidate. Candidates are tried in the order added.
    #[must_use]
    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Remote (if configured) then local, then the embedded store.
    ///
    /// Without the `mongodb` feature only the embedded store is available.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        #[allow(unused_mut)]
        let mut prober = Self::new(&config.data_dir);

        #[cfg(feature = "mongodb")]
        {
            use crate::domain::collections;
            use crate::storage::MongoConnector;

            let network = [
                (BackendKind::Remote, &config.remote_uri, config.remote_timeout),
                (BackendKind::Local, &config.local_uri, config.local_timeout),
            ];
            for (kind, uri, timeout) in network {
                let Some(uri) = uri else { continue };
                if let Some(problem) = config.candidate_problem(timeout) {
                    tracing::warn!(%kind, %problem, "skipping database candidate");
                    continue;
                }
                let connector = MongoConnector::new(uri, &config.database)
                    .with_timeout(timeout)
                    .with_collections(collections::ALL);
                prober = prober.with_candidate(Candidate::new(kind, timeout, Arc::new(connector)));
            }
        }

        #[cfg(not(feature = "mongodb"))]
        if config.remote_uri.is_some() || config.local_uri.is_some() {
            tracing::debug!("built without database support, only the embedded store is available");
        }

        prober
    }

    /// Kinds that will be probed, in order.
    #[must_use]
    pub fn candidate_kinds(&self) -> Vec<BackendKind> {
        self.candidates.iter().map(|c| c.kind).collect()
    }

    /// Run the probe sequence once and return the winning binding.
    ///
    /// Never fails: the embedded store is constructed without touching disk.
    #[tracing::instrument(skip(self), fields(candidates = self.candidates.len()))]
    pub async fn select(&self) -> Binding {
        for candidate in &self.candidates {
            let target = candidate.connector.target();
            match attempt(candidate).await {
                Ok(store) => {
                    tracing::info!(kind = %candidate.kind, %target, "storage backend bound");
                    return Binding {
                        kind: candidate.kind,
                        store,
                        description: format!("{} ({target})", candidate.kind.description()),
                    };
                }
                Err(e) => {
                    tracing::info!(
                        kind = %candidate.kind,
                        %target,
                        error = %e,
                        "storage backend unavailable, trying next"
                    );
                }
            }
        }

        tracing::info!(data_dir = %self.data_dir.display(), "storage backend bound: embedded file store");
        Binding {
            kind: BackendKind::Embedded,
            store: Arc::new(FileStore::new(&self.data_dir)),
            description: format!(
                "{} ({})",
                BackendKind::Embedded.description(),
                self.data_dir.display()
            ),
        }
    }
}

/// Probe then connect, together bounded by the candidate's timeout.
async fn attempt(candidate: &Candidate) -> StorageResult<Arc<dyn RecordStore>> {
    let timeout_ms = u64::try_from(candidate.timeout.as_millis()).unwrap_or(u64::MAX);

    tokio::time::timeout(candidate.timeout, async {
        candidate.connector.probe().await?;
        candidate.connector.connect().await
    })
    .await
    .map_err(|_| StorageError::timeout(timeout_ms))?
}
