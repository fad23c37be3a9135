//! Kasa Store - Record storage with cascading backend fallback
//!
//! TigerStyle storage layer for the Kasa family management records.
//!
//! # Philosophy
//!
//! > "Degrade to a weaker store, never fail to start."
//!
//! 1. Probe once, at first use, in a fixed order
//! 2. Every probe is bounded; a timeout is a refusal
//! 3. The embedded file store always binds
//! 4. After binding, errors from the backend reach the caller unchanged
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Records (domain accessors, cascades)        │
//! ├─────────────────────────────────────────────┤
//! │  StorageFacade  (bind once, forward)         │
//! │  BackendProber  remote → local → embedded    │
//! ├─────────────────────────────────────────────┤
//! │  MongoStore (feature "mongodb") │ FileStore  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kasa_store::{Document, Records, StorageFacade, StoreConfig};
//!
//! # async fn run() -> kasa_store::StorageResult<()> {
//! let facade = Arc::new(StorageFacade::from_config(&StoreConfig::from_env()));
//! let records = Records::new(facade);
//!
//! let family = records
//!     .create_family(Document::new().with("name", "Smith Family"))
//!     .await?;
//! let report = records.delete_family(family.app_id().unwrap_or_default()).await?;
//! assert_eq!(report.deleted_from("families"), Some(1));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod domain;
pub mod selection;
pub mod storage;

pub use config::StoreConfig;
pub use domain::{collections, CascadeReport, CascadeStep, Page, Pagination, Records};
pub use selection::{
    BackendKind, BackendProber, Candidate, Connector, FacadeState, StorageFacade, StoreStatus,
};
pub use storage::{
    Document, FileStore, Filter, FindOptions, RecordStore, SortOrder, StorageError,
    StorageResult,
};

#[cfg(feature = "mongodb")]
pub use storage::{MongoConnector, MongoStore};
