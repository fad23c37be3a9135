//! Storage - Record Store Trait and Backends
//!
//! TigerStyle: One interface, every backend interchangeable.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RecordStore Trait                        │
//! │   insert · find · find_one · update · delete · count · close │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │    FileStore    │           │   MongoStore    │
//! │   (embedded)    │           │ (remote/local)  │
//! └─────────────────┘           └─────────────────┘
//! ```
//!
//! Both backends evaluate the same [`Filter`] tree and follow the same
//! identifier and timestamp rules from [`document`].

mod backend;
pub mod document;
mod error;
mod file;
mod filter;

#[cfg(feature = "mongodb")]
mod mongo;

pub use backend::{FindOptions, RecordStore, SortOrder};
pub use document::{timestamp_now, Document, IdGenerator};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
#[cfg(any(feature = "mongodb", test))]
pub(crate) use file::validate_collection;
pub use filter::{Filter, Predicate};

#[cfg(feature = "mongodb")]
pub use mongo::{MongoConnector, MongoStore};
