//! FileStore - Embedded Fallback Storage
//!
//! TigerStyle: No external process, always constructible.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//! ├── families.json      [ {...}, {...} ]
//! ├── members.json
//! └── users.json
//! ```
//!
//! Every write loads the whole collection, mutates it in memory and writes
//! it back: O(collection) per write. Read-modify-write sections hold a
//! per-collection async mutex so concurrent writers in this process cannot
//! clobber each other. The new content goes to a scratch file that is
//! renamed into place, so a reader never sees a partial file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::fs;

use crate::constants::{
    COLLECTION_FILE_EXTENSION, COLLECTION_NAME_BYTES_MAX, COLLECTION_TEMP_FILE_EXTENSION,
    ENGINE_ID_FIELD,
};

use super::backend::{FindOptions, RecordStore, SortOrder};
use super::document::{prepare_patch, stamp_created, timestamp_now, Document, IdGenerator};
use super::error::{StorageError, StorageResult};
use super::filter::{compare_values, Filter, Predicate};

/// Collection names double as file names.
static COLLECTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("collection name pattern"));

/// Reject names that are not safe as a file stem.
pub(crate) fn validate_collection(name: &str) -> StorageResult<()> {
    if name.len() > COLLECTION_NAME_BYTES_MAX || !COLLECTION_NAME.is_match(name) {
        return Err(StorageError::invalid_collection(name));
    }
    Ok(())
}

// =============================================================================
// FileStore
// =============================================================================

/// Record store backed by one JSON file per collection.
#[derive(Debug)]
pub struct FileStore {
    /// Directory holding the collection files
    data_dir: PathBuf,
    /// Per-collection write locks
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Engine identifier generator
    ids: IdGenerator,
}

impl FileStore {
    /// Create a store rooted at `data_dir`.
    ///
    /// Nothing touches the disk until the first write, which creates the
    /// directory if needed.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks: Mutex::new(HashMap::new()),
            ids: IdGenerator::new(),
        }
    }

    /// Path of a collection's file.
    #[must_use]
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.data_dir
            .join(format!("{collection}.{COLLECTION_FILE_EXTENSION}"))
    }

    fn lock_for(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(collection.to_string()).or_default())
    }

    /// Load a whole collection. A missing file is an empty collection.
    async fn load(&self, collection: &str) -> StorageResult<Vec<Document>> {
        let path = self.collection_path(collection);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&path, &e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Deserialization(format!("{}: {e}", path.display())))
    }

    /// Replace a whole collection on disk.
    async fn save(&self, collection: &str, documents: &[Document]) -> StorageResult<()> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StorageError::io(&self.data_dir, &e))?;

        let bytes = serde_json::to_vec_pretty(documents)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let path = self.collection_path(collection);
        let tmp = self
            .data_dir
            .join(format!("{collection}.{COLLECTION_TEMP_FILE_EXTENSION}"));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StorageError::io(&tmp, &e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, &e))?;

        tracing::trace!(collection, count = documents.len(), "collection saved");
        Ok(())
    }
}

/// Apply predicate, sort and paging in memory.
fn select(documents: Vec<Document>, predicate: &Predicate, options: &FindOptions) -> Vec<Document> {
    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|doc| predicate.matches(doc))
        .collect();

    if !options.sort.is_empty() {
        matched.sort_by(|a, b| {
            for (field, order) in &options.sort {
                let ord = compare_values(a.get_path(field), b.get_path(field));
                let ord = match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let skip = options.skip.unwrap_or(0);
    let limit = options.limit.unwrap_or(usize::MAX);
    matched.into_iter().skip(skip).take(limit).collect()
}

// =============================================================================
// RecordStore Implementation
// =============================================================================

#[async_trait]
impl RecordStore for FileStore {
    #[tracing::instrument(level = "debug", skip(self, document))]
    async fn insert(&self, collection: &str, mut document: Document) -> StorageResult<String> {
        validate_collection(collection)?;

        let id = match document.get(ENGINE_ID_FIELD) {
            None => {
                let id = self.ids.next_id();
                document.insert(ENGINE_ID_FIELD, id.clone());
                id
            }
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                return Err(StorageError::validation(format!(
                    "{ENGINE_ID_FIELD} must be a non-empty string, got {other}"
                )));
            }
        };
        stamp_created(&mut document, &timestamp_now());

        let lock = self.lock_for(collection);
        let _guard = lock.lock().await;

        let mut documents = self.load(collection).await?;
        if documents.iter().any(|d| d.engine_id() == Some(id.as_str())) {
            return Err(StorageError::write(format!(
                "duplicate {ENGINE_ID_FIELD} {id} in {collection}"
            )));
        }
        documents.push(document);
        self.save(collection, &documents).await?;

        // Postcondition
        assert!(!id.is_empty(), "inserted document must have an id");

        Ok(id)
    }

    #[tracing::instrument(level = "debug", skip(self, filter, options))]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StorageResult<Vec<Document>> {
        validate_collection(collection)?;
        let predicate = filter.compile()?;

        let documents = self.load(collection).await?;
        let results = select(documents, &predicate, options);

        // Postcondition
        if let Some(limit) = options.limit {
            assert!(
                results.len() <= limit,
                "result count {} exceeds limit {}",
                results.len(),
                limit
            );
        }

        Ok(results)
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        let options = FindOptions::new().limit(1);
        Ok(self.find(collection, filter, &options).await?.into_iter().next())
    }

    #[tracing::instrument(level = "debug", skip(self, filter, patch))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> StorageResult<u64> {
        validate_collection(collection)?;
        let predicate = filter.compile()?;
        let patch = prepare_patch(patch, &timestamp_now())?;

        let lock = self.lock_for(collection);
        let _guard = lock.lock().await;

        let mut documents = self.load(collection).await?;
        let mut modified = 0_u64;
        for doc in documents.iter_mut().filter(|doc| predicate.matches(doc)) {
            doc.merge(&patch)?;
            modified += 1;
        }

        if modified > 0 {
            self.save(collection, &documents).await?;
        }
        Ok(modified)
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn delete(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        validate_collection(collection)?;
        let predicate = filter.compile()?;

        let lock = self.lock_for(collection);
        let _guard = lock.lock().await;

        let mut documents = self.load(collection).await?;
        let before = documents.len();
        documents.retain(|doc| !predicate.matches(doc));
        let removed = before - documents.len();

        if removed > 0 {
            self.save(collection, &documents).await?;
        }
        Ok(removed as u64)
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        validate_collection(collection)?;
        let predicate = filter.compile()?;

        let documents = self.load(collection).await?;
        Ok(documents.iter().filter(|doc| predicate.matches(doc)).count() as u64)
    }
}

// =============================================================================
// Tests
// =============================================================================
