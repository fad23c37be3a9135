//! Record Store Trait
//!
//! TigerStyle: Abstract interface for document storage.
//!
//! Every backend (embedded file store, remote or local database) satisfies
//! the same contract, so callers written against one run unchanged on the
//! others.

use async_trait::async_trait;

use super::document::Document;
use super::error::StorageResult;
use super::filter::Filter;

// =============================================================================
// Find Options
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// Ordering and paging for `find`.
///
/// Without `sort`, result order is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort keys, most significant first
    pub sort: Vec<(String, SortOrder)>,
    /// Number of matches to skip
    pub skip: Option<usize>,
    /// Maximum number of matches to return
    pub limit: Option<usize>,
}

impl FindOptions {
    /// No ordering, no paging.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sort key.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Skip the first `skip` matches.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return at most `limit` matches.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 1-based page of `limit` matches.
    #[must_use]
    pub fn page(self, page: usize, limit: usize) -> Self {
        let page = page.max(1);
        self.skip((page - 1) * limit).limit(limit)
    }
}

// =============================================================================
// RecordStore
// =============================================================================

/// Abstract storage backend for documents.
///
/// TigerStyle: All operations are async, return explicit errors.
/// A backend never reports success for a write it did not persist.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a document.
    ///
    /// Assigns the engine identifier if absent and stamps `createdAt` /
    /// `updatedAt` unless present. Returns the engine identifier.
    async fn insert(&self, collection: &str, document: Document) -> StorageResult<String>;

    /// Find all documents matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StorageResult<Vec<Document>>;

    /// Find the first document matching `filter`.
    ///
    /// Returns None if nothing matches.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>>;

    /// Merge `patch` into every matching document and re-stamp `updatedAt`.
    ///
    /// Returns the number of documents modified.
    async fn update(&self, collection: &str, filter: &Filter, patch: Document)
        -> StorageResult<u64>;

    /// Delete every matching document.
    ///
    /// Returns the number of documents removed.
    async fn delete(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;

    /// Count matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;

    /// Release connections held by the backend.
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
