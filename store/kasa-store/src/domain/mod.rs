//! Domain - Named accessors over the storage facade
//!
//! TigerStyle: Thin wrappers. Every accessor is a composition of
//! `RecordStore` operations; none knows which backend is bound.
//!
//! # Identifiers
//!
//! Records carry an application `id` stamped here on create, next to the
//! engine `_id` the backend assigns. Lookups by identifier try `id` first
//! and then `_id`, so callers holding either form reach the same record.
//!
//! # Cascades
//!
//! Deleting a family or member also deletes its dependents, one collection
//! at a time. The steps are independent deletes: a failure part way
//! through is reported as [`StorageError::CascadeIncomplete`] naming the
//! steps already done, and nothing is rolled back.

mod activity;
mod families;
mod users;

use std::sync::Arc;

use serde::Serialize;

use crate::constants::{APP_ID_FIELD, PAGE_LIMIT_MAX};
use crate::selection::{StorageFacade, StoreStatus};
use crate::storage::{
    Document, Filter, FindOptions, IdGenerator, RecordStore, StorageError, StorageResult,
};

/// Collection names.
pub mod collections {
    /// Family records
    pub const FAMILIES: &str = "families";
    /// People belonging to a family
    pub const MEMBERS: &str = "members";
    /// Price plans offered to a family
    pub const PRICE_PLANS: &str = "pricePlans";
    /// Member subscriptions to price plans
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    /// Billing statements
    pub const STATEMENTS: &str = "statements";
    /// Activity log
    pub const ACTIVITIES: &str = "activities";
    /// Application users
    pub const USERS: &str = "users";
    /// Login sessions
    pub const SESSIONS: &str = "sessions";

    /// Every collection the accessors use.
    pub const ALL: &[&str] = &[
        FAMILIES,
        MEMBERS,
        PRICE_PLANS,
        SUBSCRIPTIONS,
        STATEMENTS,
        ACTIVITIES,
        USERS,
        SESSIONS,
    ];
}

// =============================================================================
// Paging
// =============================================================================

/// Position within a paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub limit: usize,
    /// Matches across all pages
    pub total: u64,
    /// Number of pages
    pub total_pages: u64,
}

impl Pagination {
    fn new(page: usize, limit: usize, total: u64) -> Self {
        assert!(limit > 0, "page limit must be positive");
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit as u64),
        }
    }
}

/// One page of records plus its position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Records on this page
    pub data: Vec<T>,
    /// Where this page sits
    pub pagination: Pagination,
}

// =============================================================================
// Cascade Report
// =============================================================================

/// Deleted count for one collection in a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeStep {
    /// Collection deleted from
    pub collection: String,
    /// Documents removed
    pub deleted: u64,
}

/// Outcome of a completed cascading delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Identifier the cascade was keyed on
    pub parent: String,
    /// Steps in execution order, parent first
    pub steps: Vec<CascadeStep>,
}

impl CascadeReport {
    /// Documents removed from `collection`, if it was part of the cascade.
    #[must_use]
    pub fn deleted_from(&self, collection: &str) -> Option<u64> {
        self.steps
            .iter()
            .find(|s| s.collection == collection)
            .map(|s| s.deleted)
    }

    /// Documents removed across every step.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.steps.iter().map(|s| s.deleted).sum()
    }
}

// =============================================================================
// Records
// =============================================================================

/// Domain accessors for the family management records.
#[derive(Debug, Clone)]
pub struct Records {
    store: Arc<StorageFacade>,
    ids: Arc<IdGenerator>,
}

impl Records {
    /// Accessors over a shared facade.
    #[must_use]
    pub fn new(store: Arc<StorageFacade>) -> Self {
        Self {
            store,
            ids: Arc::new(IdGenerator::new()),
        }
    }

    /// The underlying facade, for generic operations.
    #[must_use]
    pub fn store(&self) -> &Arc<StorageFacade> {
        &self.store
    }

    /// Binding snapshot.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        self.store.status()
    }

    /// Insert with an application `id`, returning the stored document.
    async fn create(&self, collection: &str, mut document: Document) -> StorageResult<Document> {
        if document.app_id().is_none() {
            document.insert(APP_ID_FIELD, self.ids.next_id());
        }
        let engine_id = self.store.insert(collection, document.clone()).await?;

        self.store
            .find_one(collection, &Filter::engine_id(&engine_id))
            .await?
            .ok_or_else(|| {
                StorageError::internal(format!(
                    "{collection}: inserted document {engine_id} not readable"
                ))
            })
    }

    /// Dual lookup: application `id` first, then engine `_id`.
    async fn resolve(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        if id.is_empty() {
            return Ok(None);
        }
        if let Some(doc) = self
            .store
            .find_one(collection, &Filter::eq(APP_ID_FIELD, id))
            .await?
        {
            return Ok(Some(doc));
        }
        self.store
            .find_one(collection, &Filter::engine_id(id))
            .await
    }

    /// Patch the record `id` resolves to. Returns 0 if nothing resolves.
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> StorageResult<u64> {
        match self.resolve(collection, id).await? {
            Some(doc) => {
                self.store
                    .update(collection, &identity(&doc, id), patch)
                    .await
            }
            None => Ok(0),
        }
    }

    /// Delete the record `id` resolves to. Returns 0 if nothing resolves.
    async fn delete_by_id(&self, collection: &str, id: &str) -> StorageResult<u64> {
        match self.resolve(collection, id).await? {
            Some(doc) => self.store.delete(collection, &identity(&doc, id)).await,
            None => Ok(0),
        }
    }

    async fn find_all(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>> {
        self.store
            .find(collection, filter, &FindOptions::new())
            .await
    }

    /// One page of `filter` matches in the given order.
    async fn page(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
        page: usize,
        limit: usize,
    ) -> StorageResult<Page<Document>> {
        let page = page.max(1);
        let limit = limit.clamp(1, PAGE_LIMIT_MAX);

        let data = self
            .store
            .find(collection, filter, &options.page(page, limit))
            .await?;
        let total = self.store.count(collection, filter).await?;

        Ok(Page {
            data,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Delete a parent record, then everything keyed on it.
    ///
    /// Dependents reference a parent by either identifier, so they are
    /// matched on `foreign_key` equal to the parent's app `id`, its engine
    /// `_id`, or the identifier the caller passed. The last one alone keys
    /// the cleanup when the parent is already gone.
    async fn cascade(
        &self,
        parent_collection: &str,
        id: &str,
        foreign_key: &str,
        dependents: &[&str],
    ) -> StorageResult<CascadeReport> {
        let parent = self.resolve(parent_collection, id).await?;
        let key = parent
            .as_ref()
            .and_then(Document::app_id)
            .unwrap_or(id)
            .to_string();

        let mut report = CascadeReport {
            parent: key.clone(),
            steps: Vec::with_capacity(dependents.len() + 1),
        };

        let parent_step = match &parent {
            Some(doc) => {
                self.store
                    .delete(parent_collection, &identity(doc, id))
                    .await
            }
            None => Ok(0),
        };
        record_step(&mut report, parent_collection, parent_step)?;

        let referencing = references(parent.as_ref(), id, foreign_key);
        for collection in dependents {
            let result = self.store.delete(collection, &referencing).await;
            record_step(&mut report, collection, result)?;
        }

        // Postcondition
        assert_eq!(
            report.steps.len(),
            dependents.len() + 1,
            "every cascade step must be recorded"
        );

        Ok(report)
    }
}

/// Filter that pins exactly the resolved record.
fn identity(doc: &Document, fallback: &str) -> Filter {
    match (doc.engine_id(), doc.app_id()) {
        (Some(engine_id), _) => Filter::engine_id(engine_id),
        (None, Some(app_id)) => Filter::eq(APP_ID_FIELD, app_id),
        (None, None) => Filter::eq(APP_ID_FIELD, fallback),
    }
}

/// Filter matching every dependent whose `foreign_key` names the parent.
fn references(parent: Option<&Document>, id: &str, foreign_key: &str) -> Filter {
    let mut keys: Vec<&str> = Vec::with_capacity(3);
    let known = parent.map_or((None, None), |doc| (doc.app_id(), doc.engine_id()));
    for key in [known.0, known.1, Some(id)].into_iter().flatten() {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }

    match keys.as_slice() {
        [only] => Filter::eq(foreign_key, *only),
        _ => Filter::any_of(keys.iter().map(|key| Filter::eq(foreign_key, *key)).collect()),
    }
}

fn record_step(
    report: &mut CascadeReport,
    collection: &str,
    result: StorageResult<u64>,
) -> StorageResult<()> {
    match result {
        Ok(deleted) => {
            tracing::debug!(parent = %report.parent, collection, deleted, "cascade step");
            report.steps.push(CascadeStep {
                collection: collection.to_string(),
                deleted,
            });
            Ok(())
        }
        Err(e) => {
            let completed: Vec<String> =
                report.steps.iter().map(|s| s.collection.clone()).collect();
            tracing::warn!(
                parent = %report.parent,
                collection,
                ?completed,
                error = %e,
                "cascade stopped, completed steps are not rolled back"
            );
            Err(StorageError::CascadeIncomplete {
                parent: report.parent.clone(),
                collection: collection.to_string(),
                completed,
                message: e.to_string(),
            })
        }
    }
}

/// Drop a field from every document.
fn strip_field(documents: &mut [Document], field: &str) {
    for doc in documents {
        doc.remove(field);
    }
}
