//! Activity log accessors.

use crate::constants::{FAMILY_ACTIVITIES_LIMIT_DEFAULT, PAGE_LIMIT_MAX};
use crate::storage::{
    timestamp_now, Document, Filter, FindOptions, RecordStore, SortOrder, StorageResult,
};

use super::collections::ACTIVITIES;
use super::{Page, Records};

const TIMESTAMP_FIELD: &str = "timestamp";

impl Records {
    /// Append an activity, stamping `id` and `timestamp`.
    pub async fn log_activity(&self, mut activity: Document) -> StorageResult<Document> {
        activity.insert(TIMESTAMP_FIELD, timestamp_now());
        self.create(ACTIVITIES, activity).await
    }

    /// Most recent activities of one family, newest first.
    ///
    /// `limit` defaults to 50.
    pub async fn activities_by_family(
        &self,
        family_id: &str,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Document>> {
        let limit = limit
            .unwrap_or(FAMILY_ACTIVITIES_LIMIT_DEFAULT)
            .clamp(1, PAGE_LIMIT_MAX);
        let options = FindOptions::new()
            .sort_by(TIMESTAMP_FIELD, SortOrder::Descending)
            .limit(limit);

        self.store
            .find(ACTIVITIES, &Filter::eq("familyId", family_id), &options)
            .await
    }

    /// Every activity, newest first.
    pub async fn list_activities(&self) -> StorageResult<Vec<Document>> {
        let options = FindOptions::new().sort_by(TIMESTAMP_FIELD, SortOrder::Descending);
        self.store.find(ACTIVITIES, &Filter::all(), &options).await
    }

    /// One page of activities, newest first, optionally for one user.
    pub async fn activities_page(
        &self,
        page: usize,
        limit: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Page<Document>> {
        let filter = user_id.map_or_else(Filter::all, |id| Filter::eq("userId", id));
        let options = FindOptions::new()
            .sort_by("createdAt", SortOrder::Descending)
            .sort_by(TIMESTAMP_FIELD, SortOrder::Descending);

        self.page(ACTIVITIES, &filter, options, page, limit).await
    }
}
