//! Family, member, price plan, subscription and statement accessors.

use crate::storage::{Document, Filter, FindOptions, RecordStore, SortOrder, StorageResult};

use super::collections::{
    ACTIVITIES, FAMILIES, MEMBERS, PRICE_PLANS, STATEMENTS, SUBSCRIPTIONS,
};
use super::{CascadeReport, Page, Records};

const FAMILY_ID_FIELD: &str = "familyId";
const MEMBER_ID_FIELD: &str = "memberId";

/// Deleted after the family itself, in this order.
const FAMILY_DEPENDENTS: [&str; 5] = [MEMBERS, PRICE_PLANS, SUBSCRIPTIONS, STATEMENTS, ACTIVITIES];

/// Deleted after the member itself, in this order.
const MEMBER_DEPENDENTS: [&str; 2] = [SUBSCRIPTIONS, STATEMENTS];

fn by_family(family_id: &str) -> Filter {
    Filter::eq(FAMILY_ID_FIELD, family_id)
}

impl Records {
    // =========================================================================
    // Families
    // =========================================================================

    /// Family by application or engine identifier.
    pub async fn get_family(&self, id: &str) -> StorageResult<Option<Document>> {
        self.resolve(FAMILIES, id).await
    }

    /// Every family, unordered.
    pub async fn list_families(&self) -> StorageResult<Vec<Document>> {
        self.find_all(FAMILIES, &Filter::all()).await
    }

    /// Create a family.
    pub async fn create_family(&self, family: Document) -> StorageResult<Document> {
        self.create(FAMILIES, family).await
    }

    /// Patch a family.
    pub async fn update_family(&self, id: &str, patch: Document) -> StorageResult<u64> {
        self.update_by_id(FAMILIES, id, patch).await
    }

    /// Delete a family, then its members, price plans, subscriptions,
    /// statements and activities.
    ///
    /// The family goes first, so a failure part way leaves dependents whose
    /// parent no longer exists. Those orphans are named in the
    /// `CascadeIncomplete` error and can be removed by calling this again
    /// with the same identifier.
    pub async fn delete_family(&self, id: &str) -> StorageResult<CascadeReport> {
        self.cascade(FAMILIES, id, FAMILY_ID_FIELD, &FAMILY_DEPENDENTS)
            .await
    }

    // =========================================================================
    // Members
    // =========================================================================

    /// Member by application or engine identifier.
    pub async fn get_member(&self, id: &str) -> StorageResult<Option<Document>> {
        self.resolve(MEMBERS, id).await
    }

    /// Member by exact email.
    pub async fn get_member_by_email(&self, email: &str) -> StorageResult<Option<Document>> {
        self.store
            .find_one(MEMBERS, &Filter::eq("email", email))
            .await
    }

    /// Members of one family.
    pub async fn members_by_family(&self, family_id: &str) -> StorageResult<Vec<Document>> {
        self.find_all(MEMBERS, &by_family(family_id)).await
    }

    /// Every member, unordered.
    pub async fn list_members(&self) -> StorageResult<Vec<Document>> {
        self.find_all(MEMBERS, &Filter::all()).await
    }

    /// Create a member.
    pub async fn create_member(&self, member: Document) -> StorageResult<Document> {
        self.create(MEMBERS, member).await
    }

    /// Patch a member.
    pub async fn update_member(&self, id: &str, patch: Document) -> StorageResult<u64> {
        self.update_by_id(MEMBERS, id, patch).await
    }

    /// Delete a member, then its subscriptions and statements.
    pub async fn delete_member(&self, id: &str) -> StorageResult<CascadeReport> {
        self.cascade(MEMBERS, id, MEMBER_ID_FIELD, &MEMBER_DEPENDENTS)
            .await
    }

    /// Newest members first, optionally narrowed by a case-insensitive
    /// substring over name and email, or a literal substring of the phone.
    pub async fn search_members(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> StorageResult<Page<Document>> {
        let filter = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => Filter::any_of(vec![
                Filter::contains("firstName", text),
                Filter::contains("lastName", text),
                Filter::contains("email", text),
                Filter::matches("phone", regex::escape(text)),
            ]),
            None => Filter::all(),
        };
        let options = FindOptions::new().sort_by("createdAt", SortOrder::Descending);

        self.page(MEMBERS, &filter, options, page, limit).await
    }

    // =========================================================================
    // Price Plans
    // =========================================================================

    /// Price plans of one family.
    pub async fn price_plans_by_family(&self, family_id: &str) -> StorageResult<Vec<Document>> {
        self.find_all(PRICE_PLANS, &by_family(family_id)).await
    }

    /// Price plan by application or engine identifier.
    pub async fn get_price_plan(&self, id: &str) -> StorageResult<Option<Document>> {
        self.resolve(PRICE_PLANS, id).await
    }

    /// Every price plan, unordered.
    pub async fn list_price_plans(&self) -> StorageResult<Vec<Document>> {
        self.find_all(PRICE_PLANS, &Filter::all()).await
    }

    /// Create a price plan.
    pub async fn create_price_plan(&self, plan: Document) -> StorageResult<Document> {
        self.create(PRICE_PLANS, plan).await
    }

    /// Patch a price plan.
    pub async fn update_price_plan(&self, id: &str, patch: Document) -> StorageResult<u64> {
        self.update_by_id(PRICE_PLANS, id, patch).await
    }

    /// Delete a price plan. Subscriptions that reference it are kept.
    pub async fn delete_price_plan(&self, id: &str) -> StorageResult<u64> {
        self.delete_by_id(PRICE_PLANS, id).await
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscriptions of one family.
    pub async fn subscriptions_by_family(&self, family_id: &str) -> StorageResult<Vec<Document>> {
        self.find_all(SUBSCRIPTIONS, &by_family(family_id)).await
    }

    /// Create a subscription.
    pub async fn create_subscription(&self, subscription: Document) -> StorageResult<Document> {
        self.create(SUBSCRIPTIONS, subscription).await
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Statements of one family.
    pub async fn statements_by_family(&self, family_id: &str) -> StorageResult<Vec<Document>> {
        self.find_all(STATEMENTS, &by_family(family_id)).await
    }

    /// Every statement, unordered.
    pub async fn list_statements(&self) -> StorageResult<Vec<Document>> {
        self.find_all(STATEMENTS, &Filter::all()).await
    }

    /// Create a statement.
    pub async fn create_statement(&self, statement: Document) -> StorageResult<Document> {
        self.create(STATEMENTS, statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::testing::{FakeConnector, FaultyStore, Reach};
    use crate::selection::{BackendKind, BackendProber, StorageFacade};
    use crate::storage::StorageError;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn records() -> (Records, TempDir) {
        let dir = tempdir().unwrap();
        let facade = StorageFacade::new(BackendProber::new(dir.path()));
        (Records::new(Arc::new(facade)), dir)
    }

    /// A family with one of everything, plus an unrelated family.
    async fn seed(records: &Records) -> (String, String) {
        let family = records
            .create_family(Document::new().with("name", "Smith Family"))
            .await
            .unwrap();
        let other = records
            .create_family(Document::new().with("name", "Cohen Family"))
            .await
            .unwrap();
        let fid = family.app_id().unwrap().to_string();
        let oid = other.app_id().unwrap().to_string();

        for family_id in [&fid, &oid] {
            let member = records
                .create_member(Document::new().with("firstName", "Dana").with("familyId", family_id.as_str()))
                .await
                .unwrap();
            let mid = member.app_id().unwrap();
            records
                .create_price_plan(Document::new().with("familyId", family_id.as_str()))
                .await
                .unwrap();
            records
                .create_subscription(
                    Document::new()
                        .with("familyId", family_id.as_str())
                        .with("memberId", mid),
                )
                .await
                .unwrap();
            records
                .create_statement(
                    Document::new()
                        .with("familyId", family_id.as_str())
                        .with("memberId", mid),
                )
                .await
                .unwrap();
            records
                .log_activity(Document::new().with("familyId", family_id.as_str()))
                .await
                .unwrap();
        }
        (fid, oid)
    }

    #[tokio::test]
    async fn test_delete_family_cascades_in_order() {
        let (records, _dir) = records();
        let (fid, oid) = seed(&records).await;

        let report = records.delete_family(&fid).await.unwrap();

        let order: Vec<&str> = report.steps.iter().map(|s| s.collection.as_str()).collect();
        assert_eq!(
            order,
            vec![FAMILIES, MEMBERS, PRICE_PLANS, SUBSCRIPTIONS, STATEMENTS, ACTIVITIES]
        );
        assert_eq!(report.total(), 6);
        assert!(records.get_family(&fid).await.unwrap().is_none());
        assert!(records.members_by_family(&fid).await.unwrap().is_empty());
        assert!(records.price_plans_by_family(&fid).await.unwrap().is_empty());
        assert!(records.subscriptions_by_family(&fid).await.unwrap().is_empty());
        assert!(records.statements_by_family(&fid).await.unwrap().is_empty());
        assert!(records.activities_by_family(&fid, None).await.unwrap().is_empty());

        // The other family is untouched
        assert!(records.get_family(&oid).await.unwrap().is_some());
        assert_eq!(records.members_by_family(&oid).await.unwrap().len(), 1);
        assert_eq!(records.statements_by_family(&oid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_family_by_engine_id_uses_app_id_for_dependents() {
        let (records, _dir) = records();
        let (fid, _) = seed(&records).await;
        let family = records.get_family(&fid).await.unwrap().unwrap();

        let report = records
            .delete_family(family.engine_id().unwrap())
            .await
            .unwrap();
        assert_eq!(report.parent, fid);
        assert_eq!(report.deleted_from(MEMBERS), Some(1));
    }

    #[tokio::test]
    async fn test_delete_family_clears_dependents_keyed_by_either_identifier() {
        let (records, _dir) = records();
        let family = records
            .create_family(Document::new().with("name", "Smith Family"))
            .await
            .unwrap();
        let fid = family.app_id().unwrap().to_string();
        let engine_id = family.engine_id().unwrap().to_string();

        for key in [fid.as_str(), engine_id.as_str()] {
            records
                .create_member(Document::new().with("familyId", key))
                .await
                .unwrap();
            records
                .create_statement(Document::new().with("familyId", key))
                .await
                .unwrap();
        }

        let report = records.delete_family(&engine_id).await.unwrap();

        assert_eq!(report.deleted_from(FAMILIES), Some(1));
        assert_eq!(report.deleted_from(MEMBERS), Some(2));
        assert_eq!(report.deleted_from(STATEMENTS), Some(2));
        for key in [&fid, &engine_id] {
            assert!(records.members_by_family(key).await.unwrap().is_empty());
            assert!(records.statements_by_family(key).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_delete_missing_family_still_clears_orphans() {
        let (records, _dir) = records();
        records
            .create_member(Document::new().with("familyId", "gone"))
            .await
            .unwrap();

        let report = records.delete_family("gone").await.unwrap();
        assert_eq!(report.deleted_from(FAMILIES), Some(0));
        assert_eq!(report.deleted_from(MEMBERS), Some(1));
    }

    #[tokio::test]
    async fn test_cascade_failure_reports_completed_steps() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FaultyStore::new(&dir));
        let connector = FakeConnector::with_store(Reach::Up, store.clone(), tempdir().unwrap());
        let facade = StorageFacade::new(
            BackendProber::new(dir.path())
                .with_candidate(connector.candidate(BackendKind::Remote, Duration::from_millis(200))),
        );
        let records = Records::new(Arc::new(facade));
        let (fid, _) = seed(&records).await;

        store.fail_deletes_on(STATEMENTS);
        let err = records.delete_family(&fid).await.unwrap_err();

        match err {
            StorageError::CascadeIncomplete {
                parent,
                collection,
                completed,
                ..
            } => {
                assert_eq!(parent, fid);
                assert_eq!(collection, STATEMENTS);
                assert_eq!(completed, vec![FAMILIES, MEMBERS, PRICE_PLANS, SUBSCRIPTIONS]);
            }
            other => panic!("expected CascadeIncomplete, got {other:?}"),
        }

        // Completed steps are not rolled back; later steps never ran
        assert!(records.get_family(&fid).await.unwrap().is_none());
        assert_eq!(records.statements_by_family(&fid).await.unwrap().len(), 1);
        assert_eq!(records.activities_by_family(&fid, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_member_cascades() {
        let (records, _dir) = records();
        let (fid, _) = seed(&records).await;
        let member = records.members_by_family(&fid).await.unwrap().remove(0);

        let report = records.delete_member(member.app_id().unwrap()).await.unwrap();
        assert_eq!(
            report.steps.iter().map(|s| s.collection.as_str()).collect::<Vec<_>>(),
            vec![MEMBERS, SUBSCRIPTIONS, STATEMENTS]
        );
        assert_eq!(report.total(), 3);
        assert!(records.subscriptions_by_family(&fid).await.unwrap().is_empty());
        // Family-level records survive
        assert_eq!(records.price_plans_by_family(&fid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_smith_family_round_trip() {
        let (records, _dir) = records();
        let created = records
            .create_family(Document::new().with("name", "Smith Family"))
            .await
            .unwrap();

        let fetched = records
            .get_family(created.engine_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.get_str("name"), Some("Smith Family"));
        assert!(fetched.contains("createdAt"));
        assert!(fetched.contains("updatedAt"));

        assert_eq!(
            records
                .update_family(created.app_id().unwrap(), Document::new().with("city", "Haifa"))
                .await
                .unwrap(),
            1
        );
        let updated = records.get_family(created.app_id().unwrap()).await.unwrap().unwrap();
        assert_eq!(updated.get_str("city"), Some("Haifa"));
        assert_eq!(updated.get_str("name"), Some("Smith Family"));
    }

    #[tokio::test]
    async fn test_price_plans() {
        let (records, _dir) = records();
        let plan = records
            .create_price_plan(Document::new().with("familyId", "f1").with("amount", 120))
            .await
            .unwrap();
        let id = plan.app_id().unwrap();

        assert_eq!(records.list_price_plans().await.unwrap().len(), 1);
        assert_eq!(
            records
                .update_price_plan(id, Document::new().with("amount", 150))
                .await
                .unwrap(),
            1
        );
        let updated = records.get_price_plan(id).await.unwrap().unwrap();
        assert_eq!(updated.get("amount"), Some(&serde_json::json!(150)));

        assert_eq!(records.delete_price_plan(id).await.unwrap(), 1);
        assert!(records.price_plans_by_family("f1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_members() {
        let (records, _dir) = records();
        for (first, phone) in [("Dana", "050-1234567"), ("Ron", "052-7654321"), ("Yael", "050.999")] {
            records
                .create_member(
                    Document::new()
                        .with("firstName", first)
                        .with("phone", phone)
                        .with("email", format!("{}@x.com", first.to_lowercase())),
                )
                .await
                .unwrap();
        }

        let page = records.search_members(1, 10, Some("050-")).await.unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.data[0].get_str("firstName"), Some("Dana"));

        let page = records.search_members(1, 10, Some("RON")).await.unwrap();
        assert_eq!(page.pagination.total, 1);

        assert_eq!(
            records.get_member_by_email("yael@x.com").await.unwrap().and_then(|m| m.get_str("firstName").map(str::to_string)),
            Some("Yael".to_string())
        );
        assert_eq!(records.list_members().await.unwrap().len(), 3);
    }
}
