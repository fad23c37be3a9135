//! User and session accessors.

use crate::storage::{Document, Filter, FindOptions, RecordStore, SortOrder, StorageResult};

use super::collections::{SESSIONS, USERS};
use super::{strip_field, Page, Records};

const PASSWORD_FIELD: &str = "password";
const SESSION_TOKEN_FIELD: &str = "sessionToken";

/// Fields a user search matches against.
const USER_SEARCH_FIELDS: [&str; 4] = ["firstName", "lastName", "email", "company"];

impl Records {
    // =========================================================================
    // Users
    // =========================================================================

    /// User by application or engine identifier.
    pub async fn get_user(&self, id: &str) -> StorageResult<Option<Document>> {
        self.resolve(USERS, id).await
    }

    /// User by exact email.
    pub async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<Document>> {
        self.store.find_one(USERS, &Filter::eq("email", email)).await
    }

    /// Create a user. `isActive` defaults to true, `emailVerified` to false.
    pub async fn create_user(&self, mut user: Document) -> StorageResult<Document> {
        if !user.contains("isActive") {
            user.insert("isActive", true);
        }
        if !user.contains("emailVerified") {
            user.insert("emailVerified", false);
        }
        self.create(USERS, user).await
    }

    /// Patch a user. Returns the number of records modified (0 or 1).
    pub async fn update_user(&self, id: &str, patch: Document) -> StorageResult<u64> {
        self.update_by_id(USERS, id, patch).await
    }

    /// Delete a user. Returns the number of records removed (0 or 1).
    pub async fn delete_user(&self, id: &str) -> StorageResult<u64> {
        self.delete_by_id(USERS, id).await
    }

    /// Every user, unordered.
    pub async fn list_users(&self) -> StorageResult<Vec<Document>> {
        self.find_all(USERS, &Filter::all()).await
    }

    /// Newest users first, optionally narrowed by a case-insensitive
    /// substring over name, email and company. Passwords are never returned.
    pub async fn search_users(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> StorageResult<Page<Document>> {
        let filter = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => Filter::any_of(
                USER_SEARCH_FIELDS
                    .iter()
                    .map(|field| Filter::contains(*field, text))
                    .collect(),
            ),
            None => Filter::all(),
        };
        let options = FindOptions::new().sort_by("createdAt", SortOrder::Descending);

        let mut page = self.page(USERS, &filter, options, page, limit).await?;
        strip_field(&mut page.data, PASSWORD_FIELD);
        Ok(page)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Store a session. Returns its engine identifier.
    pub async fn create_session(&self, session: Document) -> StorageResult<String> {
        self.store.insert(SESSIONS, session).await
    }

    /// Session by its token.
    pub async fn get_session_by_token(&self, token: &str) -> StorageResult<Option<Document>> {
        self.store
            .find_one(SESSIONS, &Filter::eq(SESSION_TOKEN_FIELD, token))
            .await
    }

    /// Remove every session with this token.
    pub async fn delete_session(&self, token: &str) -> StorageResult<u64> {
        self.store
            .delete(SESSIONS, &Filter::eq(SESSION_TOKEN_FIELD, token))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{BackendProber, StorageFacade};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn records() -> (Records, TempDir) {
        let dir = tempdir().unwrap();
        let facade = StorageFacade::new(BackendProber::new(dir.path()));
        (Records::new(Arc::new(facade)), dir)
    }

    fn user(first: &str, email: &str) -> Document {
        Document::from_value(json!({
            "firstName": first,
            "email": email,
            "password": "$2b$10$hash",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_user_defaults() {
        let (records, _dir) = records();
        let created = records.create_user(user("Dana", "dana@x.com")).await.unwrap();

        assert_eq!(created.get("isActive"), Some(&json!(true)));
        assert_eq!(created.get("emailVerified"), Some(&json!(false)));
        assert!(created.app_id().is_some());

        let explicit = records
            .create_user(user("Ron", "ron@x.com").with("isActive", false))
            .await
            .unwrap();
        assert_eq!(explicit.get("isActive"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_get_user_by_either_id() {
        let (records, _dir) = records();
        let created = records.create_user(user("Dana", "dana@x.com")).await.unwrap();

        let by_app = records.get_user(created.app_id().unwrap()).await.unwrap();
        let by_engine = records.get_user(created.engine_id().unwrap()).await.unwrap();
        assert_eq!(by_app, by_engine);
        assert_eq!(
            records
                .get_user_by_email("dana@x.com")
                .await
                .unwrap()
                .and_then(|u| u.app_id().map(str::to_string)),
            created.app_id().map(str::to_string)
        );
    }

    #[tokio::test]
    async fn test_update_missing_user_changes_nothing() {
        let (records, _dir) = records();
        let modified = records
            .update_user("ghost", Document::new().with("role", "admin"))
            .await
            .unwrap();

        assert_eq!(modified, 0);
        assert!(records.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_user() {
        let (records, _dir) = records();
        let created = records.create_user(user("Dana", "dana@x.com")).await.unwrap();
        let id = created.engine_id().unwrap();

        assert_eq!(
            records
                .update_user(id, Document::new().with("role", "admin"))
                .await
                .unwrap(),
            1
        );
        let updated = records.get_user(id).await.unwrap().unwrap();
        assert_eq!(updated.get_str("role"), Some("admin"));
        assert_eq!(updated.get_str("email"), Some("dana@x.com"));

        assert_eq!(records.delete_user(id).await.unwrap(), 1);
        assert_eq!(records.get_user(id).await.unwrap(), None);
        assert_eq!(records.delete_user(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_users_pages_and_strips_passwords() {
        let (records, _dir) = records();
        for (i, name) in ["Dana", "Daniel", "Ron", "Adan"].iter().enumerate() {
            records
                .create_user(
                    user(name, &format!("{}@x.com", name.to_lowercase()))
                        .with("createdAt", format!("2026-01-0{}T00:00:00.000Z", i + 1)),
                )
                .await
                .unwrap();
        }

        let page = records.search_users(1, 2, Some("dan")).await.unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        let names: Vec<&str> = page.data.iter().filter_map(|u| u.get_str("firstName")).collect();
        assert_eq!(names, vec!["Adan", "Daniel"]);
        assert!(page.data.iter().all(|u| !u.contains("password")));

        let all = records.search_users(1, 10, None).await.unwrap();
        assert_eq!(all.pagination.total, 4);

        // Regex metacharacters are matched literally
        let none = records.search_users(1, 10, Some("d.n")).await.unwrap();
        assert_eq!(none.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_sessions() {
        let (records, _dir) = records();
        records
            .create_session(Document::new().with("sessionToken", "tok-1").with("userId", "u1"))
            .await
            .unwrap();

        let session = records.get_session_by_token("tok-1").await.unwrap().unwrap();
        assert_eq!(session.get_str("userId"), Some("u1"));
        assert!(session.contains("createdAt"));

        assert_eq!(records.delete_session("tok-1").await.unwrap(), 1);
        assert!(records.get_session_by_token("tok-1").await.unwrap().is_none());
    }
}
