//! MongoStore - Document database backend
//!
//! TigerStyle: Same contract as the embedded store, native query engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MongoStore                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Client: mongodb::Client (pooled, shared by clones)          │
//! │  Filter AST  ──▶  BSON query ($regex, $or, $and, ObjectId)   │
//! │  Patch       ──▶  { $set: patch }  via update_many           │
//! │  ObjectId    ──▶  24-char hex string on the way out          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same client serves the remote and the local candidate; only the
//! connection string and probe bound differ.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, FindOptions as MongoFindOptions};
use mongodb::{Client, Collection, Database};
use serde_json::Value;

use crate::config::redact_uri;
use crate::constants::{ENGINE_ID_FIELD, PROBE_REMOTE_TIMEOUT_MS_DEFAULT};
use crate::selection::Connector;

use super::backend::{FindOptions, RecordStore, SortOrder};
use super::document::{prepare_patch, stamp_created, timestamp_now, Document};
use super::error::{StorageError, StorageResult};
use super::file::validate_collection;
use super::filter::Filter;

// =============================================================================
// MongoStore
// =============================================================================

/// Record store over a MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Wrap an already configured client.
    #[must_use]
    pub fn new(client: Client, database: &str) -> Self {
        assert!(!database.is_empty(), "database name must not be empty");
        let db = client.database(database);
        Self {
            client,
            database: db,
        }
    }

    /// Connect and verify with a ping.
    ///
    /// # Errors
    /// Returns a connection error if the server cannot be reached within
    /// `timeout`.
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> StorageResult<Self> {
        let client = build_client(uri, timeout).await?;
        let store = Self::new(client, database);
        store.ping().await?;
        Ok(store)
    }

    /// Round trip to the server.
    ///
    /// # Errors
    /// Returns a connection error if the server does not answer.
    pub async fn ping(&self) -> StorageResult<()> {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| StorageError::connection(format!("ping failed: {e}")))?;
        Ok(())
    }

    /// Create any of `names` that do not exist yet.
    ///
    /// # Errors
    /// Returns the first failure; collections created before it remain.
    pub async fn ensure_collections(&self, names: &[&str]) -> StorageResult<()> {
        let existing = self
            .database
            .list_collection_names(None)
            .await
            .map_err(read_error)?;

        for name in names {
            if existing.iter().any(|e| e == name) {
                continue;
            }
            self.database
                .create_collection(*name, None)
                .await
                .map_err(write_error)?;
            tracing::debug!(collection = *name, "created collection");
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> StorageResult<Collection<bson::Document>> {
        validate_collection(name)?;
        Ok(self.database.collection::<bson::Document>(name))
    }
}

async fn build_client(uri: &str, timeout: Duration) -> StorageResult<Client> {
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(|e| StorageError::connection(format!("invalid connection string: {e}")))?;
    options.server_selection_timeout = Some(timeout);
    options.connect_timeout = Some(timeout);
    options.app_name = Some("kasa".to_string());

    Client::with_options(options)
        .map_err(|e| StorageError::connection(format!("failed to create client: {e}")))
}

fn is_connection_error(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. }
    )
}

/// Connection-level failures map to `Connection`; everything else is a query error.
fn read_error(err: mongodb::error::Error) -> StorageError {
    if is_connection_error(&err) {
        StorageError::connection(err.to_string())
    } else {
        StorageError::read(err.to_string())
    }
}

fn write_error(err: mongodb::error::Error) -> StorageError {
    if is_connection_error(&err) {
        StorageError::connection(err.to_string())
    } else {
        StorageError::write(err.to_string())
    }
}

// =============================================================================
// Translation
// =============================================================================

fn to_bson(value: &Value) -> StorageResult<Bson> {
    bson::to_bson(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn to_bson_document(doc: &Document) -> StorageResult<bson::Document> {
    bson::to_document(doc.as_map()).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Engine documents back to plain JSON, ObjectIds as hex strings.
fn from_bson_document(mut doc: bson::Document) -> StorageResult<Document> {
    let hex = match doc.get(ENGINE_ID_FIELD) {
        Some(Bson::ObjectId(oid)) => Some(oid.to_hex()),
        _ => None,
    };
    if let Some(hex) = hex {
        doc.insert(ENGINE_ID_FIELD, hex);
    }
    Document::from_value(Bson::Document(doc).into_relaxed_extjson())
        .map_err(|e| StorageError::Deserialization(e.to_string()))
}

fn inserted_id_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.to_string(),
    }
}

/// Translate the filter AST into a MongoDB query document.
pub(crate) fn filter_to_bson(filter: &Filter) -> StorageResult<bson::Document> {
    Ok(match filter {
        Filter::All => bson::Document::new(),
        Filter::Equals { field, value } => {
            let mut query = bson::Document::new();
            query.insert(field.clone(), to_bson(value)?);
            query
        }
        Filter::Matches {
            field,
            pattern,
            case_insensitive,
        } => {
            let options = if *case_insensitive { "i" } else { "" };
            let mut query = bson::Document::new();
            query.insert(
                field.clone(),
                doc! { "$regex": pattern.as_str(), "$options": options },
            );
            query
        }
        // Callers may hold either the hex form of an ObjectId or an id they
        // supplied themselves as a string
        Filter::EngineId(id) => match ObjectId::parse_str(id) {
            Ok(oid) => doc! { ENGINE_ID_FIELD: { "$in": [oid, id.as_str()] } },
            Err(_) => doc! { ENGINE_ID_FIELD: id.as_str() },
        },
        Filter::And(filters) if filters.is_empty() => bson::Document::new(),
        Filter::And(filters) => doc! { "$and": sub_filters(filters)? },
        Filter::AnyOf(filters) if filters.is_empty() => {
            doc! { ENGINE_ID_FIELD: { "$exists": false } }
        }
        Filter::AnyOf(filters) => doc! { "$or": sub_filters(filters)? },
    })
}

fn sub_filters(filters: &[Filter]) -> StorageResult<Vec<Bson>> {
    filters
        .iter()
        .map(|f| filter_to_bson(f).map(Bson::Document))
        .collect()
}

fn find_options(options: &FindOptions) -> StorageResult<MongoFindOptions> {
    let mut native = MongoFindOptions::default();

    if !options.sort.is_empty() {
        let mut sort = bson::Document::new();
        for (field, order) in &options.sort {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            sort.insert(field.clone(), direction);
        }
        native.sort = Some(sort);
    }
    if let Some(skip) = options.skip {
        native.skip = Some(
            u64::try_from(skip).map_err(|_| StorageError::validation("skip out of range"))?,
        );
    }
    if let Some(limit) = options.limit {
        native.limit = Some(
            i64::try_from(limit).map_err(|_| StorageError::validation("limit out of range"))?,
        );
    }
    Ok(native)
}

// =============================================================================
// RecordStore Implementation
// =============================================================================

#[async_trait]
impl RecordStore for MongoStore {
    #[tracing::instrument(level = "debug", skip(self, document))]
    async fn insert(&self, collection: &str, mut document: Document) -> StorageResult<String> {
        let coll = self.collection(collection)?;
        stamp_created(&mut document, &timestamp_now());

        let result = coll
            .insert_one(to_bson_document(&document)?, None)
            .await
            .map_err(write_error)?;

        let id = inserted_id_string(result.inserted_id);

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
        let coll = self.collection(collection)?;
        filter.compile()?;

        let cursor = coll
            .find(filter_to_bson(filter)?, find_options(options)?)
            .await
            .map_err(read_error)?;
        let raw: Vec<bson::Document> = cursor
            .try_collect()
            .await
            .map_err(read_error)?;

        raw.into_iter().map(from_bson_document).collect()
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        let coll = self.collection(collection)?;
        filter.compile()?;

        coll.find_one(filter_to_bson(filter)?, None)
            .await
            .map_err(read_error)?
            .map(from_bson_document)
            .transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, filter, patch))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> StorageResult<u64> {
        let coll = self.collection(collection)?;
        filter.compile()?;
        let patch = prepare_patch(patch, &timestamp_now())?;

        let result = coll
            .update_many(
                filter_to_bson(filter)?,
                doc! { "$set": to_bson_document(&patch)? },
                None,
            )
            .await
            .map_err(write_error)?;
        Ok(result.modified_count)
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn delete(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let coll = self.collection(collection)?;
        filter.compile()?;

        let result = coll
            .delete_many(filter_to_bson(filter)?, None)
            .await
            .map_err(write_error)?;
        Ok(result.deleted_count)
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let coll = self.collection(collection)?;
        filter.compile()?;

        coll.count_documents(filter_to_bson(filter)?, None)
            .await
            .map_err(read_error)
    }

    async fn close(&self) -> StorageResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

// =============================================================================
// MongoConnector
// =============================================================================

/// Reaches a MongoDB deployment for the prober.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    uri: String,
    database: String,
    timeout: Duration,
    collections: Vec<String>,
}

impl MongoConnector {
    /// Connector for `uri`, using database `database`.
    #[must_use]
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            timeout: Duration::from_millis(PROBE_REMOTE_TIMEOUT_MS_DEFAULT),
            collections: Vec::new(),
        }
    }

    /// Driver-side server selection and connect timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Collections to create on connect if missing.
    #[must_use]
    pub fn with_collections(mut self, names: &[&str]) -> Self {
        self.collections = names.iter().map(|n| (*n).to_string()).collect();
        self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    fn target(&self) -> String {
        redact_uri(&self.uri)
    }

    async fn probe(&self) -> StorageResult<()> {
        let client = build_client(&self.uri, self.timeout).await?;
        let result = client
            .database(&self.database)
            .run_command(doc! { "ping": 1 }, None)
            .await;
        client.shutdown().await;

        result
            .map(|_| ())
            .map_err(|e| StorageError::connection(format!("ping failed: {e}")))
    }

    async fn connect(&self) -> StorageResult<Arc<dyn RecordStore>> {
        let store = MongoStore::connect(&self.uri, &self.database, self.timeout).await?;

        let names: Vec<&str> = self.collections.iter().map(String::as_str).collect();
        if let Err(e) = store.ensure_collections(&names).await {
            tracing::warn!(target = %self.target(), error = %e, "collection initialisation failed");
        }

        Ok(Arc::new(store))
    }
}
