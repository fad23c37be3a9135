//! Document - Schema-less records
//!
//! TigerStyle: Explicit field names, one place for identifier and
//! timestamp rules so every backend stamps the same way.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::{
    APP_ID_FIELD, CREATED_AT_FIELD, ENGINE_ID_FIELD, ID_SUFFIX_CHARS_COUNT, UPDATED_AT_FIELD,
};

use super::error::{StorageError, StorageResult};

// =============================================================================
// Document
// =============================================================================

/// One record in a collection: field name to JSON value.
///
/// The storage layer never interprets fields beyond the identifier and
/// timestamp conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value, which must be an object.
    ///
    /// # Errors
    /// Returns a validation error for any non-object value.
    pub fn from_value(value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StorageError::validation(format!(
                "document must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Add a field, builder style.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Get a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a field by dotted path (`address.city`).
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Get a top-level string field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Whether a top-level field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Engine-native identifier, if present as a string.
    #[must_use]
    pub fn engine_id(&self) -> Option<&str> {
        self.get_str(ENGINE_ID_FIELD)
    }

    /// Application identifier, if present as a string.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.get_str(APP_ID_FIELD)
    }

    /// Merge a patch: every field of `patch` overwrites the same field here.
    ///
    /// Dotted keys (`address.city`) address nested fields, creating missing
    /// intermediate objects, the same way a document database `$set` does.
    ///
    /// # Errors
    /// Returns a validation error when a path runs through a non-object
    /// value. The document may be partly patched when that happens.
    pub fn merge(&mut self, patch: &Document) -> StorageResult<()> {
        for (field, value) in &patch.0 {
            self.set_path(field, value.clone())?;
        }
        Ok(())
    }

    /// Set a field by dotted path, creating intermediate objects.
    ///
    /// # Errors
    /// Returns a validation error when an intermediate value exists and is
    /// not an object.
    pub fn set_path(&mut self, path: &str, value: Value) -> StorageResult<()> {
        let Some((parents, leaf)) = path.rsplit_once('.') else {
            self.0.insert(path.to_string(), value);
            return Ok(());
        };

        let mut current = &mut self.0;
        for part in parents.split('.') {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match slot {
                Value::Object(map) => map,
                other => {
                    return Err(StorageError::validation(format!(
                        "cannot set {path}: {part} is a {}, not an object",
                        json_type_name(other)
                    )))
                }
            };
        }
        current.insert(leaf.to_string(), value);
        Ok(())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = StorageError;

    fn try_from(value: Value) -> StorageResult<Self> {
        Self::from_value(value)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Current time as stored in documents (RFC 3339, UTC, milliseconds).
#[must_use]
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Stamp creation and update timestamps unless the caller set them.
pub(crate) fn stamp_created(doc: &mut Document, now: &str) {
    if !doc.contains(CREATED_AT_FIELD) {
        doc.insert(CREATED_AT_FIELD, now);
    }
    if !doc.contains(UPDATED_AT_FIELD) {
        doc.insert(UPDATED_AT_FIELD, now);
    }
}

/// Validate a partial update and re-stamp its update timestamp.
///
/// The engine identifier is immutable on every backend. Keys are field
/// paths: operator (`$`) segments and empty segments are rejected so no
/// backend interprets them differently.
pub(crate) fn prepare_patch(mut patch: Document, now: &str) -> StorageResult<Document> {
    for field in patch.0.keys() {
        if field.split('.').next() == Some(ENGINE_ID_FIELD) {
            return Err(StorageError::validation(format!(
                "update may not modify {ENGINE_ID_FIELD}"
            )));
        }
        if field
            .split('.')
            .any(|part| part.is_empty() || part.starts_with('$'))
        {
            return Err(StorageError::validation(format!(
                "invalid update field path: {field:?}"
            )));
        }
    }
    patch.insert(UPDATED_AT_FIELD, now);
    Ok(patch)
}

// =============================================================================
// Identifier Generation
// =============================================================================

/// Generates `<millis><hex suffix>` identifiers.
///
/// The millisecond part never repeats or goes backwards within one
/// generator, so two ids from the same generator never collide even when
/// minted in the same millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_ms: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next identifier.
    pub fn next_id(&self) -> String {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut prev = self.last_ms.load(Ordering::Acquire);
        let ms = loop {
            let candidate = now_ms.max(prev + 1);
            match self.last_ms.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break candidate,
                Err(actual) => prev = actual,
            }
        };

        format!(
            "{}{}",
            ms,
            &Uuid::new_v4().simple().to_string()[..ID_SUFFIX_CHARS_COUNT]
        )
    }
}
