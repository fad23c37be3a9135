//! Filter - Query AST shared by every backend
//!
//! TigerStyle: One set of operator semantics. The embedded store evaluates
//! a compiled [`Predicate`] in memory; the database client translates the
//! same tree into native query syntax.
//!
//! Matching follows document-database rules so both backends agree:
//! - equality against an array field matches if any element is equal
//! - numbers compare by value (`1` equals `1.0`)
//! - `null` matches a missing field
//! - regex only matches strings (or string elements of arrays)

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::constants::{ENGINE_ID_FIELD, FILTER_DEPTH_MAX, FILTER_PATTERN_BYTES_MAX};

use super::document::Document;
use super::error::{StorageError, StorageResult};

// =============================================================================
// Filter AST
// =============================================================================

/// A query over documents in one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,
    /// Field (dotted path) equals value
    Equals {
        /// Field path
        field: String,
        /// Expected value
        value: Value,
    },
    /// Field (dotted path) is a string matching a regular expression
    Matches {
        /// Field path
        field: String,
        /// Regular expression
        pattern: String,
        /// Ignore case
        case_insensitive: bool,
    },
    /// Engine-native identifier equals the given id
    EngineId(String),
    /// Every sub-filter matches
    And(Vec<Filter>),
    /// At least one sub-filter matches
    AnyOf(Vec<Filter>),
}

impl Filter {
    /// Match every document.
    #[must_use]
    pub fn all() -> Self {
        Self::All
    }

    /// Field equals value.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field matches a case-sensitive regular expression.
    #[must_use]
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    /// Field contains `text`, ignoring case. `text` is matched literally.
    #[must_use]
    pub fn contains(field: impl Into<String>, text: &str) -> Self {
        Self::Matches {
            field: field.into(),
            pattern: regex::escape(text),
            case_insensitive: true,
        }
    }

    /// Field starts with `text` (case-sensitive, literal).
    #[must_use]
    pub fn starts_with(field: impl Into<String>, text: &str) -> Self {
        Self::Matches {
            field: field.into(),
            pattern: format!("^{}", regex::escape(text)),
            case_insensitive: false,
        }
    }

    /// Engine-native identifier lookup.
    #[must_use]
    pub fn engine_id(id: impl Into<String>) -> Self {
        Self::EngineId(id.into())
    }

    /// Logical OR across sub-filters. An empty list matches nothing.
    #[must_use]
    pub fn any_of(filters: Vec<Filter>) -> Self {
        Self::AnyOf(filters)
    }

    /// Combine with another filter; both must match.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), f) => {
                left.push(f);
                Self::And(left)
            }
            (f, Self::And(mut right)) => {
                right.insert(0, f);
                Self::And(right)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Parse the JSON filter shape callers use:
    /// `{"field": value, "field": {"$regex": p, "$options": "i"}, "$or": [..], "$and": [..]}`.
    ///
    /// # Errors
    /// Returns `InvalidFilter` for unknown operators or malformed shapes.
    pub fn from_json(value: &Value) -> StorageResult<Self> {
        parse_object(value, 0)
    }

    /// Compile into an in-memory predicate.
    ///
    /// # Errors
    /// Returns `InvalidFilter` if a pattern does not compile.
    pub fn compile(&self) -> StorageResult<Predicate> {
        Ok(Predicate {
            node: compile_node(self)?,
        })
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::All
    }
}

// =============================================================================
// JSON Parsing
// =============================================================================

fn parse_object(value: &Value, depth: usize) -> StorageResult<Filter> {
    if depth > FILTER_DEPTH_MAX {
        return Err(StorageError::invalid_filter(format!(
            "nesting exceeds {FILTER_DEPTH_MAX} levels"
        )));
    }
    let Value::Object(map) = value else {
        return Err(StorageError::invalid_filter("filter must be a JSON object"));
    };

    let mut clauses = Vec::with_capacity(map.len());
    for (key, val) in map {
        let clause = match key.as_str() {
            "$or" => Filter::AnyOf(parse_list(key, val, depth)?),
            "$and" => Filter::And(parse_list(key, val, depth)?),
            op if op.starts_with('$') => {
                return Err(StorageError::invalid_filter(format!(
                    "unsupported operator {op}"
                )));
            }
            field => parse_field(field, val)?,
        };
        clauses.push(clause);
    }

    Ok(match clauses.len() {
        0 => Filter::All,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_list(op: &str, value: &Value, depth: usize) -> StorageResult<Vec<Filter>> {
    let Value::Array(items) = value else {
        return Err(StorageError::invalid_filter(format!("{op} expects an array")));
    };
    items.iter().map(|item| parse_object(item, depth + 1)).collect()
}

fn parse_field(field: &str, value: &Value) -> StorageResult<Filter> {
    match value {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            parse_operators(field, ops)
        }
        Value::String(id) if field == ENGINE_ID_FIELD => Ok(Filter::EngineId(id.clone())),
        other => Ok(Filter::eq(field, other.clone())),
    }
}

fn parse_operators(field: &str, ops: &Map<String, Value>) -> StorageResult<Filter> {
    if let Some(expected) = ops.get("$eq") {
        if ops.len() != 1 {
            return Err(StorageError::invalid_filter(format!(
                "{field}: $eq cannot be combined with other operators"
            )));
        }
        return parse_field(field, expected);
    }

    let Some(pattern) = ops.get("$regex") else {
        let names: Vec<&str> = ops.keys().map(String::as_str).collect();
        return Err(StorageError::invalid_filter(format!(
            "{field}: unsupported operators {names:?}"
        )));
    };
    let Value::String(pattern) = pattern else {
        return Err(StorageError::invalid_filter(format!(
            "{field}: $regex expects a string"
        )));
    };

    let mut case_insensitive = false;
    for (key, val) in ops {
        match key.as_str() {
            "$regex" => {}
            "$options" => {
                let options = val.as_str().ok_or_else(|| {
                    StorageError::invalid_filter(format!("{field}: $options expects a string"))
                })?;
                for flag in options.chars() {
                    match flag {
                        'i' => case_insensitive = true,
                        other => {
                            return Err(StorageError::invalid_filter(format!(
                                "{field}: unsupported regex option {other:?}"
                            )));
                        }
                    }
                }
            }
            other => {
                return Err(StorageError::invalid_filter(format!(
                    "{field}: {other} cannot be combined with $regex"
                )));
            }
        }
    }

    Ok(Filter::Matches {
        field: field.to_string(),
        pattern: pattern.clone(),
        case_insensitive,
    })
}

// =============================================================================
// Predicate (in-memory evaluation)
// =============================================================================

/// A compiled filter, ready to test documents.
#[derive(Debug, Clone)]
pub struct Predicate {
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    All,
    Equals { field: String, value: Value },
    Matches { field: String, regex: Regex },
    EngineId(String),
    And(Vec<Node>),
    AnyOf(Vec<Node>),
}

impl Predicate {
    /// Test one document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        eval(&self.node, doc)
    }
}

fn compile_node(filter: &Filter) -> StorageResult<Node> {
    Ok(match filter {
        Filter::All => Node::All,
        Filter::Equals { field, value } => Node::Equals {
            field: field.clone(),
            value: value.clone(),
        },
        Filter::Matches {
            field,
            pattern,
            case_insensitive,
        } => {
            if pattern.len() > FILTER_PATTERN_BYTES_MAX {
                return Err(StorageError::invalid_filter(format!(
                    "{field}: pattern {} bytes exceeds max {FILTER_PATTERN_BYTES_MAX}",
                    pattern.len()
                )));
            }
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| StorageError::invalid_filter(format!("{field}: {e}")))?;
            Node::Matches {
                field: field.clone(),
                regex,
            }
        }
        Filter::EngineId(id) => Node::EngineId(id.clone()),
        Filter::And(filters) => Node::And(
            filters
                .iter()
                .map(compile_node)
                .collect::<StorageResult<_>>()?,
        ),
        Filter::AnyOf(filters) => Node::AnyOf(
            filters
                .iter()
                .map(compile_node)
                .collect::<StorageResult<_>>()?,
        ),
    })
}

fn eval(node: &Node, doc: &Document) -> bool {
    match node {
        Node::All => true,
        Node::Equals { field, value } => field_equals(doc.get_path(field), value),
        Node::Matches { field, regex } => match doc.get_path(field) {
            Some(Value::String(s)) => regex.is_match(s),
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| item.as_str().is_some_and(|s| regex.is_match(s))),
            _ => false,
        },
        Node::EngineId(id) => doc.engine_id() == Some(id.as_str()),
        Node::And(nodes) => nodes.iter().all(|n| eval(n, doc)),
        Node::AnyOf(nodes) => nodes.iter().any(|n| eval(n, doc)),
    }
}

fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(actual) => {
            values_equal(actual, expected)
                || matches!(actual, Value::Array(items)
                    if !expected.is_array() && items.iter().any(|item| values_equal(item, expected)))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Order two field values for sorting: missing/null, numbers, strings,
/// objects, arrays, booleans.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
