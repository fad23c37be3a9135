//! CLI commands
//!
//! Each command is one facade or accessor call; the result is returned as
//! JSON for the caller to print.

use anyhow::Context;
use clap::Subcommand;
use serde_json::{json, Value};

use kasa_store::{Document, Filter, FindOptions, RecordStore, Records, SortOrder, StorageFacade};
use std::sync::Arc;

/// Operations exposed on the command line.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe backends, bind, and print the binding
    Status,

    /// Insert one document and print its identifier
    Insert {
        /// Collection name
        collection: String,
        /// Document as a JSON object
        document: String,
    },

    /// Print documents matching a filter
    Find {
        /// Collection name
        collection: String,
        /// Filter as a JSON object (default: everything)
        filter: Option<String>,
        /// Sort key; prefix with '-' for descending
        #[arg(long)]
        sort: Option<String>,
        /// Number of matches to skip
        #[arg(long)]
        skip: Option<usize>,
        /// Maximum number of matches
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Merge a patch into every matching document
    Update {
        /// Collection name
        collection: String,
        /// Filter as a JSON object
        filter: String,
        /// Fields to set, as a JSON object
        patch: String,
    },

    /// Delete every matching document
    Delete {
        /// Collection name
        collection: String,
        /// Filter as a JSON object
        filter: String,
    },

    /// Count matching documents
    Count {
        /// Collection name
        collection: String,
        /// Filter as a JSON object (default: everything)
        filter: Option<String>,
    },

    /// Delete a family and everything keyed on it
    DeleteFamily {
        /// Family identifier (application `id` or engine `_id`)
        id: String,
    },
}

/// Run one command against the facade.
pub async fn run(command: Command, facade: &Arc<StorageFacade>) -> anyhow::Result<Value> {
    let output = match command {
        Command::Status => {
            facade.init().await;
            serde_json::to_value(facade.status())?
        }
        Command::Insert {
            collection,
            document,
        } => {
            let document = parse_document(&document)?;
            let id = facade.insert(&collection, document).await?;
            json!({ "id": id })
        }
        Command::Find {
            collection,
            filter,
            sort,
            skip,
            limit,
        } => {
            let filter = parse_filter(filter.as_deref())?;
            let options = find_options(sort.as_deref(), skip, limit);
            let documents = facade.find(&collection, &filter, &options).await?;
            serde_json::to_value(documents)?
        }
        Command::Update {
            collection,
            filter,
            patch,
        } => {
            let filter = parse_filter(Some(&filter))?;
            let patch = parse_document(&patch)?;
            let modified = facade.update(&collection, &filter, patch).await?;
            json!({ "modified": modified })
        }
        Command::Delete { collection, filter } => {
            let filter = parse_filter(Some(&filter))?;
            let deleted = facade.delete(&collection, &filter).await?;
            json!({ "deleted": deleted })
        }
        Command::Count { collection, filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let count = facade.count(&collection, &filter).await?;
            json!({ "count": count })
        }
        Command::DeleteFamily { id } => {
            let records = Records::new(Arc::clone(facade));
            let report = records.delete_family(&id).await?;
            serde_json::to_value(report)?
        }
    };

    tracing::debug!(backend = ?facade.backend_kind(), "command complete");
    Ok(output)
}

fn parse_document(text: &str) -> anyhow::Result<Document> {
    let value: Value = serde_json::from_str(text).context("document is not valid JSON")?;
    Ok(Document::from_value(value)?)
}

fn parse_filter(text: Option<&str>) -> anyhow::Result<Filter> {
    let Some(text) = text else {
        return Ok(Filter::all());
    };
    let value: Value = serde_json::from_str(text).context("filter is not valid JSON")?;
    Ok(Filter::from_json(&value)?)
}

fn find_options(sort: Option<&str>, skip: Option<usize>, limit: Option<usize>) -> FindOptions {
    let mut options = FindOptions::new();
    if let Some(sort) = sort {
        options = match sort.strip_prefix('-') {
            Some(field) => options.sort_by(field, SortOrder::Descending),
            None => options.sort_by(sort, SortOrder::Ascending),
        };
    }
    if let Some(skip) = skip {
        options = options.skip(skip);
    }
    if let Some(limit) = limit {
        options = options.limit(limit);
    }
    options
}
