//! Generic CRUD execution against a document store.

use crate::document::{oid_value, ObjectId};
use crate::error::AppError;
use crate::service::{Filter, NormalizedPayload, QueryPlan};
use crate::store::{DocumentStore, WriteOutcome};
use serde_json::Value;

pub struct CrudExecutor;

impl CrudExecutor {
    /// Filter, project, sort, limit, skip.
    pub async fn find(store: &dyn DocumentStore, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, AppError> {
        let docs = store.find(collection, plan).await.map_err(log_store_error)?;
        tracing::debug!(collection = %collection, count = docs.len(), "find");
        Ok(docs)
    }

    /// Single document by the plan's identifier filter. `None` when nothing matches.
    pub async fn find_one(
        store: &dyn DocumentStore,
        collection: &str,
        plan: &QueryPlan,
    ) -> Result<Option<Value>, AppError> {
        store.find_one(collection, plan).await.map_err(log_store_error)
    }

    /// Insert one document; a store key is generated when the payload has none.
    pub async fn insert(
        store: &dyn DocumentStore,
        collection: &str,
        payload: NormalizedPayload,
    ) -> Result<Value, AppError> {
        let mut document = payload.document;
        if !document.contains_key("_id") {
            document.insert("_id".into(), oid_value(&ObjectId::new()));
        }
        let doc = store.insert(collection, document).await.map_err(log_store_error)?;
        tracing::debug!(collection = %collection, "insert");
        Ok(doc)
    }

    /// Whole-document replace of the first match; no field-level merge.
    pub async fn update(
        store: &dyn DocumentStore,
        collection: &str,
        filter: &Filter,
        payload: NormalizedPayload,
    ) -> Result<WriteOutcome, AppError> {
        require_filter(filter, "update")?;
        let outcome = store
            .replace(collection, filter, payload.document)
            .await
            .map_err(log_store_error)?;
        tracing::debug!(collection = %collection, matched = outcome.n, "update");
        Ok(outcome)
    }

    pub async fn delete(store: &dyn DocumentStore, collection: &str, filter: &Filter) -> Result<WriteOutcome, AppError> {
        require_filter(filter, "delete")?;
        let outcome = store.delete(collection, filter).await.map_err(log_store_error)?;
        tracing::debug!(collection = %collection, removed = outcome.n, "delete");
        Ok(outcome)
    }
}

/// Writes by filter never address the whole collection.
fn require_filter(filter: &Filter, op: &str) -> Result<(), AppError> {
    if filter.is_empty() {
        return Err(AppError::BadRequest(format!("{} requires an identifier", op)));
    }
    Ok(())
}

fn log_store_error(e: crate::error::StoreError) -> AppError {
    tracing::error!(error = %e, "store operation failed");
    AppError::Store(e)
}
