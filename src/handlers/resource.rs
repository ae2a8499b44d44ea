//! Resource operations: each one runs through the CRUD executor and builds the response intent.

use crate::config::{ResourceDefinition, Verb};
use crate::error::AppError;
use crate::response::{ResponseEnvelope, ResponseIntent};
use crate::service::{CrudExecutor, Filter, NormalizedPayload, QueryPlan};
use crate::state::AppState;
use crate::store::DocumentStore;
use std::time::Instant;

/// The store call a request resolved to, with everything it needs already compiled.
#[derive(Debug)]
pub enum Operation {
    List(QueryPlan),
    ReadOne(QueryPlan),
    Create(NormalizedPayload),
    Update { filter: Filter, payload: NormalizedPayload },
    Delete(Filter),
}

/// Per-request context. Created by dispatch after validation succeeded; never shared.
#[derive(Debug)]
pub struct RequestContext<'a> {
    pub resource: &'a ResourceDefinition,
    pub verb: Verb,
    pub operation: Operation,
    pub started: Instant,
}

pub async fn execute(state: &AppState, ctx: RequestContext<'_>) -> Result<ResponseIntent, AppError> {
    let store = state.store.as_ref();
    let collection = ctx.resource.name.as_str();
    tracing::debug!(resource = %collection, verb = ?ctx.verb, "executing");
    match ctx.operation {
        Operation::List(plan) => list(store, collection, &plan, ctx.started).await,
        Operation::ReadOne(plan) => read_one(store, collection, &plan, ctx.started).await,
        Operation::Create(payload) => create(store, collection, payload).await,
        Operation::Update { filter, payload } => update(store, collection, &filter, payload).await,
        Operation::Delete(filter) => delete(store, collection, &filter).await,
    }
}

pub async fn list(
    store: &dyn DocumentStore,
    collection: &str,
    plan: &QueryPlan,
    started: Instant,
) -> Result<ResponseIntent, AppError> {
    let items = CrudExecutor::find(store, collection, plan).await?;
    Ok(ResponseIntent::envelope(ResponseEnvelope::from_items(items, started)))
}

/// A missing document is an empty envelope, not a 404.
pub async fn read_one(
    store: &dyn DocumentStore,
    collection: &str,
    plan: &QueryPlan,
    started: Instant,
) -> Result<ResponseIntent, AppError> {
    let item = CrudExecutor::find_one(store, collection, plan).await?;
    Ok(ResponseIntent::envelope(ResponseEnvelope::from_single(item, started)))
}

pub async fn create(
    store: &dyn DocumentStore,
    collection: &str,
    payload: NormalizedPayload,
) -> Result<ResponseIntent, AppError> {
    let document = CrudExecutor::insert(store, collection, payload).await?;
    tracing::info!(resource = %collection, "document created");
    Ok(ResponseIntent::created(document))
}

pub async fn update(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Filter,
    payload: NormalizedPayload,
) -> Result<ResponseIntent, AppError> {
    let outcome = CrudExecutor::update(store, collection, filter, payload).await?;
    Ok(ResponseIntent::updated(outcome))
}

pub async fn delete(store: &dyn DocumentStore, collection: &str, filter: &Filter) -> Result<ResponseIntent, AppError> {
    let outcome = CrudExecutor::delete(store, collection, filter).await?;
    tracing::info!(resource = %collection, removed = outcome.n, "documents deleted");
    Ok(ResponseIntent::deleted(outcome))
}
