//! Abstract document-collection interface and its backends.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

use crate::error::StoreError;
use crate::service::{Filter, QueryPlan};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;

/// Result of a write that touched documents by filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub ok: u8,
    /// Documents matched by the filter.
    pub n: u64,
}

impl WriteOutcome {
    pub fn matched(n: u64) -> Self {
        WriteOutcome { ok: 1, n }
    }
}

/// Collection operations every backend provides. Documents carry native values
/// (see [`crate::document`]); projection, sort and paging follow the plan.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, StoreError>;

    async fn find_one(&self, collection: &str, plan: &QueryPlan) -> Result<Option<Value>, StoreError> {
        let mut single = plan.clone();
        single.limit = 1;
        single.skip = 0;
        Ok(self.find(collection, &single).await?.into_iter().next())
    }

    /// Store one document as given; returns it.
    async fn insert(&self, collection: &str, document: Map<String, Value>) -> Result<Value, StoreError>;

    /// Replace the first matching document. `_id` and `created` carry over when the
    /// replacement omits them.
    async fn replace(
        &self,
        collection: &str,
        filter: &Filter,
        document: Map<String, Value>,
    ) -> Result<WriteOutcome, StoreError>;

    /// Remove every matching document.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome, StoreError>;
}

/// One-time readiness flag for the shared store connection.
#[derive(Clone, Debug)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        ReadySignal { tx: Arc::new(tx) }
    }

    /// Already-fired signal, for stores that need no connection.
    pub fn ready() -> Self {
        let signal = Self::new();
        signal.mark_ready();
        signal
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
