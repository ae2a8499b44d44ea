//! PostgreSQL backend: one JSONB table per collection.

use super::{DocumentStore, ReadySignal, WriteOutcome};
use crate::error::StoreError;
use crate::service::{Filter, QueryPlan};
use crate::sql::{
    create_collection, create_schema, delete_documents, insert_document, replace_document, select_documents,
    QueryBuf, SqlParam,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row};

#[derive(Clone, Debug)]
pub struct PgDocumentStore {
    pool: PgPool,
    schema: String,
}

impl PgDocumentStore {
    /// Build the store without connecting; the pool connects on first use.
    pub fn connect_lazy(database_url: &str, schema: impl Into<String>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(database_url)?;
        Ok(Self::from_pool(pool, schema))
    }

    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        PgDocumentStore {
            pool,
            schema: schema.into(),
        }
    }

    /// Create the schema and one table per collection, then fire `ready`.
    pub async fn prepare<'a>(
        &self,
        collections: impl IntoIterator<Item = &'a str>,
        ready: &ReadySignal,
    ) -> Result<(), StoreError> {
        let ddl = create_schema(&self.schema);
        tracing::debug!(sql = %ddl, "ddl");
        sqlx::query(&ddl).execute(&self.pool).await?;
        for collection in collections {
            let ddl = create_collection(&self.schema, collection);
            tracing::debug!(sql = %ddl, "ddl");
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        ready.mark_ready();
        tracing::info!(schema = %self.schema, "document store ready");
        Ok(())
    }

    async fn execute(&self, q: QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let result = bind_all(sqlx::query(&q.sql), &q.params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for p in params {
        query = match p {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Json(v) => query.bind(sqlx::types::Json(v.clone())),
            SqlParam::Path(parts) => query.bind(parts.clone()),
        };
    }
    query
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, StoreError> {
        let q = select_documents(&self.schema, collection, plan);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(sqlx::query(&q.sql), &q.params).fetch_all(&self.pool).await?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let doc: Value = row.try_get("doc")?;
            docs.push(plan.projection.apply(doc));
        }
        Ok(docs)
    }

    async fn insert(&self, collection: &str, document: Map<String, Value>) -> Result<Value, StoreError> {
        let doc = Value::Object(document);
        self.execute(insert_document(&self.schema, collection, doc.clone())).await?;
        Ok(doc)
    }

    async fn replace(
        &self,
        collection: &str,
        filter: &Filter,
        document: Map<String, Value>,
    ) -> Result<WriteOutcome, StoreError> {
        let n = self
            .execute(replace_document(&self.schema, collection, filter, Value::Object(document)))
            .await?;
        Ok(WriteOutcome::matched(n))
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome, StoreError> {
        let n = self.execute(delete_documents(&self.schema, collection, filter)).await?;
        Ok(WriteOutcome::matched(n))
    }
}
