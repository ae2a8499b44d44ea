//! Builds parameterized SQL over JSONB document tables from query plans and filters.
//!
//! Each collection is a table `(seq BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL)`.

use crate::service::{Condition, Filter, QueryPlan};
use serde_json::Value;

/// A value bound to a statement placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
    /// Field path for `#>` / `#>>`, e.g. `{address,city}`.
    Path(Vec<String>),
}

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, collection: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(collection))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: SqlParam) -> usize {
        self.params.push(v);
        self.params.len()
    }

    fn push_path(&mut self, field: &str) -> usize {
        self.push_param(SqlParam::Path(field.split('.').map(str::to_string).collect()))
    }
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema))
}

pub fn create_collection(schema: &str, collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (seq BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL)",
        qualified_table(schema, collection)
    )
}

/// WHERE clause (with leading space) for a filter; empty for a match-all filter.
fn where_clause(q: &mut QueryBuf, filter: &Filter) -> String {
    let mut parts = Vec::new();
    for term in &filter.terms {
        let path = q.push_path(&term.field);
        match &term.condition {
            Condition::Equals(v) => {
                let value = q.push_param(SqlParam::Json(v.clone()));
                // arrays match when any element is equal
                parts.push(format!(
                    "(doc #> ${path} = ${value}::jsonb OR (jsonb_typeof(doc #> ${path}) = 'array' AND doc #> ${path} @> jsonb_build_array(${value}::jsonb)))"
                ));
            }
            Condition::Pattern(p) => {
                let pattern = q.push_param(SqlParam::Text(p.clone()));
                parts.push(format!("doc #>> ${} ~* ${}", path, pattern));
            }
        }
    }
    if let Some(text) = &filter.text {
        let n = q.push_param(SqlParam::Text(text.clone()));
        parts.push(format!(
            "jsonb_to_tsvector('simple', doc, '[\"string\"]') @@ phraseto_tsquery('simple', ${})",
            n
        ));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT for a read plan: filter, then sort (insertion order breaks ties), limit, offset.
/// Projection is applied to the fetched documents by the caller.
pub fn select_documents(schema: &str, collection: &str, plan: &QueryPlan) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let where_sql = where_clause(&mut q, &plan.filter);
    let mut order = Vec::with_capacity(plan.sort.len() + 1);
    for (field, dir) in &plan.sort {
        let path = q.push_path(field);
        order.push(format!("doc #> ${} {} NULLS FIRST", path, dir.as_sql()));
    }
    order.push("seq ASC".to_string());
    let limit_clause = if plan.limit > 0 {
        format!(" LIMIT {}", plan.limit)
    } else {
        String::new()
    };
    let offset_clause = if plan.skip > 0 {
        format!(" OFFSET {}", plan.skip)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT doc FROM {}{} ORDER BY {}{}{}",
        table,
        where_sql,
        order.join(", "),
        limit_clause,
        offset_clause
    );
    q
}

pub fn insert_document(schema: &str, collection: &str, doc: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(SqlParam::Json(doc));
    q.sql = format!(
        "INSERT INTO {} (doc) VALUES (${}::jsonb)",
        qualified_table(schema, collection),
        n
    );
    q
}

/// Whole-document replace of the first match; `_id` and `created` carry over when omitted.
pub fn replace_document(schema: &str, collection: &str, filter: &Filter, doc: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let n = q.push_param(SqlParam::Json(doc));
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!(
        "UPDATE {table} SET doc = jsonb_strip_nulls(jsonb_build_object('_id', doc -> '_id', 'created', doc -> 'created')) || ${n}::jsonb \
         WHERE seq = (SELECT seq FROM {table}{where_sql} ORDER BY seq LIMIT 1)"
    );
    q
}

pub fn delete_documents(schema: &str, collection: &str, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, collection);
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!("DELETE FROM {}{}", table, where_sql);
    q
}
