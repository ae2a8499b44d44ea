//! In-process document store. Collections are created on first write.

use super::{DocumentStore, WriteOutcome};
use crate::config::SortDirection;
use crate::document::{compare_values, lookup, values_equal};
use crate::error::StoreError;
use crate::service::{Condition, Filter, QueryPlan};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (0 if it does not exist).
    pub async fn count(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map(Vec::len).unwrap_or(0)
    }
}

enum Matcher<'a> {
    Equals(&'a str, &'a Value),
    Pattern(&'a str, Regex),
}

/// Filter with regexes compiled once per call.
struct CompiledFilter<'a> {
    matchers: Vec<Matcher<'a>>,
    phrase: Option<Vec<String>>,
}

impl<'a> CompiledFilter<'a> {
    fn new(filter: &'a Filter) -> Result<Self, StoreError> {
        let mut matchers = Vec::with_capacity(filter.terms.len());
        for term in &filter.terms {
            matchers.push(match &term.condition {
                Condition::Equals(v) => Matcher::Equals(&term.field, v),
                Condition::Pattern(p) => Matcher::Pattern(&term.field, case_insensitive(p)?),
            });
        }
        Ok(CompiledFilter {
            matchers,
            phrase: filter.text.as_deref().map(words),
        })
    }

    fn matches(&self, doc: &Value) -> bool {
        let fields_match = self.matchers.iter().all(|m| match m {
            Matcher::Equals(field, expected) => lookup(doc, field)
                .map(|actual| values_equal(actual, expected) || array_contains(actual, expected))
                .unwrap_or(false),
            Matcher::Pattern(field, re) => lookup(doc, field)
                .and_then(Value::as_str)
                .map(|s| re.is_match(s))
                .unwrap_or(false),
        });
        fields_match && self.phrase.as_ref().map(|p| contains_phrase(doc, p)).unwrap_or(true)
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, StoreError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

fn array_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|i| values_equal(i, expected)),
        _ => false,
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Phrase search over every string value in the document.
fn contains_phrase(doc: &Value, phrase: &[String]) -> bool {
    if phrase.is_empty() {
        return true;
    }
    match doc {
        Value::String(s) => words(s).windows(phrase.len()).any(|w| w == phrase),
        Value::Array(items) => items.iter().any(|i| contains_phrase(i, phrase)),
        Value::Object(map) => map.values().any(|v| contains_phrase(v, phrase)),
        _ => false,
    }
}

fn sort_documents(docs: &mut [Value], sort: &[(String, SortDirection)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, dir) in sort {
            let ord = compare_values(
                lookup(a, field).unwrap_or(&Value::Null),
                lookup(b, field).unwrap_or(&Value::Null),
            );
            let ord = match dir {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, StoreError> {
        let filter = CompiledFilter::new(&plan.filter)?;
        let collections = self.collections.read().await;
        let mut docs: Vec<Value> = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        sort_documents(&mut docs, &plan.sort);
        let take = if plan.limit == 0 { usize::MAX } else { plan.limit as usize };
        Ok(docs
            .into_iter()
            .skip(plan.skip as usize)
            .take(take)
            .map(|d| plan.projection.apply(d))
            .collect())
    }

    async fn insert(&self, collection: &str, document: Map<String, Value>) -> Result<Value, StoreError> {
        let doc = Value::Object(document);
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn replace(
        &self,
        collection: &str,
        filter: &Filter,
        mut document: Map<String, Value>,
    ) -> Result<WriteOutcome, StoreError> {
        let compiled = CompiledFilter::new(filter)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(WriteOutcome::matched(0));
        };
        let Some(existing) = docs.iter_mut().find(|d| compiled.matches(d)) else {
            return Ok(WriteOutcome::matched(0));
        };
        for key in ["_id", "created"] {
            if !document.contains_key(key) {
                if let Some(v) = existing.get(key) {
                    document.insert(key.to_string(), v.clone());
                }
            }
        }
        *existing = Value::Object(document);
        Ok(WriteOutcome::matched(1))
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome, StoreError> {
        let compiled = CompiledFilter::new(filter)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(WriteOutcome::matched(0));
        };
        let before = docs.len();
        docs.retain(|d| !compiled.matches(d));
        Ok(WriteOutcome::matched((before - docs.len()) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{FieldFilter, Projection};
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, desc, price) in [(1, "The first widget", 0.99), (2, "The second widget", 1.99), (3, "The third widget", 2.99)] {
            let doc = json!({"id": id, "name": format!("Widget #{}", id), "description": desc, "price": price});
            store.insert("widgets", doc.as_object().unwrap().clone()).await.unwrap();
        }
        store
    }

    fn pattern(field: &str, p: &str) -> Filter {
        Filter {
            terms: vec![FieldFilter { field: field.into(), condition: Condition::Pattern(p.into()) }],
            text: None,
        }
    }

    #[tokio::test]
    async fn sorts_pages_and_projects() {
        let store = seeded().await;
        let plan = QueryPlan {
            sort: vec![("price".into(), SortDirection::Desc)],
            limit: 2,
            skip: 1,
            projection: Projection::Include(vec!["id".into()]),
            ..Default::default()
        };
        let docs = store.find("widgets", &plan).await.unwrap();
        assert_eq!(docs, vec![json!({"id": 2}), json!({"id": 1})]);
    }

    #[tokio::test]
    async fn patterns_are_case_insensitive_and_anchored() {
        let store = seeded().await;
        let plan = QueryPlan { filter: pattern("description", "^the THIRD widget$"), ..Default::default() };
        assert_eq!(store.find("widgets", &plan).await.unwrap().len(), 1);
        let plan = QueryPlan { filter: pattern("description", "^third$"), ..Default::default() };
        assert!(store.find("widgets", &plan).await.unwrap().is_empty());
        let plan = QueryPlan { filter: pattern("description", "^(oops$"), ..Default::default() };
        assert!(matches!(store.find("widgets", &plan).await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn phrase_search_matches_words() {
        let store = seeded().await;
        let plan = QueryPlan {
            filter: Filter { terms: vec![], text: Some("First".into()) },
            ..Default::default()
        };
        let docs = store.find("widgets", &plan).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn replace_keeps_store_key_and_created() {
        let store = MemoryStore::new();
        store
            .insert("w", json!({"_id": {"$oid": "507f1f77bcf86cd799439011"}, "id": 1, "created": "c"}).as_object().unwrap().clone())
            .await
            .unwrap();
        let out = store
            .replace("w", &Filter::equals("id", json!(1)), json!({"id": 1, "name": "new"}).as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(out, WriteOutcome::matched(1));
        let docs = store.find("w", &QueryPlan::default()).await.unwrap();
        assert_eq!(docs[0]["created"], json!("c"));
        assert_eq!(docs[0]["_id"], json!({"$oid": "507f1f77bcf86cd799439011"}));
        assert_eq!(docs[0]["name"], json!("new"));

        let missing = store
            .replace("w", &Filter::equals("id", json!(9)), Map::new())
            .await
            .unwrap();
        assert_eq!(missing.n, 0);
    }

    #[tokio::test]
    async fn delete_removes_matches_only() {
        let store = seeded().await;
        let out = store.delete("widgets", &Filter::equals("id", json!(3))).await.unwrap();
        assert_eq!(out.n, 1);
        assert_eq!(store.count("widgets").await, 2);
        assert_eq!(store.delete("nothing", &Filter::equals("id", json!(3))).await.unwrap().n, 0);
    }
}
