//! Document store collaborator.
//!
//! Jobs, clients, portfolios and assets live in named collections of JSON
//! documents. The engine only needs equality/membership/null filters, a sort on
//! one field and field-level `$set`-style merges, so that is all the trait offers.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
    /// Matches a missing field as well as an explicit null
    IsNull,
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => field == Some(expected),
            Condition::In(options) => field.is_some_and(|v| options.contains(v)),
            Condition::IsNull => field.is_none_or(Value::is_null),
        }
    }
}

/// Conjunction of per-field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &str) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((field.to_string(), Condition::Eq(value.into())));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let options = values.into_iter().map(Into::into).collect();
        self.clauses.push((field.to_string(), Condition::In(options)));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.clauses.push((field.to_string(), Condition::IsNull));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, condition)| condition.matches(doc.get(field)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        if self.descending { ordering.reverse() } else { ordering }
    }
}

/// Numbers numerically, strings lexicographically (ISO timestamps sort by
/// time), anything missing or of another type sorts first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(_) | Value::String(_)), _) => Ordering::Greater,
        (_, Some(Value::Number(_) | Value::String(_))) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

pub trait DocumentStore: Send + Sync {
    /// Fails when a document with the same `id` is already in the collection
    fn insert(&self, collection: &str, doc: Value) -> Result<()>;

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>>;

    /// Merges `fields` into the first matching document. Returns whether a
    /// document matched. Check-and-write is atomic with respect to other calls.
    fn update_one(&self, collection: &str, filter: &Filter, fields: Map<String, Value>) -> Result<bool>;

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize>;

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize>;
}

/// In-process store, one `Vec` of documents per collection
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<T>(&self, f: impl FnOnce(&mut HashMap<String, Vec<Value>>) -> T) -> Result<T> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert(&self, collection: &str, doc: Value) -> Result<()> {
        if !doc.is_object() {
            return Err(anyhow!("cannot insert a non-object document into '{}'", collection));
        }
        self.with_collections(|c| {
            let docs = c.entry(collection.to_string()).or_default();
            if let Some(id) = doc.get("id").filter(|id| !id.is_null()) {
                if docs.iter().any(|d| d.get("id") == Some(id)) {
                    return Err(anyhow!("duplicate id {} in '{}'", id, collection));
                }
            }
            docs.push(doc);
            Ok(())
        })?
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        self.with_collections(|c| {
            c.get(collection)
                .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned())
        })
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut found = self.with_collections(|c| {
            c.get(collection)
                .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;
        if let Some(sort) = sort {
            found.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn update_one(&self, collection: &str, filter: &Filter, fields: Map<String, Value>) -> Result<bool> {
        self.with_collections(|c| {
            let Some(doc) = c
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| filter.matches(d)))
            else {
                return false;
            };
            if let Value::Object(target) = doc {
                target.extend(fields);
            }
            true
        })
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.with_collections(|c| {
            c.get_mut(collection).map_or(0, |docs| {
                let before = docs.len();
                docs.retain(|d| !filter.matches(d));
                before - docs.len()
            })
        })
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.with_collections(|c| {
            c.get(collection)
                .map_or(0, |docs| docs.iter().filter(|d| filter.matches(d)).count())
        })
    }
}
