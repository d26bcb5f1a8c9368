//! In-memory record store
//!
//! Collections are kept behind a single `parking_lot::RwLock`; every write,
//! including the guarded `update_if`, runs under the write lock so concurrent
//! callers observe a linearizable history.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::{compare_values, lookup, Filter, PagedResult, PaginationMeta, Query, RecordStore, SortDirection};
use crate::DatabaseError;

#[derive(Debug, Default)]
struct StoredCollection {
    records: HashMap<String, StoredRecord>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    seq: u64,
    value: Value,
}

/// Process-local store; injected wherever a [`RecordStore`] is expected.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn merge_patch(target: &mut Value, patch: Value) -> Result<(), DatabaseError> {
    let Value::Object(fields) = patch else {
        return Err(DatabaseError::InvalidQuery(
            "update patch must be a JSON object".to_string(),
        ));
    };
    match target {
        Value::Object(existing) => {
            for (key, value) in fields {
                existing.insert(key, value);
            }
            Ok(())
        }
        other => {
            let mut object = Map::new();
            for (key, value) in fields {
                object.insert(key, value);
            }
            *other = Value::Object(object);
            Ok(())
        }
    }
}

fn matches_all(filters: &[Filter], value: &Value) -> bool {
    filters.iter().all(|f| f.matches(value))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), DatabaseError> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.records.contains_key(id) {
            return Err(DatabaseError::conflict(collection, id));
        }
        let seq = entry.next_seq;
        entry.next_seq += 1;
        entry
            .records
            .insert(id.to_string(), StoredRecord { seq, value: record });
        debug!(collection, id, "record inserted");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DatabaseError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.records.get(id))
            .map(|r| r.value.clone()))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, DatabaseError> {
        let mut collections = self.collections.write();
        let record = collections
            .get_mut(collection)
            .and_then(|c| c.records.get_mut(id))
            .ok_or_else(|| DatabaseError::not_found(collection, id))?;
        merge_patch(&mut record.value, patch)?;
        Ok(record.value.clone())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &[Filter],
        patch: Value,
    ) -> Result<Option<Value>, DatabaseError> {
        let mut collections = self.collections.write();
        let record = collections
            .get_mut(collection)
            .and_then(|c| c.records.get_mut(id))
            .ok_or_else(|| DatabaseError::not_found(collection, id))?;
        if !matches_all(guard, &record.value) {
            return Ok(None);
        }
        merge_patch(&mut record.value, patch)?;
        Ok(Some(record.value.clone()))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<PagedResult<Value>, DatabaseError> {
        let collections = self.collections.read();
        let mut matched: Vec<&StoredRecord> = collections
            .get(collection)
            .map(|c| {
                c.records
                    .values()
                    .filter(|r| matches_all(&query.filters, &r.value))
                    .collect()
            })
            .unwrap_or_default();

        matched.sort_by(|a, b| {
            let primary = match &query.sort {
                Some(sort) => {
                    let left = lookup(&a.value, &sort.field);
                    let right = lookup(&b.value, &sort.field);
                    // Records missing the sort field go last in either direction.
                    match (left, right) {
                        (Some(l), Some(r)) => {
                            let ord = compare_values(l, r).unwrap_or(Ordering::Equal);
                            match sort.direction {
                                SortDirection::Asc => ord,
                                SortDirection::Desc => ord.reverse(),
                            }
                        }
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    }
                }
                None => Ordering::Equal,
            };
            primary.then(a.seq.cmp(&b.seq))
        });

        let total = matched.len() as u64;
        let pagination = query.pagination;
        let data = matched
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .map(|r| r.value.clone())
            .collect();

        Ok(PagedResult {
            data,
            pagination: PaginationMeta::new(pagination.page, pagination.limit, total),
        })
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, DatabaseError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| {
                c.records
                    .values()
                    .filter(|r| matches_all(filters, &r.value))
                    .count() as u64
            })
            .unwrap_or(0))
    }
}
