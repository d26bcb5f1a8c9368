//! Repository pattern implementation for the notification engine's record store
//!
//! Architecture:
//! - [`RecordStore`] defines the CRUD contract over named JSON collections
//! - [`Query`], [`Filter`], [`Sort`] and [`Pagination`] describe lookups
//! - [`TypedCollection`] adds serde conversion on top of any store
//! - [`InMemoryStore`] is the bundled implementation

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

pub use memory::InMemoryStore;

use super::DatabaseError;

/// Largest page a single query may return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Generic CRUD contract over named collections of JSON documents.
///
/// Implementations must apply `update_if` atomically: the guard is checked
/// and the patch applied under the same lock (or transaction), so concurrent
/// writers never lose updates.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record; fails with `Conflict` when the id is taken.
    async fn insert(&self, collection: &str, id: &str, record: Value)
        -> Result<(), DatabaseError>;

    /// Fetch a record by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DatabaseError>;

    /// Shallow-merge the top-level fields of `patch` into the record.
    async fn update(&self, collection: &str, id: &str, patch: Value)
        -> Result<Value, DatabaseError>;

    /// Apply `patch` only if the stored record matches every guard filter.
    /// Returns `Ok(None)` when the guard did not match.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &[Filter],
        patch: Value,
    ) -> Result<Option<Value>, DatabaseError>;

    /// Filtered, sorted, paginated query.
    async fn query(&self, collection: &str, query: &Query)
        -> Result<PagedResult<Value>, DatabaseError>;

    /// Count records matching every filter.
    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, DatabaseError>;
}

/// Comparison operators supported by filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

/// A predicate on one (dotted) field path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Build a filter, failing when `value` does not serialize to JSON.
    pub fn try_new(
        field: impl Into<String>,
        op: FilterOp,
        value: impl Serialize,
    ) -> Result<Self, DatabaseError> {
        Ok(Self {
            field: field.into(),
            op,
            value: serde_json::to_value(value)?,
        })
    }

    /// Like [`Filter::try_new`], but a value that fails to serialize yields a
    /// filter that matches no record.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Serialize) -> Self {
        let field = field.into();
        match serde_json::to_value(value) {
            Ok(value) => Self { field, op, value },
            Err(e) => {
                warn!(field = %field, "Filter value failed to serialize: {}", e);
                debug_assert!(false, "filter value for {} failed to serialize: {}", field, e);
                Self::match_none(field)
            }
        }
    }

    fn match_none(field: String) -> Self {
        Self {
            field,
            op: FilterOp::In,
            value: Value::Array(Vec::new()),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::new(field, FilterOp::Ne, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }

    pub fn is_in<V: Serialize>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let field = field.into();
        let values: Result<Vec<Value>, _> = values.into_iter().map(serde_json::to_value).collect();
        match values {
            Ok(values) => Self {
                field,
                op: FilterOp::In,
                value: Value::Array(values),
            },
            Err(e) => {
                warn!(field = %field, "Filter value failed to serialize: {}", e);
                debug_assert!(false, "filter values for {} failed to serialize: {}", field, e);
                Self::match_none(field)
            }
        }
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, record: &Value) -> bool {
        let actual = lookup(record, &self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::Ne => !values_equal(actual, &self.value),
            FilterOp::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In => match &self.value {
                Value::Array(candidates) => candidates.iter().any(|c| values_equal(actual, c)),
                _ => false,
            },
        }
    }
}

/// Resolve a dotted path (`preferences.email`) inside a JSON document.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, segment| current.get(segment))
}

fn as_timestamp(value: &Value) -> Option<DateTime<FixedOffset>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(_), Value::String(_)) => match (as_timestamp(a), as_timestamp(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => a == b,
    }
}

/// Order two JSON values; `None` when they are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (as_timestamp(a), as_timestamp(b)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * limit;
        Self {
            page,
            limit,
            offset,
        }
    }

    pub fn next(&self) -> Self {
        Self::new(self.page + 1, self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// Sorting parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A filtered, optionally sorted, paginated lookup. Without a sort, records
/// come back in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub pagination: Pagination,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }
}

/// Query result with pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = ((total as f64) / (limit as f64)).ceil() as u32;
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Serde-typed view of one collection.
pub struct TypedCollection<T> {
    store: Arc<dyn RecordStore>,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn RecordStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn insert(&self, id: &str, record: &T) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(record)?;
        self.store.insert(self.name, id, value).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, DatabaseError> {
        match self.store.get(self.name, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn update(&self, id: &str, patch: Value) -> Result<T, DatabaseError> {
        let value = self.store.update(self.name, id, patch).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn update_if(
        &self,
        id: &str,
        guard: &[Filter],
        patch: Value,
    ) -> Result<Option<T>, DatabaseError> {
        match self.store.update_if(self.name, id, guard, patch).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn query(&self, query: &Query) -> Result<PagedResult<T>, DatabaseError> {
        let page = self.store.query(self.name, query).await?;
        let data = page
            .data
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(PagedResult {
            data,
            pagination: page.pagination,
        })
    }

    pub async fn count(&self, filters: &[Filter]) -> Result<u64, DatabaseError> {
        self.store.count(self.name, filters).await
    }

    /// Walk every page of a query and collect the records.
    pub async fn find_all(&self, filters: Vec<Filter>, sort: Option<Sort>) -> Result<Vec<T>, DatabaseError> {
        let mut query = Query {
            filters,
            sort,
            pagination: Pagination::new(1, MAX_PAGE_SIZE),
        };
        let mut records = Vec::new();
        loop {
            let page = self.query(&query).await?;
            records.extend(page.data);
            if !page.pagination.has_next {
                return Ok(records);
            }
            query.pagination = query.pagination.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unserializable_filter_value_matches_nothing() {
        use std::collections::HashMap;

        let mut keyed: HashMap<(u8, u8), u8> = HashMap::new();
        keyed.insert((1, 2), 3);
        assert!(matches!(
            Filter::try_new("tags", FilterOp::Eq, &keyed),
            Err(DatabaseError::Serialization(_))
        ));

        let fallback = Filter::match_none("tags".to_string());
        assert!(!fallback.matches(&json!({"id": "a"})));
        assert!(!fallback.matches(&json!({"id": "b", "tags": null})));
        assert!(Filter::try_new("tags", FilterOp::Eq, Value::Null)
            .unwrap()
            .matches(&json!({"id": "b", "tags": null})));
    }

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(0, 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 1);
        assert_eq!(p.offset, 0);

        let p = Pagination::new(3, 10_000);
        assert_eq!(p.limit, MAX_PAGE_SIZE);
        assert_eq!(p.offset, 2 * MAX_PAGE_SIZE);
        assert_eq!(p.next().page, 4);
    }

    #[test]
    fn test_pagination_meta() {
        let meta = PaginationMeta::new(2, 50, 120);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let meta = PaginationMeta::new(1, 50, 0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
    }

    #[test]
    fn test_filter_nested_fields() {
        let record = json!({"id": "u1", "preferences": {"marketing": true}});
        assert!(Filter::eq("preferences.marketing", true).matches(&record));
        assert!(!Filter::eq("preferences.email", true).matches(&record));
        assert!(Filter::eq("preferences.email", Value::Null).matches(&record));
    }

    #[test]
    fn test_filter_timestamps_compare_chronologically() {
        // Differing fractional precision must not break ordering.
        let record = json!({"last_active_at": "2024-05-01T10:00:00.250Z"});
        assert!(Filter::gte("last_active_at", "2024-05-01T10:00:00Z").matches(&record));
        assert!(!Filter::gte("last_active_at", "2024-05-01T10:00:01Z").matches(&record));
        assert!(Filter::lte("last_active_at", "2024-05-02T00:00:00+05:30").matches(&record));
    }

    #[test]
    fn test_filter_in_and_numbers() {
        let record = json!({"state": "failed", "attempts": 2});
        assert!(Filter::is_in("state", ["pending", "failed"]).matches(&record));
        assert!(!Filter::is_in("state", ["delivered"]).matches(&record));
        assert!(Filter::gte("attempts", 2.0).matches(&record));
        assert!(Filter::ne("state", "pending").matches(&record));
        // Range filters never match missing fields.
        assert!(!Filter::gte("missing", 0).matches(&record));
    }
}
