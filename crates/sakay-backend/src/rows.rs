use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use sakay_types::QueryError;

/// Relational row capability of the hosted backend.
///
/// Rows travel as raw JSON objects; the repository crates shape payloads
/// going in and decode models coming out. Implementations compile
/// [`RowFilter`] into whatever query language the backend speaks.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, table: &str, filter: &RowFilter) -> Result<Vec<Value>, QueryError>;

    /// Insert one row and return it with backend-assigned fields
    /// (`id`, `created_at`) filled in.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, QueryError>;

    /// Patch the row with the given `id`. Returns the updated row.
    async fn update(&self, table: &str, id: i64, patch: Value) -> Result<Value, QueryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Gt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub cmp: Cmp,
    pub value: Value,
}

/// Query shape for [`RowStore::select`].
///
/// Conjunctive clauses (`eq`, `gt`), at most one disjunctive group
/// (`or_eq`, used for "user occupies either participant slot"), and an
/// optional sort column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    pub all_of: Vec<Clause>,
    pub any_of: Vec<Clause>,
    pub order_by: Option<(String, SortOrder)>,
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: Value) -> Self {
        self.all_of.push(Clause { column: column.to_string(), cmp: Cmp::Eq, value });
        self
    }

    pub fn gt(mut self, column: &str, value: Value) -> Self {
        self.all_of.push(Clause { column: column.to_string(), cmp: Cmp::Gt, value });
        self
    }

    /// Add an equality alternative to the disjunctive group. A row matches
    /// the group when any alternative holds.
    pub fn or_eq(mut self, column: &str, value: Value) -> Self {
        self.any_of.push(Clause { column: column.to_string(), cmp: Cmp::Eq, value });
        self
    }

    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order_by = Some((column.to_string(), order));
        self
    }

    /// Reference evaluation against a JSON row. Real backends compile the
    /// filter instead; the in-memory store and unit tests use this.
    pub fn matches(&self, row: &Value) -> bool {
        let all = self
            .all_of
            .iter()
            .all(|clause| clause_matches(clause, row));
        let any = self.any_of.is_empty()
            || self.any_of.iter().any(|clause| clause_matches(clause, row));
        all && any
    }
}

fn clause_matches(clause: &Clause, row: &Value) -> bool {
    let Some(field) = row.get(&clause.column) else {
        return false;
    };
    match clause.cmp {
        Cmp::Eq => field == &clause.value,
        Cmp::Gt => matches!(compare_values(field, &clause.value), Some(Ordering::Greater)),
    }
}

/// Ordering between two JSON scalars: RFC 3339 timestamps compare as
/// instants, numbers as numbers, strings lexicographically.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_timestamp(a), as_timestamp(b)) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str()?.parse::<DateTime<Utc>>().ok()
}
