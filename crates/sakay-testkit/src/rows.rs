use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use sakay_backend::{RowFilter, RowStore, compare_values};
use sakay_types::QueryError;

/// In-memory [`RowStore`] with scriptable failures.
///
/// Rows live as plain JSON objects per table, filters run through the
/// reference [`RowFilter::matches`], and inserts assign `id`/`created_at`
/// the way the hosted backend does. Every select is logged so tests can
/// assert what the code under test actually asked for.
pub struct MemoryRowStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    tables: HashMap<String, Vec<Value>>,
    next_id: i64,
    selects: Vec<(String, RowFilter)>,
    fail_select: Option<String>,
    fail_insert: Option<String>,
    fail_update: Option<String>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner { next_id: 1, ..StoreInner::default() }),
        }
    }

    /// Preload rows. Ids already present in the rows are respected; later
    /// inserts allocate above the highest seeded id.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        for row in &rows {
            if let Some(id) = row.get("id").and_then(Value::as_i64) {
                inner.next_id = inner.next_id.max(id + 1);
            }
        }
        inner.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current contents of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let inner = self.inner.lock().expect("row store lock poisoned");
        inner.tables.get(table).cloned().unwrap_or_default()
    }

    /// Every `(table, filter)` pair passed to [`RowStore::select`] so far,
    /// including calls that were scripted to fail.
    pub fn selects(&self) -> Vec<(String, RowFilter)> {
        let inner = self.inner.lock().expect("row store lock poisoned");
        inner.selects.clone()
    }

    pub fn fail_next_select(&self, message: &str) {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        inner.fail_select = Some(message.to_string());
    }

    pub fn fail_next_insert(&self, message: &str) {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        inner.fail_insert = Some(message.to_string());
    }

    pub fn fail_next_update(&self, message: &str) {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        inner.fail_update = Some(message.to_string());
    }
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, table: &str, filter: &RowFilter) -> Result<Vec<Value>, QueryError> {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        inner.selects.push((table.to_string(), filter.clone()));
        if let Some(message) = inner.fail_select.take() {
            return Err(QueryError::Backend(message));
        }

        let mut rows: Vec<Value> = inner
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, order)) = &filter.order_by {
            rows.sort_by(|a, b| {
                let a = a.get(column).unwrap_or(&Value::Null);
                let b = b.get(column).unwrap_or(&Value::Null);
                let ord = compare_values(a, b).unwrap_or(std::cmp::Ordering::Equal);
                match order {
                    sakay_backend::SortOrder::Ascending => ord,
                    sakay_backend::SortOrder::Descending => ord.reverse(),
                }
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, QueryError> {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        if let Some(message) = inner.fail_insert.take() {
            return Err(QueryError::Backend(message));
        }

        let mut stored = row;
        let id = inner.next_id;
        inner.next_id += 1;
        if let Some(object) = stored.as_object_mut() {
            object.insert("id".to_string(), Value::from(id));
            if !object.contains_key("created_at") {
                object.insert("created_at".to_string(), Value::from(Utc::now().to_rfc3339()));
            }
        }
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, table: &str, id: i64, patch: Value) -> Result<Value, QueryError> {
        let mut inner = self.inner.lock().expect("row store lock poisoned");
        if let Some(message) = inner.fail_update.take() {
            return Err(QueryError::Backend(message));
        }

        let rows = inner.tables.entry(table.to_string()).or_default();
        let row = rows
            .iter_mut()
            .find(|row| row.get("id").and_then(Value::as_i64) == Some(id))
            .ok_or_else(|| QueryError::Backend(format!("row {id} not found in {table}")))?;
        if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }
}
