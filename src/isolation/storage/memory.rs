use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use super::{RecordStore, StorageError, ID_FIELD};
use crate::filter::filter_where::FilterWhere;
use crate::filter::{matcher, FilterData};
use crate::tenancy::StorageTarget;

/// Rows per (storage target, entity), filtered with the same JSON where
/// language the SQL store renders
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<(String, String), Vec<Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, target: &StorageTarget, entity: &str) -> usize {
        self.tables
            .read()
            .get(&table_key(target, entity))
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, target: &StorageTarget, entity: &str) -> bool {
        self.len(target, entity) == 0
    }
}

fn table_key(target: &StorageTarget, entity: &str) -> (String, String) {
    (target.to_string(), entity.to_string())
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn select(&self, target: &StorageTarget, entity: &str, query: &FilterData) -> Result<Vec<Value>, StorageError> {
        let rows = self
            .tables
            .read()
            .get(&table_key(target, entity))
            .cloned()
            .unwrap_or_default();
        Ok(matcher::apply(rows, query)?)
    }

    async fn count(&self, target: &StorageTarget, entity: &str, where_clause: &Value) -> Result<u64, StorageError> {
        let tables = self.tables.read();
        let mut count = 0;
        for row in tables.get(&table_key(target, entity)).into_iter().flatten() {
            if matcher::matches(row, where_clause)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert(&self, target: &StorageTarget, entity: &str, mut row: Value) -> Result<Value, StorageError> {
        let Value::Object(map) = &mut row else {
            return Err(StorageError::InvalidRecord("row must be a JSON object".to_string()));
        };
        let id = match map.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => {
                let id = uuid::Uuid::new_v4().to_string();
                map.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
            Some(other) => return Err(StorageError::InvalidRecord(format!("id must be a string, got {}", other))),
        };

        let mut tables = self.tables.write();
        let rows = tables.entry(table_key(target, entity)).or_default();
        if rows.iter().any(|r| r.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str())) {
            return Err(StorageError::Conflict(format!("{} {} already exists", entity, id)));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        target: &StorageTarget,
        entity: &str,
        changes: Value,
        where_clause: &Value,
    ) -> Result<u64, StorageError> {
        let Value::Object(changes) = changes else {
            return Err(StorageError::InvalidRecord("changes must be a JSON object".to_string()));
        };

        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&table_key(target, entity)) else {
            return Ok(0);
        };

        // Evaluate the predicate on every row before touching any of them
        let hits = matching_rows(rows, where_clause)?;
        let mut affected = 0;
        for (row, hit) in rows.iter_mut().zip(hits) {
            if let (true, Value::Object(fields)) = (hit, row) {
                for (k, v) in &changes {
                    fields.insert(k.clone(), v.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, target: &StorageTarget, entity: &str, where_clause: &Value) -> Result<u64, StorageError> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&table_key(target, entity)) else {
            return Ok(0);
        };

        let hits = matching_rows(rows, where_clause)?;
        let removed = hits.iter().filter(|hit| **hit).count() as u64;
        let mut hits = hits.into_iter();
        rows.retain(|_| !hits.next().unwrap_or(false));
        Ok(removed)
    }
}

fn matching_rows(rows: &[Value], where_clause: &Value) -> Result<Vec<bool>, StorageError> {
    FilterWhere::validate(where_clause)?;
    rows.iter()
        .map(|row| matcher::matches(row, where_clause).map_err(StorageError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn targets_are_separate_tables() {
        let store = InMemoryStore::new();
        let (shared, own) = (StorageTarget::new("shared"), StorageTarget::new("tenant_a"));

        store.insert(&shared, "invoices", json!({"id": "1", "total": 1})).await.unwrap();
        let generated = store.insert(&own, "invoices", json!({"total": 2})).await.unwrap();
        assert!(generated["id"].is_string());

        assert_eq!(store.len(&shared, "invoices"), 1);
        assert_eq!(store.len(&own, "invoices"), 1);
        assert!(store.is_empty(&shared, "payments"));
    }

    #[tokio::test]
    async fn update_delete_respect_predicate() {
        let store = InMemoryStore::new();
        let t = StorageTarget::new("shared");
        store.insert(&t, "invoices", json!({"id": "1", "tenant_id": "a", "total": 1})).await.unwrap();
        store.insert(&t, "invoices", json!({"id": "2", "tenant_id": "b", "total": 1})).await.unwrap();

        let n = store
            .update(&t, "invoices", json!({"total": 5}), &json!({"id": "2", "tenant_id": "a"}))
            .await
            .unwrap();
        assert_eq!(n, 0);
        let n = store.update(&t, "invoices", json!({"total": 5}), &json!({"id": "1"})).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.fetch(&t, "invoices", "1").await.unwrap().unwrap()["total"], json!(5));

        assert_eq!(store.count(&t, "invoices", &json!({"total": 5})).await.unwrap(), 1);
        assert_eq!(store.delete(&t, "invoices", &json!({"tenant_id": "b"})).await.unwrap(), 1);
        assert_eq!(store.len(&t, "invoices"), 1);
    }

    #[tokio::test]
    async fn rejected_predicates_leave_rows_untouched() {
        let store = InMemoryStore::new();
        let t = StorageTarget::new("shared");
        store.insert(&t, "invoices", json!({"id": "1", "total": 1})).await.unwrap();
        store.insert(&t, "invoices", json!({"id": "2", "total": 2})).await.unwrap();

        let bad = json!({"total": {"$regex": "x"}});
        assert!(matches!(store.delete(&t, "invoices", &bad).await, Err(StorageError::Filter(_))));
        assert_eq!(store.len(&t, "invoices"), 2);

        // First row matches, the second branch is invalid
        let partial = json!({"$or": [{"id": "1"}, {"total": {"$between": [1]}}]});
        assert!(store.update(&t, "invoices", json!({"total": 9}), &partial).await.is_err());
        assert_eq!(store.fetch(&t, "invoices", "1").await.unwrap().unwrap()["total"], json!(1));
        assert!(store.delete(&t, "invoices", &partial).await.is_err());
        assert_eq!(store.len(&t, "invoices"), 2);
    }

    #[tokio::test]
    async fn duplicate_ids_conflict() {
        let store = InMemoryStore::new();
        let t = StorageTarget::new("shared");
        store.insert(&t, "invoices", json!({"id": "1"})).await.unwrap();
        assert!(matches!(
            store.insert(&t, "invoices", json!({"id": "1"})).await,
            Err(StorageError::Conflict(_))
        ));
    }
}
