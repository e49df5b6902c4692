use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Row};

use super::{RecordStore, StorageError, ID_FIELD};
use crate::database::DatabaseManager;
use crate::filter::filter_where::FilterWhere;
use crate::filter::{Filter, FilterData};
use crate::tenancy::StorageTarget;

/// [`RecordStore`] over one Postgres pool per storage target database.
///
/// Rows travel as jsonb: selects return `to_jsonb(r)`, writes go through
/// `jsonb_populate_record` so column types come from the table definition.
#[derive(Clone)]
pub struct PgRecordStore {
    databases: DatabaseManager,
    max_limit: Option<i32>,
}

impl PgRecordStore {
    pub fn new(databases: DatabaseManager) -> Self {
        Self { databases, max_limit: None }
    }

    pub fn with_max_limit(mut self, max_limit: i32) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    async fn pool(&self, target: &StorageTarget) -> Result<PgPool, StorageError> {
        Ok(self.databases.pool(&target.database).await?)
    }

    fn filter(&self, target: &StorageTarget, entity: &str) -> Result<Filter, StorageError> {
        Ok(Filter::new(entity)?
            .in_schema(target.schema.as_deref())?
            .with_max_limit(self.max_limit))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn select(&self, target: &StorageTarget, entity: &str, query: &FilterData) -> Result<Vec<Value>, StorageError> {
        let mut filter = self.filter(target, entity)?;
        filter.assign(query.clone())?;
        let sql = filter.to_sql()?;

        let pool = self.pool(target).await?;
        let mut q = sqlx::query(&sql.query);
        for param in &sql.params {
            q = bind_param(q, param);
        }

        let mut out = Vec::new();
        for row in q.fetch_all(&pool).await? {
            out.push(filter.project(row.try_get::<Value, _>("row")?));
        }
        Ok(out)
    }

    async fn count(&self, target: &StorageTarget, entity: &str, where_clause: &Value) -> Result<u64, StorageError> {
        let mut filter = self.filter(target, entity)?;
        filter.where_clause(where_clause.clone())?;
        let sql = filter.to_count_sql()?;

        let pool = self.pool(target).await?;
        let mut q = sqlx::query(&sql.query);
        for param in &sql.params {
            q = bind_param(q, param);
        }
        let count: i64 = q.fetch_one(&pool).await?.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, target: &StorageTarget, entity: &str, mut row: Value) -> Result<Value, StorageError> {
        let Value::Object(map) = &mut row else {
            return Err(StorageError::InvalidRecord("row must be a JSON object".to_string()));
        };
        if map.get(ID_FIELD).map_or(true, Value::is_null) {
            map.insert(ID_FIELD.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        }

        let table = self.filter(target, entity)?.qualified_table();
        let query = format!(
            "INSERT INTO {table} AS r SELECT * FROM jsonb_populate_record(NULL::{table}, $1) RETURNING to_jsonb(r) AS row"
        );

        let pool = self.pool(target).await?;
        let stored = sqlx::query(&query)
            .bind(row)
            .fetch_one(&pool)
            .await
            .map_err(map_write_error)?;
        Ok(stored.try_get::<Value, _>("row")?)
    }

    async fn update(
        &self,
        target: &StorageTarget,
        entity: &str,
        changes: Value,
        where_clause: &Value,
    ) -> Result<u64, StorageError> {
        let Value::Object(fields) = &changes else {
            return Err(StorageError::InvalidRecord("changes must be a JSON object".to_string()));
        };
        if fields.is_empty() {
            return Ok(0);
        }

        let mut filter = self.filter(target, entity)?;
        let table = filter.qualified_table();

        let mut assignments = Vec::with_capacity(fields.len());
        for column in fields.keys() {
            FilterWhere::validate_column(column)?;
            assignments.push(format!(
                "\"{column}\" = (SELECT p.\"{column}\" FROM jsonb_populate_record(NULL::{table}, $1) AS p)"
            ));
        }

        // $1 is the changes document; predicate placeholders follow it
        filter.where_clause(where_clause.clone())?;
        let predicate = filter.to_where_sql(1)?;
        let query = format!(
            "UPDATE {table} AS r SET {} WHERE {}",
            assignments.join(", "),
            predicate.query
        );

        let pool = self.pool(target).await?;
        let mut q = sqlx::query(&query).bind(changes.clone());
        for param in &predicate.params {
            q = bind_param(q, param);
        }
        let result = q.execute(&pool).await.map_err(map_write_error)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, target: &StorageTarget, entity: &str, where_clause: &Value) -> Result<u64, StorageError> {
        let mut filter = self.filter(target, entity)?;
        filter.where_clause(where_clause.clone())?;
        let predicate = filter.to_where_sql(0)?;
        let query = format!("DELETE FROM {} AS r WHERE {}", filter.qualified_table(), predicate.query);

        let pool = self.pool(target).await?;
        let mut q = sqlx::query(&query);
        for param in &predicate.params {
            q = bind_param(q, param);
        }
        Ok(q.execute(&pool).await?.rows_affected())
    }
}

fn map_write_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StorageError::Conflict(db.message().to_string())
        }
        _ => StorageError::Sqlx(err),
    }
}

/// Bind one filter parameter. Arrays never reach here: the where renderer
/// expands them into one placeholder per element.
fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => q.bind(Option::<String>::None),
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}
