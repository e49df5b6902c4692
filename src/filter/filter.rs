use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, SqlResult};

/// Builds SQL for one table from a [`FilterData`].
///
/// Rows are returned as a single `row` jsonb column so stores can work with
/// schemaless `serde_json::Value` records.
pub struct Filter {
    table_name: String,
    schema: Option<String>,
    select_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
    max_limit: Option<i32>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_identifier(&table_name).map_err(FilterError::InvalidTarget)?;
        Ok(Self {
            table_name,
            schema: None,
            select_columns: vec![],
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
            max_limit: None,
        })
    }

    pub fn in_schema(mut self, schema: Option<&str>) -> Result<Self, FilterError> {
        if let Some(schema) = schema {
            Self::validate_identifier(schema).map_err(FilterError::InvalidTarget)?;
        }
        self.schema = schema.map(str::to_string);
        Ok(self)
    }

    pub fn with_max_limit(mut self, max_limit: Option<i32>) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select { self.select(select)?; }
        if let Some(where_clause) = data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self.order(order)?; }
        if let Some(limit) = data.limit { self.limit(limit, data.offset)?; }
        else if let Some(offset) = data.offset { self.offset(offset)?; }
        Ok(self)
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        for column in columns.iter().filter(|c| c.as_str() != "*") {
            FilterWhere::validate_column(column)?;
        }
        self.select_columns = columns;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i32, offset: Option<i32>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { self.offset(off)?; }

        let max_limit = self.max_limit.unwrap_or(i32::MAX);
        if limit > max_limit {
            tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max_limit);
        }
        self.limit = Some(limit.min(max_limit));
        Ok(self)
    }

    fn offset(&mut self, offset: i32) -> Result<&mut Self, FilterError> {
        if offset < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); }
        self.offset = Some(offset);
        Ok(self)
    }

    pub fn qualified_table(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.table_name),
            None => format!("\"{}\"", self.table_name),
        }
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql(0)?;
        let query = [
            "SELECT to_jsonb(r) AS row".to_string(),
            format!("FROM {} AS r", self.qualified_table()),
            format!("WHERE {}", where_result.query),
            FilterOrder::generate(&self.order_data),
            self.build_limit_clause(),
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    /// Predicate only, with placeholders numbered after `starting_param_index`
    pub fn to_where_sql(&self, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let (query, params) = match &self.where_data {
            Some(where_data) => FilterWhere::generate(where_data, starting_param_index)?,
            None => ("1=1".to_string(), vec![]),
        };
        Ok(SqlResult { query, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql(0)?;
        let query = format!(
            "SELECT COUNT(*) AS count FROM {} AS r WHERE {}",
            self.qualified_table(),
            where_result.query
        );
        Ok(SqlResult { query, params: where_result.params })
    }

    /// Apply the select list to a fetched row
    pub fn project(&self, row: Value) -> Value {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            return row;
        }
        match row {
            Value::Object(mut map) => {
                let mut out = Map::new();
                for column in &self.select_columns {
                    if let Some(v) = map.remove(column) {
                        out.insert(column.clone(), v);
                    }
                }
                Value::Object(out)
            }
            other => other,
        }
    }

    fn validate_identifier(name: &str) -> Result<(), String> {
        FilterWhere::validate_column(name).map_err(|_| format!("Invalid identifier format: {}", name))
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_select_with_schema_order_and_limit() {
        let mut filter = Filter::new("invoices").unwrap().in_schema(Some("acme")).unwrap().with_max_limit(Some(50));
        filter
            .assign(FilterData {
                select: None,
                where_clause: Some(json!({"status": "open"})),
                order: Some(json!("created_at desc")),
                limit: Some(500),
                offset: Some(10),
            })
            .unwrap();

        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(r) AS row FROM \"acme\".\"invoices\" AS r WHERE \"status\"::text = $1 ORDER BY \"created_at\" DESC LIMIT 50 OFFSET 10"
        );
        assert_eq!(sql.params, vec![json!("open")]);
    }

    #[test]
    fn count_and_where_sql() {
        let mut filter = Filter::new("invoices").unwrap();
        filter.where_clause(json!({"total": {"$gt": 5}})).unwrap();
        assert_eq!(
            filter.to_count_sql().unwrap().query,
            "SELECT COUNT(*) AS count FROM \"invoices\" AS r WHERE \"total\" > $1"
        );
        assert_eq!(filter.to_where_sql(3).unwrap().query, "\"total\" > $4");
    }

    #[test]
    fn validates_identifiers() {
        assert!(Filter::new("bad-name").is_err());
        assert!(Filter::new("").is_err());
        assert!(Filter::new("invoices").unwrap().in_schema(Some("a.b")).is_err());
        assert!(Filter::new("invoices").unwrap().select(vec!["a b".into()]).is_err());
    }

    #[test]
    fn projects_selected_columns() {
        let mut filter = Filter::new("invoices").unwrap();
        filter.select(vec!["id".into(), "total".into()]).unwrap();
        let row = filter.project(json!({"id": "1", "total": 3, "secret": "x"}));
        assert_eq!(row, json!({"id": "1", "total": 3}));
    }
}
