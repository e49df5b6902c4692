use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

const MAX_NESTED_DEPTH: usize = 10;

/// Renders a JSON where-clause into a parameterised SQL predicate.
///
/// Placeholders are numbered from `starting_param_index + 1`, so the predicate
/// can follow other bound parameters (e.g. the row payload of an UPDATE).
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    depth: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            depth: 0,
        }
    }

    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        Self::validate(where_data)?;
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.build_node(where_data)?;
        Ok((sql, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    pub fn validate_column(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.len() > 63 {
            return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", name)));
        }
        Ok(())
    }

    /// Conjunction of every condition in an object node
    fn build_node(&mut self, node: &Value) -> Result<String, FilterError> {
        self.depth += 1;
        if self.depth > MAX_NESTED_DEPTH {
            return Err(FilterError::InvalidWhereClause(format!(
                "WHERE nesting exceeds {} levels",
                MAX_NESTED_DEPTH
            )));
        }

        let obj = match node {
            Value::Null => {
                self.depth -= 1;
                return Ok("1=1".to_string());
            }
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Nested WHERE must be an object".to_string())),
        };

        let mut sql_conditions = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                sql_conditions.push(self.build_logical(key, value)?);
            } else {
                for condition in Self::parse_field_condition(key, value)? {
                    sql_conditions.push(self.build_sql_condition(&condition)?);
                }
            }
        }

        self.depth -= 1;
        Ok(match sql_conditions.len() {
            0 => "1=1".to_string(),
            1 => sql_conditions.remove(0),
            _ => sql_conditions.join(" AND "),
        })
    }

    fn build_logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    // Empty conjunction is true, empty disjunction is false
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    sql_parts.push(format!("({})", self.build_node(v)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            // A NULL inner result counts as false, so $not keeps rows missing the field
            "$not" => Ok(format!("NOT COALESCE(({}), FALSE)", self.build_node(value)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        Self::validate_column(field)?;
        match value {
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => obj
                .iter()
                .map(|(op_key, op_val)| {
                    let operator =
                        FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    Ok(FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() })
                })
                .collect(),
            // Implicit equality: { field: value }
            _ => Ok(vec![FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() }]),
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let data = &condition.data;
        let column = Self::column_expr(&condition.column, data, condition.operator);

        match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { Ok(format!("{} IS NULL", column)) }
                else { Ok(format!("{} = {}", column, self.param(data.clone()))) }
            }
            FilterOp::Ne => {
                if data.is_null() { Ok(format!("{} IS NOT NULL", column)) }
                else { Ok(format!("{} IS DISTINCT FROM {}", column, self.param(data.clone()))) }
            }
            FilterOp::Gt => Ok(format!("{} > {}", column, self.param(data.clone()))),
            FilterOp::Gte => Ok(format!("{} >= {}", column, self.param(data.clone()))),
            FilterOp::Lt => Ok(format!("{} < {}", column, self.param(data.clone()))),
            FilterOp::Lte => Ok(format!("{} <= {}", column, self.param(data.clone()))),
            FilterOp::Like => Ok(format!("{} LIKE {}", column, self.param(data.clone()))),
            FilterOp::ILike => Ok(format!("{} ILIKE {}", column, self.param(data.clone()))),
            FilterOp::In | FilterOp::NIn => {
                let negate = condition.operator == FilterOp::NIn;
                let values = match data {
                    Value::Array(values) => values.clone(),
                    other => vec![other.clone()],
                };
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let params: Vec<String> = values.into_iter().map(|v| self.param(v)).collect();
                let keyword = if negate { "NOT IN" } else { "IN" };
                Ok(format!("{} {} ({})", column, keyword, params.join(", ")))
            }
            FilterOp::Between => match data {
                Value::Array(values) if values.len() == 2 => Ok(format!(
                    "{} BETWEEN {} AND {}",
                    column,
                    self.param(values[0].clone()),
                    self.param(values[1].clone())
                )),
                _ => Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string())),
            },
        }
    }

    /// String parameters are bound as text, so the column is compared as text
    /// (this keeps uuid and timestamp columns comparable to JSON strings).
    fn column_expr(column: &str, data: &Value, operator: FilterOp) -> String {
        let textual = match operator {
            FilterOp::Like | FilterOp::ILike => true,
            _ => match data {
                Value::String(_) => true,
                Value::Array(values) => !values.is_empty() && values.iter().all(Value::is_string),
                _ => false,
            },
        };
        if textual {
            format!("\"{}\"::text", column)
        } else {
            format!("\"{}\"", column)
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality_and_operators() {
        let (sql, params) = FilterWhere::generate(&json!({"status": "open", "total": {"$gte": 10}}), 0).unwrap();
        assert_eq!(sql, "\"status\"::text = $1 AND \"total\" >= $2");
        assert_eq!(params, vec![json!("open"), json!(10)]);
    }

    #[test]
    fn respects_starting_index_through_nesting() {
        let where_data = json!({
            "$and": [
                {"$or": [{"a": 1}, {"b": {"$in": ["x", "y"]}}]},
                {"tenant_id": "t1"}
            ]
        });
        let (sql, params) = FilterWhere::generate(&where_data, 1).unwrap();
        assert_eq!(
            sql,
            "((((\"a\" = $2) OR (\"b\"::text IN ($3, $4)))) AND (\"tenant_id\"::text = $5))"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn empty_and_null_handling() {
        assert_eq!(FilterWhere::generate(&json!({}), 0).unwrap().0, "1=1");
        assert_eq!(FilterWhere::generate(&Value::Null, 0).unwrap().0, "1=1");
        assert_eq!(FilterWhere::generate(&json!({"deleted_at": null}), 0).unwrap().0, "\"deleted_at\" IS NULL");
        assert_eq!(FilterWhere::generate(&json!({"id": {"$in": []}}), 0).unwrap().0, "1=0");
        assert_eq!(FilterWhere::generate(&json!({"$or": []}), 0).unwrap().0, "1=0");
    }

    #[test]
    fn rejects_raw_sql_and_bad_columns() {
        assert!(FilterWhere::generate(&json!("1=1) OR (1=1"), 0).is_err());
        assert!(matches!(
            FilterWhere::generate(&json!({"a\" OR 1=1 --": 1}), 0),
            Err(FilterError::InvalidColumn(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({"a": {"$regex": "x"}}), 0),
            Err(FilterError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn not_and_between() {
        let (sql, params) =
            FilterWhere::generate(&json!({"$not": {"n": {"$between": [1, 5]}}}), 0).unwrap();
        assert_eq!(sql, "NOT COALESCE((\"n\" BETWEEN $1 AND $2), FALSE)");
        assert_eq!(params.len(), 2);

        let (sql, _) = FilterWhere::generate(&json!({"$not": {"status": "paid"}}), 0).unwrap();
        assert_eq!(sql, "NOT COALESCE((\"status\"::text = $1), FALSE)");
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut node = json!({"a": 1});
        for _ in 0..12 {
            node = json!({"$not": node});
        }
        assert!(FilterWhere::generate(&node, 0).is_err());
    }
}
