//! Evaluates the JSON filter language against in-memory rows, with the same
//! semantics the SQL renderer produces.

use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOp, SortDirection};

pub fn matches(row: &Value, where_data: &Value) -> Result<bool, FilterError> {
    FilterWhere::validate(where_data)?;
    match_node(row, where_data)
}

/// Filter, sort, page and project `rows` as a SELECT would
pub fn apply(rows: impl IntoIterator<Item = Value>, data: &FilterData) -> Result<Vec<Value>, FilterError> {
    let where_data = data.where_clause.clone().unwrap_or(Value::Null);
    FilterWhere::validate(&where_data)?;

    let mut selected = Vec::new();
    for row in rows {
        if match_node(&row, &where_data)? {
            selected.push(row);
        }
    }

    if let Some(order) = &data.order {
        let order = FilterOrder::validate_and_parse(order)?;
        selected.sort_by(|a, b| {
            for info in &order {
                let ord = compare(field(a, &info.column), field(b, &info.column)).unwrap_or(Ordering::Equal);
                let ord = if info.sort == SortDirection::Desc { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    if let Some(offset) = data.offset {
        if offset < 0 {
            return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
        }
        selected = selected.into_iter().skip(offset as usize).collect();
    }
    if let Some(limit) = data.limit {
        if limit < 0 {
            return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string()));
        }
        selected.truncate(limit as usize);
    }

    if let Some(select) = data.select.as_ref().filter(|s| !s.iter().any(|c| c == "*")) {
        selected = selected
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => Value::Object(
                    map.into_iter().filter(|(k, _)| select.contains(k)).collect(),
                ),
                other => other,
            })
            .collect();
    }
    Ok(selected)
}

fn field<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn match_node(row: &Value, node: &Value) -> Result<bool, FilterError> {
    let obj = match node {
        Value::Null => return Ok(true),
        Value::Object(obj) => obj,
        _ => return Err(FilterError::InvalidWhereClause("Nested WHERE must be an object".to_string())),
    };

    for (key, value) in obj {
        let ok = match key.as_str() {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", key)))?;
                let mut results = Vec::with_capacity(arr.len());
                for v in arr {
                    results.push(match_node(row, v)?);
                }
                if key == "$and" { results.iter().all(|r| *r) } else { results.iter().any(|r| *r) }
            }
            "$not" => !match_node(row, value)?,
            k if k.starts_with('$') => return Err(FilterError::UnsupportedOperator(k.to_string())),
            column => {
                FilterWhere::validate_column(column)?;
                match_field(field(row, column), value)?
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_field(actual: &Value, condition: &Value) -> Result<bool, FilterError> {
    match condition {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            for (op_key, expected) in ops {
                let op = FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                if !apply_op(op, actual, expected)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        expected => apply_op(FilterOp::Eq, actual, expected),
    }
}

fn apply_op(op: FilterOp, actual: &Value, expected: &Value) -> Result<bool, FilterError> {
    Ok(match op {
        FilterOp::Eq => equals(actual, expected),
        FilterOp::Ne => !equals(actual, expected),
        FilterOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Like | FilterOp::ILike => {
            let pattern = expected
                .as_str()
                .ok_or_else(|| FilterError::InvalidOperatorData("LIKE pattern must be a string".to_string()))?;
            match text(actual) {
                Some(value) if op == FilterOp::ILike => like(&value.to_lowercase(), &pattern.to_lowercase()),
                Some(value) => like(&value, pattern),
                None => false,
            }
        }
        FilterOp::In | FilterOp::NIn => {
            let found = match expected {
                Value::Array(values) => values.iter().any(|v| equals(actual, v)),
                other => equals(actual, other),
            };
            // SQL NULL never matches IN or NOT IN
            !actual.is_null() && (found == (op == FilterOp::In))
        }
        FilterOp::Between => match expected {
            Value::Array(bounds) if bounds.len() == 2 => {
                matches!(compare(actual, &bounds[0]), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(actual, &bounds[1]), Some(Ordering::Less | Ordering::Equal))
            }
            _ => return Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string())),
        },
    })
}

fn equals(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// SQL LIKE: `%` matches any run, `_` matches one character
fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut vi, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == v[vi])) {
            vi += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((sp, sv)) = star {
            pi = sp + 1;
            vi = sv + 1;
            star = Some((sp, sv + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": "1", "status": "open", "total": 10, "tenant_id": "a"}),
            json!({"id": "2", "status": "paid", "total": 25.5, "tenant_id": "a"}),
            json!({"id": "3", "status": "open", "total": 40, "tenant_id": "b"}),
        ]
    }

    #[test]
    fn equality_and_comparisons() {
        let row = &rows()[1];
        assert!(matches(row, &json!({"status": "paid"})).unwrap());
        assert!(matches(row, &json!({"total": {"$gt": 20, "$lt": 30}})).unwrap());
        assert!(matches(row, &json!({"total": {"$between": [25.5, 26]}})).unwrap());
        assert!(!matches(row, &json!({"missing": {"$gt": 1}})).unwrap());
        assert!(matches(row, &json!({"missing": null})).unwrap());
    }

    #[test]
    fn logical_composition() {
        let scoped = json!({"$and": [{"$or": [{"status": "open"}, {"total": {"$gte": 20}}]}, {"tenant_id": "a"}]});
        let ids: Vec<_> = apply(rows(), &FilterData::matching(scoped))
            .unwrap()
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("1"), json!("2")]);
        assert!(matches(&rows()[0], &json!({"$not": {"status": "paid"}})).unwrap());
    }

    #[test]
    fn not_keeps_rows_missing_the_field() {
        let row = json!({"id": "1"});
        assert!(matches(&row, &json!({"$not": {"status": "paid"}})).unwrap());
        assert!(matches(&row, &json!({"$not": {"total": {"$gt": 5}}})).unwrap());
        assert!(!matches(&row, &json!({"$not": {"$not": {"status": "paid"}}})).unwrap());
    }

    #[test]
    fn like_patterns() {
        assert!(like("invoice-2024", "invoice-%"));
        assert!(like("abc", "a_c"));
        assert!(!like("abc", "a_"));
        assert!(like("", "%"));
        assert!(matches(&json!({"name": "ACME"}), &json!({"name": {"$ilike": "ac%"}})).unwrap());
    }

    #[test]
    fn in_and_nin() {
        let row = &rows()[0];
        assert!(matches(row, &json!({"status": {"$in": ["open", "void"]}})).unwrap());
        assert!(matches(row, &json!({"status": {"$nin": ["paid"]}})).unwrap());
        assert!(!matches(&json!({}), &json!({"status": {"$nin": ["paid"]}})).unwrap());
    }

    #[test]
    fn order_page_and_project() {
        let data = FilterData {
            select: Some(vec!["id".into()]),
            where_clause: None,
            order: Some(json!("total desc")),
            limit: Some(2),
            offset: Some(1),
        };
        assert_eq!(apply(rows(), &data).unwrap(), vec![json!({"id": "2"}), json!({"id": "1"})]);
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(matches(&rows()[0], &json!({"$where": "1"})).is_err());
        assert!(matches(&rows()[0], &json!({"status": {"$regex": "o"}})).is_err());
    }
}
