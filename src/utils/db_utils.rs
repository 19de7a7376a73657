use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlRow;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::String(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

/// Binds every value onto a `query`, `query_as` or `query_scalar` builder.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                SqlValue::String(v) => query.bind(v.clone()),
                SqlValue::I64(v) => query.bind(*v),
                SqlValue::U64(v) => query.bind(*v),
                SqlValue::F64(v) => query.bind(*v),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Date(v) => query.bind(*v),
                SqlValue::DateTime(v) => query.bind(*v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only keys listed in `allowed` may appear in the payload; anything else is
/// rejected so a client can never touch ids, balances or audit columns.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_value: u64,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::validation("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::validation(format!("Field '{unknown}' cannot be updated")));
    }

    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, set_clause);

    let mut values = Vec::with_capacity(obj.len() + 1);

    // Convert JSON values → SqlValue
    for value in obj.values() {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    values.push(SqlValue::DateTime(dt));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(ApiError::validation("Unsupported JSON value type")),
        }
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Rejects a payload whose `key`, when present, is not a valid `E`.
pub fn check_enum_field<E: FromStr>(payload: &Value, key: &str) -> ApiResult<()> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) if s.parse::<E>().is_ok() => Ok(()),
        Some(other) => Err(ApiError::validation(format!("Invalid {key}: {other}"))),
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let query = bind_values!(sqlx::query(&update.sql), &update.values);
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Dynamic `WHERE` builder used by every filtered list.
#[derive(Debug, Default)]
pub struct SqlFilter {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?` when a value is given.
    pub fn and_eq<V: Into<SqlValue>>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{column} = ?"));
            self.values.push(v.into());
        }
        self
    }

    /// Any condition with a single placeholder.
    pub fn and<V: Into<SqlValue>>(&mut self, condition: &str, value: V) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.values.push(value.into());
        self
    }

    pub fn and_raw(&mut self, condition: &str) -> &mut Self {
        self.conditions.push(condition.to_string());
        self
    }

    /// Inclusive range; either bound may be missing.
    pub fn and_between<V: Into<SqlValue>>(
        &mut self,
        column: &str,
        from: Option<V>,
        to: Option<V>,
    ) -> &mut Self {
        if let Some(from) = from {
            self.conditions.push(format!("{column} >= ?"));
            self.values.push(from.into());
        }
        if let Some(to) = to {
            self.conditions.push(format!("{column} <= ?"));
            self.values.push(to.into());
        }
        self
    }

    /// `(a LIKE ? OR b LIKE ?)` over the given columns, ignoring blank terms.
    pub fn and_search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let like = format!("%{}%", term);
        let ors = columns
            .iter()
            .map(|c| format!("{c} LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({ors})"));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// Page request normalised the same way everywhere: `page >= 1`,
/// `per_page` in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(20).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

pub async fn fetch_all_as<T>(
    pool: &MySqlPool,
    sql: &str,
    values: &[SqlValue],
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
{
    debug!(sql = %sql, bindings = ?values, "Fetching rows");
    bind_values!(sqlx::query_as::<_, T>(sql), values)
        .fetch_all(pool)
        .await
}

pub async fn fetch_count(
    pool: &MySqlPool,
    sql: &str,
    values: &[SqlValue],
) -> Result<i64, sqlx::Error> {
    debug!(sql = %sql, bindings = ?values, "Counting rows");
    bind_values!(sqlx::query_scalar::<_, i64>(sql), values)
        .fetch_one(pool)
        .await
}

/// Runs the count query and the page query for a filtered list.
///
/// `from` is everything after `SELECT ... ` up to (not including) the
/// `WHERE`, e.g. `"FROM employees"`.
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    columns: &str,
    from: &str,
    filter: &SqlFilter,
    order_by: &str,
    page: PageRequest,
) -> Result<Paginated<T>, sqlx::Error>
where
    T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
{
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) {from} {where_clause}");
    let total = fetch_count(pool, &count_sql, filter.values()).await?;

    let data_sql =
        format!("SELECT {columns} {from} {where_clause} ORDER BY {order_by} LIMIT ? OFFSET ?");
    let mut values = filter.values().to_vec();
    values.push(SqlValue::U64(page.per_page as u64));
    values.push(SqlValue::U64(page.offset()));
    let data = fetch_all_as::<T>(pool, &data_sql, &values).await?;

    Ok(Paginated {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::employee::EmployeeStatus;
    use serde_json::json;

    #[test]
    fn update_sql_keeps_key_order_and_appends_id() {
        let payload = json!({"first_name": "Ada", "salary": 1200.5, "hire_date": "2026-01-05"});
        let update =
            build_update_sql("employees", &payload, &["first_name", "salary", "hire_date"], 9)
                .unwrap();

        assert!(update.sql.starts_with("UPDATE employees SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert_eq!(update.values.len(), 4);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
        assert!(update.values.contains(&SqlValue::Date(
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        )));
    }

    #[test]
    fn update_sql_rejects_columns_outside_allow_list() {
        let payload = json!({"annual_leave_balance": 99});
        let err = build_update_sql("employees", &payload, &["first_name"], 1).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn update_sql_rejects_empty_payload() {
        assert!(build_update_sql("employees", &json!({}), &["first_name"], 1).is_err());
        assert!(build_update_sql("employees", &json!([1]), &["first_name"], 1).is_err());
    }

    #[test]
    fn enum_fields_are_checked() {
        assert!(check_enum_field::<EmployeeStatus>(&json!({"status": "active"}), "status").is_ok());
        assert!(check_enum_field::<EmployeeStatus>(&json!({"status": "gone"}), "status").is_err());
        assert!(check_enum_field::<EmployeeStatus>(&json!({"salary": 1}), "status").is_ok());
    }

    #[test]
    fn filter_builds_where_clause_in_order() {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("department_id", Some(3u64))
            .and_eq::<String>("status", None)
            .and_search(&["first_name", "email"], Some(" ada "))
            .and_between(
                "date",
                Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
                None,
            );

        assert_eq!(
            filter.where_clause(),
            "WHERE department_id = ? AND (first_name LIKE ? OR email LIKE ?) AND date >= ?"
        );
        assert_eq!(filter.values().len(), 4);
        assert_eq!(filter.values()[1], SqlValue::String("%ada%".into()));
    }

    #[test]
    fn blank_search_adds_nothing() {
        let mut filter = SqlFilter::new();
        filter.and_search(&["name"], Some("   "));
        assert_eq!(filter.where_clause(), "");
    }

    #[test]
    fn page_request_is_clamped() {
        let page = PageRequest::new(Some(0), Some(500));
        assert_eq!(page, PageRequest { page: 1, per_page: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
        assert_eq!(PageRequest::new(None, None).per_page, 20);
    }
}
