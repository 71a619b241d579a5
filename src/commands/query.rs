use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlx::postgres::types::{PgMoney, PgTimeTz};
use sqlx::postgres::{PgColumn, PgPool, PgRow, PgTypeKind, PgValueFormat};
use sqlx::{Column, Executor, Row, Statement as _, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::models::{validate_schema_name, QuerySettings};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub schema: String,
    pub row_limit: usize,
    pub statement_timeout_seconds: u32,
}

impl ExecOptions {
    pub fn new(schema: &str, settings: &QuerySettings) -> Self {
        Self {
            schema: schema.to_string(),
            row_limit: settings.row_limit as usize,
            statement_timeout_seconds: settings.statement_timeout_seconds,
        }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet>;
}

pub struct PgExecutor {
    pool: PgPool,
    options: ExecOptions,
}

impl PgExecutor {
    pub fn new(pool: PgPool, options: ExecOptions) -> Self {
        Self { pool, options }
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        execute_read_only(&self.pool, sql, &self.options).await
    }
}

/// Accept exactly one statement that only reads.
pub fn check_read_only(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| Error::SqlParse(e.to_string()))?;

    match statements.as_slice() {
        [] => Err(Error::ReadOnly("no statement found".to_string())),
        [Statement::Query(query)] if query_is_read_only(query) => Ok(()),
        [Statement::Query(_)] => Err(Error::ReadOnly(
            "query writes data or takes row locks".to_string(),
        )),
        [_] => Err(Error::ReadOnly("only SELECT queries are allowed".to_string())),
        many => Err(Error::ReadOnly(format!(
            "expected one statement, found {}",
            many.len()
        ))),
    }
}

fn query_is_read_only(query: &Query) -> bool {
    let ctes_ok = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| query_is_read_only(&cte.query)));

    ctes_ok && query.locks.is_empty() && set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(expr: &SetExpr) -> bool {
    match expr {
        // SELECT ... INTO creates a table
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// Run a query inside a read-only transaction that is always rolled back.
pub async fn execute_read_only(pool: &PgPool, sql: &str, opts: &ExecOptions) -> Result<ResultSet> {
    check_read_only(sql)?;
    validate_schema_name(&opts.schema)?;

    let start = Instant::now();
    let mut tx = pool.begin().await?;

    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;

    let escaped_schema = opts.schema.replace('"', "\"\"");
    sqlx::query(&format!("SET LOCAL search_path TO \"{}\", public", escaped_schema))
        .execute(&mut *tx)
        .await?;

    if opts.statement_timeout_seconds > 0 {
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            u64::from(opts.statement_timeout_seconds) * 1000
        ))
        .execute(&mut *tx)
        .await?;
    }

    let result = match sqlx::query(sql).fetch_all(&mut *tx).await {
        // No row to read the header from, so ask the prepared statement
        Ok(rows) if rows.is_empty() => (&mut *tx)
            .prepare(sql)
            .await
            .map(|stmt| (column_defs(stmt.columns()), rows)),
        Ok(rows) => {
            let columns = rows
                .first()
                .map(|row| column_defs(row.columns()))
                .unwrap_or_default();
            Ok((columns, rows))
        }
        Err(e) => Err(e),
    };
    tx.rollback().await?;
    let (columns, rows) = result?;

    let execution_time_ms = start.elapsed().as_millis() as u64;
    log::info!("Query returned {} rows in {}ms", rows.len(), execution_time_ms);

    Ok(rows_to_result_set(columns, rows, opts.row_limit, execution_time_ms))
}

fn column_defs(columns: &[PgColumn]) -> Vec<ColumnDef> {
    columns
        .iter()
        .map(|col| ColumnDef {
            name: col.name().to_string(),
            data_type: col.type_info().to_string(),
        })
        .collect()
}

fn rows_to_result_set(
    columns: Vec<ColumnDef>,
    rows: Vec<PgRow>,
    row_limit: usize,
    execution_time_ms: u64,
) -> ResultSet {
    let total_rows = rows.len();
    let json_rows = rows
        .into_iter()
        .take(row_limit)
        .map(|row| {
            let mut map = serde_json::Map::new();
            for (i, col) in columns.iter().enumerate() {
                map.insert(col.name.clone(), extract_value(&row, i, &col.data_type));
            }
            Value::Object(map)
        })
        .collect();

    ResultSet {
        columns,
        rows: json_rows,
        row_count: total_rows,
        truncated: total_rows > row_limit,
        execution_time_ms,
    }
}

fn or_null<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map(f).unwrap_or(Value::Null)
}

fn float(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

/// Decode one cell by its PostgreSQL type name
fn extract_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let upper_type = type_name.to_uppercase();
    let type_str = upper_type.as_str();

    if type_str.starts_with('_') || type_str.ends_with("[]") {
        return extract_array_value(row, index, type_str);
    }

    match type_str {
        "INT2" | "SMALLINT" => {
            if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
                return or_null(v, |n| Value::Number(n.into()));
            }
        }
        "INT4" | "INTEGER" | "OID" => {
            if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
                return or_null(v, |n| Value::Number(n.into()));
            }
        }
        "INT8" | "BIGINT" => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
                return or_null(v, |n| Value::Number(n.into()));
            }
        }
        "FLOAT4" | "REAL" => {
            if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
                return or_null(v, |n| float(n as f64));
            }
        }
        "FLOAT8" | "DOUBLE PRECISION" => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
                return or_null(v, float);
            }
        }
        // Exact decimal text; NaN and out-of-range values fall through to the raw text
        "NUMERIC" | "DECIMAL" => {
            if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(index) {
                return or_null(v, |d| Value::String(d.normalize().to_string()));
            }
        }
        "BOOL" | "BOOLEAN" => {
            if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
                return or_null(v, Value::Bool);
            }
        }
        "JSON" | "JSONB" => {
            if let Ok(v) = row.try_get::<Option<Value>, _>(index) {
                return v.unwrap_or(Value::Null);
            }
        }
        "UUID" => {
            if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(index) {
                return or_null(v, |u| Value::String(u.to_string()));
            }
        }
        "TIMESTAMP" => {
            if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
                return or_null(v, |dt| {
                    Value::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
                });
            }
        }
        "TIMESTAMPTZ" => {
            if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
                return or_null(v, |dt| Value::String(dt.to_rfc3339()));
            }
        }
        "DATE" => {
            if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
                return or_null(v, |d| Value::String(d.to_string()));
            }
        }
        "TIME" => {
            if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(index) {
                return or_null(v, |t| Value::String(t.format("%H:%M:%S%.f").to_string()));
            }
        }
        "TIMETZ" => {
            if let Ok(v) =
                row.try_get::<Option<PgTimeTz<chrono::NaiveTime, chrono::FixedOffset>>, _>(index)
            {
                return or_null(v, |t| {
                    Value::String(format!("{}{}", t.time.format("%H:%M:%S%.f"), t.offset))
                });
            }
        }
        // Money is sent as cents; two fraction digits match the default lc_monetary
        "MONEY" => {
            if let Ok(v) = row.try_get::<Option<PgMoney>, _>(index) {
                return or_null(v, |m| Value::String(m.to_decimal(2).to_string()));
            }
        }
        "INET" => {
            if let Ok(v) = row.try_get::<Option<ipnetwork::IpNetwork>, _>(index) {
                return or_null(v, |ip| {
                    let single_host = match ip {
                        ipnetwork::IpNetwork::V4(net) => net.prefix() == 32,
                        ipnetwork::IpNetwork::V6(net) => net.prefix() == 128,
                    };
                    if single_host {
                        Value::String(ip.ip().to_string())
                    } else {
                        Value::String(ip.to_string())
                    }
                });
            }
        }
        "CIDR" => {
            if let Ok(v) = row.try_get::<Option<ipnetwork::IpNetwork>, _>(index) {
                return or_null(v, |ip| Value::String(ip.to_string()));
            }
        }
        "MACADDR" => {
            if let Ok(v) = row.try_get::<Option<mac_address::MacAddress>, _>(index) {
                return or_null(v, |mac| Value::String(mac.to_string().to_lowercase()));
            }
        }
        "BYTEA" => {
            if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
                return or_null(v, |bytes| Value::String(format!("\\x{}", hex::encode(bytes))));
            }
        }
        "INTERVAL" => {
            if let Ok(v) = row.try_get::<Option<sqlx::postgres::types::PgInterval>, _>(index) {
                return or_null(v, |interval| {
                    Value::String(format_interval(
                        interval.months,
                        interval.days,
                        interval.microseconds,
                    ))
                });
            }
        }
        _ => {}
    }

    // TEXT, VARCHAR, enums and anything sqlx will hand over as a string
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return or_null(v, Value::String);
    }

    match raw_text(row, index) {
        RawCell::Null => Value::Null,
        RawCell::Text(s) => Value::String(s),
        RawCell::Opaque => undecoded(type_name),
    }
}

/// Placeholder for a value whose binary encoding this module cannot read.
fn undecoded(type_name: &str) -> Value {
    Value::String(format!("<{} value>", type_name.to_lowercase()))
}

fn extract_array_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let base_type = type_name.trim_start_matches('_').trim_end_matches("[]");

    match base_type {
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" => {
            if let Ok(v) = row.try_get::<Option<Vec<i64>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(Value::from).collect());
            }
            if let Ok(v) = row.try_get::<Option<Vec<i32>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(Value::from).collect());
            }
            if let Ok(v) = row.try_get::<Option<Vec<i16>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(Value::from).collect());
            }
        }
        "FLOAT8" | "DOUBLE PRECISION" => {
            if let Ok(v) = row.try_get::<Option<Vec<f64>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(float).collect());
            }
        }
        "BOOL" | "BOOLEAN" => {
            if let Ok(v) = row.try_get::<Option<Vec<bool>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(Value::Bool).collect());
            }
        }
        "FLOAT4" | "REAL" => {
            if let Ok(v) = row.try_get::<Option<Vec<f32>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(|n| float(n as f64)).collect());
            }
        }
        "NUMERIC" | "DECIMAL" => {
            if let Ok(v) = row.try_get::<Option<Vec<rust_decimal::Decimal>>, _>(index) {
                return or_null(v, |arr| {
                    arr.into_iter()
                        .map(|d| Value::String(d.normalize().to_string()))
                        .collect()
                });
            }
        }
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(index) {
                return or_null(v, |arr| arr.into_iter().map(Value::String).collect());
            }
        }
        "UUID" => {
            if let Ok(v) = row.try_get::<Option<Vec<uuid::Uuid>>, _>(index) {
                return or_null(v, |arr| {
                    arr.into_iter().map(|u| Value::String(u.to_string())).collect()
                });
            }
        }
        "DATE" => {
            if let Ok(v) = row.try_get::<Option<Vec<chrono::NaiveDate>>, _>(index) {
                return or_null(v, |arr| {
                    arr.into_iter().map(|d| Value::String(d.to_string())).collect()
                });
            }
        }
        _ => {}
    }

    match raw_text(row, index) {
        RawCell::Text(s) if s.starts_with('{') && s.ends_with('}') => {
            Value::Array(parse_pg_array_string(&s[1..s.len() - 1]))
        }
        RawCell::Text(s) => Value::String(s),
        RawCell::Null => Value::Null,
        RawCell::Opaque => undecoded(type_name),
    }
}

enum RawCell {
    Null,
    Text(String),
    Opaque,
}

/// Read a cell as text when its wire bytes are text.
///
/// Rows come back in binary format, where only enum labels and XML are plain
/// UTF-8. Any other binary value is `Opaque`, never reinterpreted as a string.
fn raw_text(row: &PgRow, index: usize) -> RawCell {
    let Ok(value_ref) = row.try_get_raw(index) else {
        return RawCell::Opaque;
    };
    if value_ref.is_null() {
        return RawCell::Null;
    }

    let textual = match value_ref.format() {
        PgValueFormat::Text => true,
        PgValueFormat::Binary => {
            let type_info = value_ref.type_info();
            matches!(type_info.kind(), PgTypeKind::Enum(_))
                || type_info.name().eq_ignore_ascii_case("XML")
        }
    };
    if !textual {
        return RawCell::Opaque;
    }

    match value_ref.as_str() {
        Ok(s) => RawCell::Text(s.to_string()),
        Err(_) => RawCell::Opaque,
    }
}

/// Split the inside of a `{a,b,"c d",NULL}` array literal.
fn parse_pg_array_string(s: &str) -> Vec<Value> {
    if s.is_empty() {
        return Vec::new();
    }

    let mut elements = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in s.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                elements.push(pg_element_to_json(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    elements.push(pg_element_to_json(&current));

    elements
}

fn pg_element_to_json(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(n) = trimmed.parse::<i64>() {
        Value::Number(n.into())
    } else if let Ok(n) = trimmed.parse::<f64>() {
        float(n)
    } else if trimmed == "t" {
        Value::Bool(true)
    } else if trimmed == "f" {
        Value::Bool(false)
    } else {
        Value::String(trimmed.to_string())
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{}", n, unit, if n.abs() != 1 { "s" } else { "" })
}

/// Render an interval the way psql does (`1 year 2 mons 3 days 04:05:06`).
fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(plural(years as i64, "year"));
    }
    if months != 0 {
        parts.push(plural(months as i64, "mon"));
    }
    if days != 0 {
        parts.push(plural(days as i64, "day"));
    }
    if microseconds != 0 || parts.is_empty() {
        let sign = if microseconds < 0 { "-" } else { "" };
        let micros_abs = microseconds.unsigned_abs();
        let total_secs = micros_abs / 1_000_000;
        let fraction = micros_abs % 1_000_000;
        let clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60
        );
        if fraction != 0 {
            parts.push(format!("{}.{:06}", clock, fraction));
        } else {
            parts.push(clock);
        }
    }
    parts.join(" ")
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cells(&self, row: &Value) -> Vec<String> {
        self.columns
            .iter()
            .map(|col| cell_text(row.get(&col.name)))
            .collect()
    }

    /// Pipe table of at most `max_rows` rows, with a footer when rows were left out.
    pub fn to_markdown(&self, max_rows: usize) -> String {
        if self.columns.is_empty() {
            return "(no rows)".to_string();
        }

        let escape = |s: &str| s.replace('|', "\\|").replace(['\n', '\r'], " ");
        let header: Vec<String> = self.columns.iter().map(|c| escape(&c.name)).collect();

        let mut lines = vec![
            format!("| {} |", header.join(" | ")),
            format!("|{}|", vec!["---"; header.len()].join("|")),
        ];
        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = self.cells(row).iter().map(|c| escape(c)).collect();
            lines.push(format!("| {} |", cells.join(" | ")));
        }

        let shown = self.rows.len().min(max_rows);
        if shown < self.row_count {
            lines.push(String::new());
            lines.push(format!("({} of {} rows shown)", shown, self.row_count));
        }

        lines.join("\n")
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in &self.rows {
            writer.write_record(self.cells(row))?;
        }
        writer.flush()?;
        Ok(())
    }
}
