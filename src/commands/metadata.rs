use crate::commands::query::{QueryExecutor, ResultSet};
use crate::error::Result;
use crate::models::{SchemaSnapshot, TableType};

/// Human-readable listing for `askql schema` and the console `:schema` command.
pub fn describe_schema(snapshot: &SchemaSnapshot) -> String {
    if snapshot.is_empty() {
        return format!("Schema \"{}\" has no tables or views.", snapshot.schema_name);
    }

    let mut out = format!(
        "Schema \"{}\" ({} tables)\n",
        snapshot.schema_name,
        snapshot.tables.len()
    );
    for table in &snapshot.tables {
        let kind = match table.table.table_type {
            TableType::Table => "",
            TableType::View => " (view)",
        };
        out.push_str(&format!("\n{}{}\n", table.table.name, kind));
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.is_primary_key {
                flags.push("pk");
            }
            if !column.is_nullable {
                flags.push("not null");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            out.push_str(&format!("  {} {}{}\n", column.name, column.data_type, flags));
        }
    }
    out
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `n` random rows of a table, fetched through the read-only executor.
pub async fn sample_rows(executor: &dyn QueryExecutor, table: &str, n: u32) -> Result<ResultSet> {
    let sql = format!("SELECT * FROM {} ORDER BY random() LIMIT {}", quote_ident(table), n);
    executor.execute(&sql).await
}

/// Markdown sample data for the first `max_tables` tables of the snapshot.
pub async fn sample_data(
    executor: &dyn QueryExecutor,
    snapshot: &SchemaSnapshot,
    max_tables: usize,
    rows_per_table: u32,
) -> String {
    let mut sections = Vec::new();
    for name in snapshot.table_names().into_iter().take(max_tables) {
        match sample_rows(executor, name, rows_per_table).await {
            Ok(rows) => sections.push(format!(
                "**{}**\n{}",
                name,
                rows.to_markdown(rows_per_table as usize)
            )),
            Err(e) => log::warn!("Could not sample {}: {}", name, e),
        }
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::query::ColumnDef;
    use crate::models::{ColumnInfo, TableInfo, TableSchema};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl QueryExecutor for Recorder {
        async fn execute(&self, sql: &str) -> Result<ResultSet> {
            self.0.lock().unwrap().push(sql.to_string());
            if sql.contains("\"broken\"") {
                return Err(crate::error::Error::ReadOnly("nope".into()));
            }
            Ok(ResultSet {
                columns: vec![ColumnDef {
                    name: "id".into(),
                    data_type: "INT4".into(),
                }],
                rows: vec![serde_json::json!({"id": 7})],
                row_count: 1,
                truncated: false,
                execution_time_ms: 1,
            })
        }
    }

    fn table(name: &str, table_type: TableType) -> TableSchema {
        TableSchema {
            table: TableInfo {
                name: name.into(),
                schema_name: "public".into(),
                table_type,
            },
            columns: vec![ColumnInfo {
                name: "id".into(),
                data_type: "integer".into(),
                is_nullable: false,
                is_primary_key: true,
                ordinal_position: 1,
                column_default: None,
            }],
        }
    }

    #[test]
    fn describes_tables_and_views() {
        let snapshot = SchemaSnapshot {
            schema_name: "public".into(),
            tables: vec![table("orders", TableType::Table), table("open_orders", TableType::View)],
        };
        let text = describe_schema(&snapshot);
        assert!(text.starts_with("Schema \"public\" (2 tables)"));
        assert!(text.contains("\norders\n  id integer [pk, not null]\n"));
        assert!(text.contains("open_orders (view)"));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("Order Items"), "\"Order Items\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn samples_skip_failing_tables() {
        let executor = Recorder(Mutex::new(Vec::new()));
        let snapshot = SchemaSnapshot {
            schema_name: "public".into(),
            tables: vec![
                table("broken", TableType::Table),
                table("steps", TableType::Table),
                table("ignored", TableType::Table),
            ],
        };

        let text = sample_data(&executor, &snapshot, 2, 10).await;

        assert_eq!(text, "**steps**\n| id |\n|---|\n| 7 |");
        let sql = executor.0.lock().unwrap();
        assert_eq!(sql.len(), 2);
        assert_eq!(sql[1], "SELECT * FROM \"steps\" ORDER BY random() LIMIT 10");
    }
}
