use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Table,
    View,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    pub schema_name: String,
    pub table_type: TableType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_position: i32,
    pub column_default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table: TableInfo,
    pub columns: Vec<ColumnInfo>,
}

/// Tables and columns of one schema, as fed into prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub schema_name: String,
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    /// Render as prompt text: a bold table name followed by `- column: type` lines.
    pub fn render(&self) -> String {
        let mut items = Vec::new();
        for table in &self.tables {
            items.push(format!("\n**{}**", table.table.name));
            for column in &table.columns {
                items.push(format!("- {}: {}", column.name, column.data_type));
            }
        }
        items.join("\n")
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, position: i32) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: position == 1,
            ordinal_position: position,
            column_default: None,
        }
    }

    #[test]
    fn renders_tables_and_columns() {
        let snapshot = SchemaSnapshot {
            schema_name: "billing".into(),
            tables: vec![
                TableSchema {
                    table: TableInfo {
                        name: "invoices".into(),
                        schema_name: "billing".into(),
                        table_type: TableType::Table,
                    },
                    columns: vec![column("id", "bigint", 1), column("total", "numeric", 2)],
                },
                TableSchema {
                    table: TableInfo {
                        name: "customers".into(),
                        schema_name: "billing".into(),
                        table_type: TableType::Table,
                    },
                    columns: vec![column("name", "text", 1)],
                },
            ],
        };

        assert_eq!(
            snapshot.render(),
            "\n**invoices**\n- id: bigint\n- total: numeric\n\n**customers**\n- name: text"
        );
        assert_eq!(snapshot.table_names(), vec!["invoices", "customers"]);
    }

    #[test]
    fn empty_schema_renders_empty() {
        assert_eq!(SchemaSnapshot::default().render(), "");
    }
}
