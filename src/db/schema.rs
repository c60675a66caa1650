//! Database schema types for askdb.
//!
//! Represents the structure of a database (tables, columns, foreign keys)
//! and renders it as the schema text embedded in every SQL prompt.

/// Represents the complete schema of a database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// All tables in the schema.
    pub tables: Vec<Table>,

    /// Foreign key relationships between tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table with the given name (case-insensitive).
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Formats the schema for inclusion in an LLM prompt.
    pub fn format_for_llm(&self) -> String {
        if self.tables.is_empty() {
            return "(no tables)".to_string();
        }

        let mut out = self
            .tables
            .iter()
            .map(|table| self.format_table(table))
            .collect::<Vec<_>>()
            .join("\n");

        if !self.foreign_keys.is_empty() {
            out.push_str("\nRelationships:\n");
            for fk in &self.foreign_keys {
                out.push_str(&format!(
                    "  - {}.{} -> {}.{}\n",
                    fk.from_table,
                    fk.from_columns.join(", "),
                    fk.to_table,
                    fk.to_columns.join(", ")
                ));
            }
        }

        out
    }

    fn format_table(&self, table: &Table) -> String {
        let mut out = format!("Table: {}\n", table.name);
        for column in &table.columns {
            out.push_str(&self.format_column(table, column));
        }

        if !table.sample_rows.is_empty() {
            let names = table
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>();
            out.push_str(&format!(
                "  Sample rows ({}):\n",
                names.join(" | ")
            ));
            for row in &table.sample_rows {
                out.push_str(&format!("    {}\n", row.join(" | ")));
            }
        }

        out
    }

    fn format_column(&self, table: &Table, column: &Column) -> String {
        let fk_refs = self
            .foreign_keys
            .iter()
            .filter(|fk| fk.from_table == table.name)
            .filter_map(|fk| {
                let pos = fk.from_columns.iter().position(|c| *c == column.name)?;
                let target = fk.to_columns.get(pos).map(String::as_str).unwrap_or("?");
                Some(format!("FK -> {}.{}", fk.to_table, target))
            });

        let annotations = table
            .primary_key
            .contains(&column.name)
            .then(|| "PK".to_string())
            .into_iter()
            .chain((!column.is_nullable).then(|| "NOT NULL".to_string()))
            .chain(column.default.as_ref().map(|d| format!("DEFAULT {d}")))
            .chain(fk_refs)
            .collect::<Vec<_>>();

        let data_type = if column.data_type.is_empty() {
            "ANY"
        } else {
            column.data_type.as_str()
        };

        if annotations.is_empty() {
            format!("  - {}: {}\n", column.name, data_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                data_type,
                annotations.join(", ")
            )
        }
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in the table.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,

    /// A few rows rendered as text, shown to the model as value examples.
    pub sample_rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column (builder style).
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type (e.g., "INTEGER", "TEXT"); SQLite allows it to be empty.
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a new nullable column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Sets the default value.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }
}

/// Represents a foreign key relationship between tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeignKey {
    /// Source table name.
    pub from_table: String,

    /// Source column names.
    pub from_columns: Vec<String>,

    /// Target table name.
    pub to_table: String,

    /// Target column names.
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    /// Creates a new foreign key relationship.
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }
}
