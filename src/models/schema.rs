//! Schema-related data models.
//!
//! Read-only projections of catalog metadata. They are rebuilt on every call
//! and never cached.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Type as reported by the catalog (e.g. `character varying(30)`)
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnReference>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
            primary_key: false,
            references: None,
        }
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.primary_key = is_pk;
        self
    }
}

/// Target of a foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnReference {
    pub schema: String,
    pub table: String,
    /// None when the key implicitly targets the referenced primary key (SQLite)
    pub column: Option<String>,
}

impl std::fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}({})", self.schema, self.table, column),
            None => write!(f, "{}.{}", self.schema, self.table),
        }
    }
}

/// A (possibly composite) foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<Option<String>>,
}

impl ForeignKey {
    pub fn new(
        name: impl Into<String>,
        referenced_schema: impl Into<String>,
        referenced_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            referenced_schema: referenced_schema.into(),
            referenced_table: referenced_table.into(),
            referenced_columns: Vec::new(),
        }
    }

    pub fn push_pair(&mut self, column: impl Into<String>, referenced: Option<String>) {
        self.columns.push(column.into());
        self.referenced_columns.push(referenced);
    }

    /// Reference for one local column of this key.
    pub fn reference_for(&self, column: &str) -> Option<ColumnReference> {
        let idx = self.columns.iter().position(|c| c == column)?;
        Some(ColumnReference {
            schema: self.referenced_schema.clone(),
            table: self.referenced_table.clone(),
            column: self.referenced_columns.get(idx).cloned().flatten(),
        })
    }
}

impl std::fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets: Vec<&str> = self
            .referenced_columns
            .iter()
            .filter_map(|c| c.as_deref())
            .collect();
        write!(
            f,
            "{} -> {}.{}",
            self.columns.join(", "),
            self.referenced_schema,
            self.referenced_table
        )?;
        if !targets.is_empty() {
            write!(f, "({})", targets.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key columns in key order
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescription {
    /// Assemble a description, attaching key information to each column.
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        primary_key: Vec<String>,
        foreign_keys: Vec<ForeignKey>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .map(|mut col| {
                col.primary_key = col.primary_key || primary_key.contains(&col.name);
                col.references = foreign_keys.iter().find_map(|fk| fk.reference_for(&col.name));
                col
            })
            .collect();

        Self {
            schema: schema.into(),
            table: table.into(),
            columns,
            primary_key,
            foreign_keys,
        }
    }

    /// Get the fully qualified table name.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableDescription {
        let mut fk = ForeignKey::new("orders_customer_fk", "public", "customers");
        fk.push_pair("customer_id", Some("id".to_string()));
        TableDescription::new(
            "public",
            "orders",
            vec![
                ColumnDescriptor::new("id", "integer", false),
                ColumnDescriptor::new("customer_id", "integer", true),
            ],
            vec!["id".to_string()],
            vec![fk],
        )
    }

    #[test]
    fn test_keys_attached_to_columns() {
        let table = orders();
        assert!(table.columns[0].primary_key);
        assert!(table.columns[0].references.is_none());
        assert!(!table.columns[1].primary_key);
        assert_eq!(
            table.columns[1].references.as_ref().unwrap().to_string(),
            "public.customers(id)"
        );
        assert_eq!(table.qualified_name(), "public.orders");
    }

    #[test]
    fn test_foreign_key_display() {
        let table = orders();
        assert_eq!(
            table.foreign_keys[0].to_string(),
            "customer_id -> public.customers(id)"
        );

        let mut implicit = ForeignKey::new("0", "main", "parents");
        implicit.push_pair("parent_id", None);
        assert_eq!(implicit.to_string(), "parent_id -> main.parents");
    }
}
