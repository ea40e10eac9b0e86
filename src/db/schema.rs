//! Catalog introspection.
//!
//! Schemas, tables and table structure are read from the system catalogs on
//! every call; nothing is cached. All statements are parameterized, so
//! identifiers supplied by callers never reach the SQL text.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! backend. Backend implementations are in their respective submodules
//! (postgres, sqlite), each providing the same interface.

use crate::db::macros::with_connection;
use crate::db::pool::ConnectionPool;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{ColumnDescriptor, ForeignKey, TableDescription};
use std::time::Duration;
use tracing::debug;

/// Reads catalog metadata through the shared pool.
#[derive(Debug, Clone)]
pub struct CatalogInspector {
    timeout: Duration,
}

impl CatalogInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// User schemas, system schemas excluded.
    pub async fn list_schemas(&self, pool: &ConnectionPool) -> GatewayResult<Vec<String>> {
        let schemas = with_connection!(pool, self.timeout, "list_schemas", {
            Postgres(conn) => postgres::list_schemas(conn).await,
            Sqlite(conn) => sqlite::list_schemas(conn).await,
        })?;
        debug!(count = schemas.len(), "Listed schemas");
        Ok(schemas)
    }

    /// Base tables of one schema, by name.
    pub async fn list_tables(
        &self,
        pool: &ConnectionPool,
        schema: &str,
    ) -> GatewayResult<Vec<String>> {
        let tables = with_connection!(pool, self.timeout, "list_tables", {
            Postgres(conn) => postgres::list_tables(conn, schema).await,
            Sqlite(conn) => sqlite::list_tables(conn, schema).await,
        })?;
        debug!(count = tables.len(), schema = schema, "Listed tables");
        Ok(tables)
    }

    /// Columns, primary key and foreign keys of one table.
    ///
    /// Fails with `TableNotFound` when the table has no visible columns.
    pub async fn describe_table(
        &self,
        pool: &ConnectionPool,
        schema: &str,
        table: &str,
    ) -> GatewayResult<TableDescription> {
        let described = with_connection!(pool, self.timeout, "describe_table", {
            Postgres(conn) => postgres::describe_table(conn, schema, table).await,
            Sqlite(conn) => sqlite::describe_table(conn, schema, table).await,
        })?;
        debug!(
            table = %described.qualified_name(),
            columns = described.columns.len(),
            foreign_keys = described.foreign_keys.len(),
            "Described table"
        );
        Ok(described)
    }
}

/// Group (constraint, column, referenced column) rows into keys, keeping row order.
fn group_foreign_keys<I>(rows: I) -> Vec<ForeignKey>
where
    I: IntoIterator<Item = (String, String, String, String, Option<String>)>,
{
    let mut keys: Vec<ForeignKey> = Vec::new();
    for (name, column, ref_schema, ref_table, ref_column) in rows {
        match keys.iter_mut().find(|fk| fk.name == name) {
            Some(fk) => fk.push_pair(column, ref_column),
            None => {
                let mut fk = ForeignKey::new(name, ref_schema, ref_table);
                fk.push_pair(column, ref_column);
                keys.push(fk);
            }
        }
    }
    keys
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_SCHEMAS: &str = r#"
            SELECT n.nspname::text AS schema_name
            FROM pg_catalog.pg_namespace n
            WHERE n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
            AND n.nspname NOT LIKE 'pg\_temp\_%'
            AND n.nspname NOT LIKE 'pg\_toast\_temp\_%'
            ORDER BY n.nspname
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT t.table_name::text AS table_name
            FROM information_schema.tables t
            WHERE t.table_schema = $1
            AND t.table_type = 'BASE TABLE'
            ORDER BY t.table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                a.attname::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                NOT a.attnotnull AS nullable,
                pg_get_expr(d.adbin, d.adrelid) AS column_default
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1
            AND c.relname = $2
            AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
            AND a.attnum > 0
            AND NOT a.attisdropped
            ORDER BY a.attnum
            "#;

        pub const DESCRIBE_PRIMARY_KEY: &str = r#"
            SELECT a.attname::text AS column_name
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            WHERE con.contype = 'p'
            AND n.nspname = $1
            AND c.relname = $2
            ORDER BY k.ord
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT
                con.conname::text AS constraint_name,
                la.attname::text AS column_name,
                rn.nspname::text AS referenced_schema,
                rc.relname::text AS referenced_table,
                ra.attname::text AS referenced_column
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                WITH ORDINALITY AS k(local_attnum, referenced_attnum, ord)
            JOIN pg_catalog.pg_attribute la
                ON la.attrelid = con.conrelid AND la.attnum = k.local_attnum
            JOIN pg_catalog.pg_attribute ra
                ON ra.attrelid = con.confrelid AND ra.attnum = k.referenced_attnum
            WHERE con.contype = 'f'
            AND n.nspname = $1
            AND c.relname = $2
            ORDER BY con.conname, k.ord
            "#;
    }

    pub mod sqlite {
        pub const LIST_SCHEMAS: &str = r#"
            SELECT name FROM pragma_database_list
            WHERE name <> 'temp'
            ORDER BY seq
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT name FROM pragma_table_list
            WHERE schema = ?1
            AND type = 'table'
            AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
            ORDER BY name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?1, ?2)
            ORDER BY cid
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT id, "table", "from", "to"
            FROM pragma_foreign_key_list(?1, ?2)
            ORDER BY id, seq
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    pub async fn list_schemas(conn: &mut PgConnection) -> GatewayResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_SCHEMAS)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(|row| row.get("schema_name")).collect())
    }

    pub async fn list_tables(conn: &mut PgConnection, schema: &str) -> GatewayResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }

    pub async fn describe_table(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> GatewayResult<TableDescription> {
        let columns = fetch_columns(conn, schema, table).await?;
        if columns.is_empty() {
            return Err(GatewayError::table_not_found(schema, table));
        }

        let primary_key = fetch_primary_key(conn, schema, table).await?;
        let foreign_keys = fetch_foreign_keys(conn, schema, table).await?;

        Ok(TableDescription::new(
            schema,
            table,
            columns,
            primary_key,
            foreign_keys,
        ))
    }

    async fn fetch_columns(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> GatewayResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let data_type: String = row.get("data_type");
                let nullable: bool = row.get("nullable");
                let default: Option<String> = row.try_get("column_default").ok().flatten();
                ColumnDescriptor::new(name, data_type, nullable).with_default(default)
            })
            .collect())
    }

    async fn fetch_primary_key(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> GatewayResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_PRIMARY_KEY)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    async fn fetch_foreign_keys(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> GatewayResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_FOREIGN_KEYS)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

        Ok(group_foreign_keys(rows.iter().map(|row| {
            (
                row.get("constraint_name"),
                row.get("column_name"),
                row.get("referenced_schema"),
                row.get("referenced_table"),
                row.get::<Option<String>, _>("referenced_column"),
            )
        })))
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn list_schemas(conn: &mut SqliteConnection) -> GatewayResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::LIST_SCHEMAS)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    pub async fn list_tables(
        conn: &mut SqliteConnection,
        schema: &str,
    ) -> GatewayResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    pub async fn describe_table(
        conn: &mut SqliteConnection,
        schema: &str,
        table: &str,
    ) -> GatewayResult<TableDescription> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_COLUMNS)
            .bind(table)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;
        if rows.is_empty() {
            return Err(GatewayError::table_not_found(schema, table));
        }

        // `pk` is the 1-based position of the column in the primary key.
        let mut key_positions: Vec<(i64, String)> = Vec::new();
        let columns: Vec<ColumnDescriptor> = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let data_type: String = row.try_get("type").unwrap_or_default();
                let not_null: i64 = row.try_get("notnull").unwrap_or(0);
                let pk: i64 = row.try_get("pk").unwrap_or(0);
                let default: Option<String> = row.try_get("dflt_value").ok().flatten();
                if pk > 0 {
                    key_positions.push((pk, name.clone()));
                }
                ColumnDescriptor::new(name, data_type, not_null == 0 && pk == 0)
                    .with_default(default)
            })
            .collect();
        key_positions.sort();
        let primary_key: Vec<String> = key_positions.into_iter().map(|(_, name)| name).collect();

        let fk_rows = sqlx::query(queries::sqlite::DESCRIBE_FOREIGN_KEYS)
            .bind(table)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;
        let foreign_keys = group_foreign_keys(fk_rows.iter().map(|row| {
            let id: i64 = row.try_get("id").unwrap_or(0);
            (
                format!("fk_{}_{}", table, id),
                row.get("from"),
                schema.to_string(),
                row.get("table"),
                row.try_get::<Option<String>, _>("to").ok().flatten(),
            )
        }));

        Ok(TableDescription::new(
            schema,
            table,
            columns,
            primary_key,
            foreign_keys,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_foreign_keys_keeps_composite_keys_together() {
        let rows = vec![
            (
                "line_order_fk".to_string(),
                "order_id".to_string(),
                "public".to_string(),
                "orders".to_string(),
                Some("id".to_string()),
            ),
            (
                "line_product_fk".to_string(),
                "sku".to_string(),
                "public".to_string(),
                "products".to_string(),
                Some("sku".to_string()),
            ),
            (
                "line_product_fk".to_string(),
                "vendor".to_string(),
                "public".to_string(),
                "products".to_string(),
                Some("vendor".to_string()),
            ),
        ];
        let keys = group_foreign_keys(rows);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].columns, vec!["sku", "vendor"]);
        assert_eq!(
            keys[1].to_string(),
            "sku, vendor -> public.products(sku, vendor)"
        );
    }
}
