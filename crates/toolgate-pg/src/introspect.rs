//! Catalog queries behind the `table://` resources.
//!
//! System schemas (`pg_catalog`, `information_schema`) are never listed.

use serde::Serialize;
use sqlx::{PgConnection, Row};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
    pub qualified_name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        let schema = schema.into();
        let name = name.into();
        let qualified_name = format!("{}.{}", schema, name);
        Self {
            schema,
            name,
            qualified_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyMapping {
    pub column: String,
    pub references: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub mappings: Vec<ForeignKeyMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
    pub unique: bool,
    pub primary: bool,
}

/// Structure of one table as returned by `table://{schema}/{table}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStructure {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
}

pub async fn list_tables(conn: &mut PgConnection) -> Result<Vec<TableRef>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        select table_schema, table_name
        from information_schema.tables
        where table_type = 'BASE TABLE'
          and table_schema not in ('pg_catalog', 'information_schema')
        order by table_schema, table_name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(TableRef::new(
                r.try_get::<String, _>("table_schema")?,
                r.try_get::<String, _>("table_name")?,
            ))
        })
        .collect()
}

/// `Ok(None)` when the table has no visible columns (missing or not readable).
pub async fn describe_table(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Option<TableStructure>, sqlx::Error> {
    let col_rows = sqlx::query(
        r#"
        select column_name, data_type, is_nullable, column_default
        from information_schema.columns
        where table_schema = $1 and table_name = $2
        order by ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    if col_rows.is_empty() {
        return Ok(None);
    }

    let columns = col_rows
        .into_iter()
        .map(|c| {
            Ok(ColumnInfo {
                name: c.try_get("column_name")?,
                data_type: c.try_get("data_type")?,
                nullable: c.try_get::<String, _>("is_nullable")? == "YES",
                default: c.try_get("column_default")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let pk_rows = sqlx::query(
        r#"
        select kcu.column_name
        from information_schema.table_constraints tc
        join information_schema.key_column_usage kcu
          on tc.constraint_name = kcu.constraint_name
         and tc.table_schema = kcu.table_schema
        where tc.constraint_type = 'PRIMARY KEY'
          and tc.table_schema = $1
          and tc.table_name = $2
        order by kcu.ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let primary_key = pk_rows
        .into_iter()
        .map(|r| r.try_get::<String, _>("column_name"))
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    // One row per column pair. conkey and confkey are parallel arrays, so
    // unnesting them together keeps composite keys paired by position.
    let fk_rows = sqlx::query(
        r#"
        select
          c.conname::text as constraint_name,
          a.attname::text as column_name,
          fn.nspname::text as foreign_table_schema,
          ft.relname::text as foreign_table_name,
          fa.attname::text as foreign_column_name
        from pg_constraint c
        join pg_class t on t.oid = c.conrelid
        join pg_namespace n on n.oid = t.relnamespace
        join pg_class ft on ft.oid = c.confrelid
        join pg_namespace fn on fn.oid = ft.relnamespace
        cross join lateral unnest(c.conkey, c.confkey)
          with ordinality as k(attnum, foreign_attnum, position)
        join pg_attribute a
          on a.attrelid = c.conrelid and a.attnum = k.attnum
        join pg_attribute fa
          on fa.attrelid = c.confrelid and fa.attnum = k.foreign_attnum
        where c.contype = 'f'
          and n.nspname = $1
          and t.relname = $2
        order by c.conname, k.position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let mut fk_map: BTreeMap<String, Vec<ForeignKeyMapping>> = BTreeMap::new();
    for fk in fk_rows {
        fk_map
            .entry(fk.try_get("constraint_name")?)
            .or_default()
            .push(ForeignKeyMapping {
                column: fk.try_get("column_name")?,
                references: ColumnRef {
                    schema: fk.try_get("foreign_table_schema")?,
                    table: fk.try_get("foreign_table_name")?,
                    column: fk.try_get("foreign_column_name")?,
                },
            });
    }
    let foreign_keys = fk_map
        .into_iter()
        .map(|(name, mappings)| ForeignKey { name, mappings })
        .collect();

    let index_rows = sqlx::query(
        r#"
        select
          i.relname as index_name,
          pg_get_indexdef(ix.indexrelid) as definition,
          ix.indisunique as is_unique,
          ix.indisprimary as is_primary
        from pg_index ix
        join pg_class i on i.oid = ix.indexrelid
        join pg_class t on t.oid = ix.indrelid
        join pg_namespace n on n.oid = t.relnamespace
        where n.nspname = $1 and t.relname = $2
        order by i.relname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let indexes = index_rows
        .into_iter()
        .map(|r| {
            Ok(IndexInfo {
                name: r.try_get("index_name")?,
                definition: r.try_get("definition")?,
                unique: r.try_get("is_unique")?,
                primary: r.try_get("is_primary")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(Some(TableStructure {
        schema: schema.to_string(),
        table: table.to_string(),
        columns,
        primary_key,
        foreign_keys,
        indexes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        let t = TableRef::new("public", "users");
        assert_eq!(t.qualified_name, "public.users");
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            serde_json::json!({"schema": "public", "name": "users", "qualified_name": "public.users"})
        );
    }
}
