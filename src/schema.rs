//! Catalog introspection and bound columns for pg-upsert-replicator.

use crate::codec::{Codec, Value, quote_ident};
use crate::error::{Error, Result};
use tokio_postgres::{GenericClient, Row};
use tracing::debug;

/// Column metadata as reported by `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// `data_type`, `ARRAY` for array columns
    pub data_type: String,
    /// Element type of array columns
    pub element_type: Option<String>,
    /// Whether the column accepts NULL
    pub nullable: bool,
}

impl ColumnInfo {
    /// Declared type and array flag, resolving array element types.
    pub fn declared_type(&self) -> (&str, bool) {
        if self.data_type == "ARRAY" {
            (self.element_type.as_deref().unwrap_or_default(), true)
        } else {
            (&self.data_type, false)
        }
    }
}

/// A column bound to its codec, with a slot for the current row's value.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    codec: Codec,
    slot: Option<Value>,
}

impl Column {
    /// Bind introspected metadata to a codec.
    pub fn bind(info: &ColumnInfo) -> Result<Self> {
        let (data_type, array) = info.declared_type();
        let codec = Codec::bind(&info.name, data_type, info.nullable, array)?;
        Ok(Self {
            name: info.name.clone(),
            codec,
            slot: None,
        })
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound codec.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Double-quoted column name.
    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    /// Expression used in the row SELECT.
    pub fn select_expr(&self) -> String {
        let quoted = self.quoted_name();
        match self.codec.select_cast() {
            Some(cast) => format!("{quoted}::{cast} AS {quoted}"),
            None => quoted,
        }
    }

    /// Scan field `idx` of `row` into this column's slot.
    pub fn scan(&mut self, row: &Row, idx: usize) -> std::result::Result<(), tokio_postgres::Error> {
        self.slot = Some(self.codec.scan(row, idx)?);
        Ok(())
    }

    /// Load a value into the slot directly.
    pub fn set_value(&mut self, value: Value) {
        self.slot = Some(value);
    }

    /// Literal for the most recently scanned value.
    pub fn literal(&self) -> Result<String> {
        self.slot
            .as_ref()
            .map(Value::literal)
            .ok_or_else(|| Error::UnscannedColumn(self.name.clone()))
    }
}

const COLUMNS_QUERY: &str = r#"
    WITH target AS (
        SELECT n.nspname AS schema_name, cls.relname AS table_name
        FROM pg_catalog.pg_class cls
        JOIN pg_catalog.pg_namespace n ON n.oid = cls.relnamespace
        WHERE cls.oid = to_regclass($1)
    )
    SELECT
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        e.data_type::text AS element_data_type,
        c.is_nullable = 'YES' AS nullable
    FROM information_schema.columns c
    JOIN target t
        ON c.table_schema = t.schema_name AND c.table_name = t.table_name
    LEFT JOIN information_schema.element_types e
        ON (c.table_catalog, c.table_schema, c.table_name, 'TABLE', c.dtd_identifier)
            = (e.object_catalog, e.object_schema, e.object_name, e.object_type, e.collection_type_identifier)
    WHERE c.is_generated = 'NEVER'
    ORDER BY c.ordinal_position
"#;

/// Read column metadata for `table` (tables and views alike).
///
/// `table` is resolved the way SQL would resolve it, so `schema.table` and
/// search-path lookups both work. Generated columns are left out.
pub async fn introspect<C: GenericClient>(client: &C, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows = client
        .query(COLUMNS_QUERY, &[&table])
        .await
        .map_err(|e| Error::postgres_query(table, "Column introspection failed", e))?;

    let columns: Vec<ColumnInfo> = rows
        .iter()
        .map(|row| ColumnInfo {
            name: row.get("column_name"),
            data_type: row.get("data_type"),
            element_type: row.get("element_data_type"),
            nullable: row.get("nullable"),
        })
        .collect();

    debug!("Introspected {} columns for {}", columns.len(), table);
    Ok(columns)
}

/// Discover and bind the columns of `table`.
///
/// With a non-empty `wanted`, only those columns are returned (still in table
/// order) and a missing name fails with [`Error::UnknownColumn`].
pub async fn discover_columns<C: GenericClient>(
    client: &C,
    table: &str,
    wanted: &[String],
) -> Result<Vec<Column>> {
    let infos = introspect(client, table).await?;
    if infos.is_empty() {
        return Err(Error::PostgresQuery {
            table: table.to_string(),
            message: "relation not found or has no columns".to_string(),
            source: None,
        });
    }
    select_columns(table, &infos, wanted)
}

/// Filter introspected metadata to `wanted` and bind each survivor.
pub fn select_columns(table: &str, infos: &[ColumnInfo], wanted: &[String]) -> Result<Vec<Column>> {
    if let Some(missing) = wanted
        .iter()
        .find(|name| !infos.iter().any(|info| &info.name == *name))
    {
        return Err(Error::unknown_column(table, missing));
    }

    infos
        .iter()
        .filter(|info| wanted.is_empty() || wanted.contains(&info.name))
        .map(Column::bind)
        .collect()
}
