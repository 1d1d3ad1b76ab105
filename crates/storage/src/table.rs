//! Table extension of the ledger.
//!
//! The ledger exposes a simple tabular interface next to key/value blobs:
//! a table has a declared [`TableSchema`], rows are [`Row`]s of named,
//! typed [`Column`]s, and every stored row carries a revision used for
//! conditional replace.
//!
//! [`Tables`] implements [`TableLedger`] on top of any [`StorageBackend`],
//! so rows and blobs share one substrate and can be written in the same
//! [`Transaction`].
//!
//! # Layout
//!
//! | Item | Key |
//! |------|-----|
//! | Schema | `_tables/{name}/schema` |
//! | Row | `_tables/{name}/rows/{hex(key column)}` |
//!
//! Stored rows are JSON envelopes `{schema_version, revision, columns}`.
//!
//! # Example
//!
//! ```
//! use brokerage_ledger_storage::{
//!     MemoryBackend, Row, TableLedger, Tables,
//!     table::{ColumnDefinition, ColumnType, TableSchema},
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let tables = Tables::new(MemoryBackend::new());
//! let schema = TableSchema::new("Notes", 1, vec![
//!     ColumnDefinition::key("Id", ColumnType::String),
//!     ColumnDefinition::new("Body", ColumnType::String),
//! ]);
//! tables.create_table(&schema).await.unwrap();
//!
//! let row = Row::new().with_string("Id", "n1").with_string("Body", "hello");
//! tables.insert_row("Notes", row).await.unwrap();
//!
//! let stored = tables.get_row("Notes", b"n1").await.unwrap().unwrap();
//! assert_eq!(stored.revision, 1);
//! # });
//! ```

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    transaction::Transaction,
};

/// Prefix under which every table schema and row is stored.
pub const TABLE_PREFIX: &str = "_tables/";

/// Type of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 text.
    String,
    /// Opaque bytes.
    Bytes,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("bytes"),
        }
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ColumnValue {
    /// UTF-8 text.
    String(String),
    /// Opaque bytes, hex-encoded when stored.
    Bytes(#[serde(with = "hex::serde")] Vec<u8>),
}

impl ColumnValue {
    /// The [`ColumnType`] this value belongs to.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::String(_) => ColumnType::String,
            Self::Bytes(_) => ColumnType::Bytes,
        }
    }

    /// Raw bytes of the value; text is returned as its UTF-8 encoding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::String(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

/// A named cell in a [`Row`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, matching the schema's declaration at the same position.
    pub name: String,
    /// Cell value.
    pub value: ColumnValue,
}

/// An ordered sequence of named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Columns in schema order.
    pub columns: Vec<Column>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text column.
    #[must_use]
    pub fn with_string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.columns.push(Column { name: name.into(), value: ColumnValue::String(value.into()) });
        self
    }

    /// Appends a bytes column.
    #[must_use]
    pub fn with_bytes(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.columns.push(Column { name: name.into(), value: ColumnValue::Bytes(value.into()) });
        self
    }

    /// Looks a column up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Declaration of one column in a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Value type.
    pub column_type: ColumnType,
    /// Whether this column is the row key.
    #[serde(default)]
    pub key: bool,
}

impl ColumnDefinition {
    /// Declares a non-key column.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type, key: false }
    }

    /// Declares the key column.
    #[must_use]
    pub fn key(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type, key: true }
    }
}

/// Declared shape of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Schema version, recorded in every stored row.
    pub version: u32,
    /// Columns in positional order.
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    /// Creates a schema.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32, columns: Vec<ColumnDefinition>) -> Self {
        Self { name: name.into(), version, columns }
    }

    /// Position of the key column, if exactly one is declared.
    #[must_use]
    pub fn key_position(&self) -> Option<usize> {
        let mut keys = self.columns.iter().enumerate().filter(|(_, c)| c.key);
        match (keys.next(), keys.next()) {
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        }
    }

    /// Checks that the schema itself is well formed: a name, exactly one
    /// key column, and distinct column names.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SchemaMismatch`] describing the first problem.
    pub fn check(&self) -> StorageResult<()> {
        if self.name.is_empty() {
            return Err(StorageError::schema_mismatch("", "table name must not be empty"));
        }
        if self.key_position().is_none() {
            return Err(StorageError::schema_mismatch(
                &self.name,
                "exactly one key column must be declared",
            ));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(StorageError::schema_mismatch(
                    &self.name,
                    format!("duplicate column name {}", column.name),
                ));
            }
        }
        Ok(())
    }

    /// Validates a row against this schema: same column count, and at every
    /// position the same name and value type.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SchemaMismatch`] describing the first deviation.
    pub fn validate(&self, row: &Row) -> StorageResult<()> {
        if row.columns.len() != self.columns.len() {
            return Err(StorageError::schema_mismatch(
                &self.name,
                format!("expected {} columns, got {}", self.columns.len(), row.columns.len()),
            ));
        }
        for (idx, (declared, actual)) in self.columns.iter().zip(&row.columns).enumerate() {
            if declared.name != actual.name {
                return Err(StorageError::schema_mismatch(
                    &self.name,
                    format!("column {idx}: expected {}, got {}", declared.name, actual.name),
                ));
            }
            if declared.column_type != actual.value.column_type() {
                return Err(StorageError::schema_mismatch(
                    &self.name,
                    format!(
                        "column {}: expected {}, got {}",
                        declared.name,
                        declared.column_type,
                        actual.value.column_type()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Validates `row` and returns its key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SchemaMismatch`] if the row does not validate
    /// or its key is empty.
    pub fn row_key(&self, row: &Row) -> StorageResult<Vec<u8>> {
        self.validate(row)?;
        let idx = self.key_position().ok_or_else(|| {
            StorageError::schema_mismatch(&self.name, "exactly one key column must be declared")
        })?;
        let key = row.columns[idx].value.as_bytes();
        if key.is_empty() {
            return Err(StorageError::schema_mismatch(
                &self.name,
                format!("key column {} is empty", self.columns[idx].name),
            ));
        }
        Ok(key.to_vec())
    }
}

/// A row as stored, with its revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRow {
    /// Starts at 1 on insert and increases by one on every replace.
    pub revision: u64,
    /// Row contents.
    pub row: Row,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredRow {
    schema_version: u32,
    revision: u64,
    columns: Vec<Column>,
}

/// Table half of the ledger collaborator.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`create_table`](TableLedger::create_table) | Declare a table (idempotent for an identical schema) |
/// | [`create_table_in`](TableLedger::create_table_in) | Stage a declaration in a caller transaction |
/// | [`table_schema`](TableLedger::table_schema) | Read a declared schema |
/// | [`insert_row`](TableLedger::insert_row) | Insert a row whose key is absent |
/// | [`insert_row_in`](TableLedger::insert_row_in) | Stage an insert in a caller transaction |
/// | [`replace_row`](TableLedger::replace_row) | Overwrite an existing row |
/// | [`replace_row_if`](TableLedger::replace_row_if) | Overwrite if the revision is unchanged |
/// | [`replace_row_if_in`](TableLedger::replace_row_if_in) | Stage a conditional overwrite |
/// | [`get_row`](TableLedger::get_row) | Read a row by key |
#[async_trait]
pub trait TableLedger: Send + Sync {
    /// Declares a table.
    ///
    /// # Errors
    ///
    /// - [`StorageError::SchemaMismatch`] if the schema is malformed or a
    ///   different schema is already declared under the same name
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()>;

    /// Stages a declaration inside `txn`.
    ///
    /// The existing declaration is read through `txn`, so a failed read
    /// surfaces here and not at commit. Nothing is staged when an identical
    /// schema is already declared.
    async fn create_table_in(
        &self,
        txn: &mut dyn Transaction,
        schema: &TableSchema,
    ) -> StorageResult<()>;

    /// Returns the declared schema of `table`, if any.
    async fn table_schema(&self, table: &str) -> StorageResult<Option<TableSchema>>;

    /// Inserts a row.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the table is not declared
    /// - [`StorageError::SchemaMismatch`] if the row does not validate
    /// - [`StorageError::AlreadyExists`] if a row with the same key exists
    async fn insert_row(&self, table: &str, row: Row) -> StorageResult<()>;

    /// Stages an insert inside `txn`.
    ///
    /// Presence of the key is checked now; a row inserted concurrently
    /// before commit makes the commit fail with
    /// [`StorageError::Conflict`].
    async fn insert_row_in(
        &self,
        txn: &mut dyn Transaction,
        table: &str,
        row: Row,
    ) -> StorageResult<()>;

    /// Replaces an existing row unconditionally and returns the new revision.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no row has that key
    async fn replace_row(&self, table: &str, row: Row) -> StorageResult<u64>;

    /// Replaces an existing row if its revision is still
    /// `expected_revision`, and returns the new revision.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`] if the row was replaced in between
    /// - [`StorageError::NotFound`] if no row has that key
    async fn replace_row_if(
        &self,
        table: &str,
        row: Row,
        expected_revision: u64,
    ) -> StorageResult<u64>;

    /// Stages [`replace_row_if`](TableLedger::replace_row_if) inside `txn`
    /// and returns the revision the row will have once committed.
    ///
    /// A stale `expected_revision` fails now with
    /// [`StorageError::Conflict`]; a replace that lands between staging and
    /// commit makes the commit fail with the same error.
    async fn replace_row_if_in(
        &self,
        txn: &mut dyn Transaction,
        table: &str,
        row: Row,
        expected_revision: u64,
    ) -> StorageResult<u64>;

    /// Reads a row by key.
    async fn get_row(&self, table: &str, key: &[u8]) -> StorageResult<Option<VersionedRow>>;
}

/// [`TableLedger`] over a [`StorageBackend`].
#[derive(Clone)]
pub struct Tables<B> {
    backend: B,
}

impl<B: StorageBackend> Tables<B> {
    /// Wraps a key/value backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying key/value backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn require_schema(&self, table: &str) -> StorageResult<TableSchema> {
        self.table_schema(table).await?.ok_or_else(|| StorageError::not_found(schema_key(table)))
    }

    async fn replace(
        &self,
        table: &str,
        row: Row,
        expected_revision: Option<u64>,
    ) -> StorageResult<u64> {
        let schema = self.require_schema(table).await?;
        let key = schema.row_key(&row)?;
        let storage_key = row_key(table, &key);

        let current = self
            .backend
            .get(storage_key.as_bytes())
            .await?
            .ok_or_else(|| StorageError::not_found(storage_key.clone()))?;
        let revision = next_revision(table, &current, expected_revision)?;

        let encoded = encode_stored(&schema, revision, row)?;
        self.backend.compare_and_set(storage_key.as_bytes(), Some(&current[..]), encoded).await?;
        Ok(revision)
    }
}

#[async_trait]
impl<B: StorageBackend> TableLedger for Tables<B> {
    #[tracing::instrument(skip(self, schema), fields(table = %schema.name, version = schema.version))]
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()> {
        schema.check()?;

        if already_declared(self.table_schema(&schema.name).await?, schema)? {
            tracing::debug!("table already declared");
            return Ok(());
        }

        let encoded = encode_schema(schema)?;
        self.backend.compare_and_set(schema_key(&schema.name).as_bytes(), None, encoded).await?;
        tracing::info!("table declared");
        Ok(())
    }

    #[tracing::instrument(skip(self, txn, schema), fields(table = %schema.name, version = schema.version))]
    async fn create_table_in(
        &self,
        txn: &mut dyn Transaction,
        schema: &TableSchema,
    ) -> StorageResult<()> {
        schema.check()?;

        let key = schema_key(&schema.name);
        let existing = txn.get(key.as_bytes()).await?.map(|b| decode_schema(&b)).transpose()?;
        if already_declared(existing, schema)? {
            tracing::debug!("table already declared");
            return Ok(());
        }

        txn.compare_and_set(key.into_bytes(), None, encode_schema(schema)?)
    }

    async fn table_schema(&self, table: &str) -> StorageResult<Option<TableSchema>> {
        let Some(bytes) = self.backend.get(schema_key(table).as_bytes()).await? else {
            return Ok(None);
        };
        decode_schema(&bytes).map(Some)
    }

    #[tracing::instrument(skip(self, row))]
    async fn insert_row(&self, table: &str, row: Row) -> StorageResult<()> {
        let schema = self.require_schema(table).await?;
        let key = schema.row_key(&row)?;
        let storage_key = row_key(table, &key);
        let encoded = encode_stored(&schema, 1, row)?;

        match self.backend.compare_and_set(storage_key.as_bytes(), None, encoded).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict) => Err(StorageError::already_exists(storage_key)),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self, txn, row))]
    async fn insert_row_in(
        &self,
        txn: &mut dyn Transaction,
        table: &str,
        row: Row,
    ) -> StorageResult<()> {
        let schema = self.require_schema(table).await?;
        let key = schema.row_key(&row)?;
        let storage_key = row_key(table, &key);

        if txn.get(storage_key.as_bytes()).await?.is_some() {
            return Err(StorageError::already_exists(storage_key));
        }

        let encoded = encode_stored(&schema, 1, row)?;
        txn.compare_and_set(storage_key.into_bytes(), None, encoded)
    }

    #[tracing::instrument(skip(self, row))]
    async fn replace_row(&self, table: &str, row: Row) -> StorageResult<u64> {
        self.replace(table, row, None).await
    }

    #[tracing::instrument(skip(self, row))]
    async fn replace_row_if(
        &self,
        table: &str,
        row: Row,
        expected_revision: u64,
    ) -> StorageResult<u64> {
        self.replace(table, row, Some(expected_revision)).await
    }

    #[tracing::instrument(skip(self, txn, row))]
    async fn replace_row_if_in(
        &self,
        txn: &mut dyn Transaction,
        table: &str,
        row: Row,
        expected_revision: u64,
    ) -> StorageResult<u64> {
        let schema = self.require_schema(table).await?;
        let key = schema.row_key(&row)?;
        let storage_key = row_key(table, &key);

        let current = txn
            .get(storage_key.as_bytes())
            .await?
            .ok_or_else(|| StorageError::not_found(storage_key.clone()))?;
        let revision = next_revision(table, &current, Some(expected_revision))?;

        let encoded = encode_stored(&schema, revision, row)?;
        txn.compare_and_set(storage_key.into_bytes(), Some(current.to_vec()), encoded)?;
        Ok(revision)
    }

    #[tracing::instrument(skip(self, key), fields(key = %String::from_utf8_lossy(key)))]
    async fn get_row(&self, table: &str, key: &[u8]) -> StorageResult<Option<VersionedRow>> {
        let schema = self.require_schema(table).await?;
        let Some(bytes) = self.backend.get(row_key(table, key).as_bytes()).await? else {
            return Ok(None);
        };

        let stored = decode_stored(table, &bytes)?;
        if stored.schema_version != schema.version {
            return Err(StorageError::schema_mismatch(
                table,
                format!(
                    "row written with schema version {}, table is at version {}",
                    stored.schema_version, schema.version
                ),
            ));
        }

        let row = Row { columns: stored.columns };
        schema.validate(&row)?;
        Ok(Some(VersionedRow { revision: stored.revision, row }))
    }
}

fn schema_key(table: &str) -> String {
    format!("{TABLE_PREFIX}{table}/schema")
}

fn row_key(table: &str, key: &[u8]) -> String {
    format!("{TABLE_PREFIX}{table}/rows/{}", hex::encode(key))
}

/// `Ok(true)` when `existing` is exactly `schema`, an error when it differs.
fn already_declared(existing: Option<TableSchema>, schema: &TableSchema) -> StorageResult<bool> {
    match existing {
        None => Ok(false),
        Some(existing) if existing == *schema => Ok(true),
        Some(existing) => Err(StorageError::schema_mismatch(
            &schema.name,
            format!(
                "declared schema version {} differs from requested version {}",
                existing.version, schema.version
            ),
        )),
    }
}

fn next_revision(table: &str, current: &Bytes, expected: Option<u64>) -> StorageResult<u64> {
    let stored = decode_stored(table, current)?;
    if let Some(expected) = expected {
        if stored.revision != expected {
            tracing::warn!(table, expected, actual = stored.revision, "row revision moved");
            return Err(StorageError::conflict());
        }
    }
    Ok(stored.revision + 1)
}

fn encode_schema(schema: &TableSchema) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(schema)
        .map_err(|e| StorageError::serialization_with_source("encode table schema", e))
}

fn decode_schema(bytes: &Bytes) -> StorageResult<TableSchema> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::serialization_with_source("decode table schema", e))
}

fn encode_stored(schema: &TableSchema, revision: u64, row: Row) -> StorageResult<Vec<u8>> {
    let stored = StoredRow { schema_version: schema.version, revision, columns: row.columns };
    serde_json::to_vec(&stored)
        .map_err(|e| StorageError::serialization_with_source("encode stored row", e))
}

fn decode_stored(table: &str, bytes: &Bytes) -> StorageResult<StoredRow> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::serialization_with_source(format!("decode stored row of {table}"), e)
    })
}
