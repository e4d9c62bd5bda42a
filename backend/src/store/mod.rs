//! Spatial table storage.
//!
//! The loader hands a fully materialised [`FeatureTable`] to a
//! [`SpatialStore`], which replaces the table named by the layer identifier.
//! [`postgis::PostgisStore`] is the production implementation.

pub mod postgis;

use crate::pipeline::dataset::LayerName;
use async_trait::async_trait;

/// Spatial reference declared for every imported geometry.
pub const SRID: i32 = 4326;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQL type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Double,
    Boolean,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Normalised identifier, safe to quote into DDL.
    pub name: String,
    pub kind: ColumnType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Text(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

/// Geometry of one feature, in the encoding the store should parse.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryText {
    Wkt(String),
    GeoJson(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub geometry: GeometryText,
    /// One value per entry of [`FeatureTable::columns`], in the same order.
    pub values: Vec<AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<Column>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Storage backend for imported layers.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Drops any existing table named `layer` and recreates it holding exactly
    /// the rows of `table`. Returns the number of rows written.
    async fn replace_table(&self, layer: &LayerName, table: &FeatureTable)
        -> Result<u64, StoreError>;

    /// Drops the table if present. Returns whether a table existed, so a
    /// missing table is not an error.
    async fn drop_table(&self, layer: &LayerName) -> Result<bool, StoreError>;
}

/// Turns raw attribute names into unique, lower-case SQL identifiers.
///
/// Characters outside `[a-z0-9_]` become `_`, names starting with a digit get
/// an `f_` prefix, and names colliding with the `gid`/`geom` columns or with
/// an earlier attribute get a numeric suffix.
pub fn normalize_column_names<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut taken: Vec<String> = vec!["gid".to_string(), "geom".to_string()];
    let mut names = Vec::with_capacity(raw.len());

    for name in raw {
        let mut base: String = name
            .as_ref()
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if base.is_empty() {
            base = "field".to_string();
        }
        if base.starts_with(|c: char| c.is_ascii_digit()) {
            base = format!("f_{base}");
        }
        base.truncate(crate::pipeline::dataset::MAX_IDENTIFIER_LEN - 4);

        let mut candidate = base.clone();
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        taken.push(candidate.clone());
        names.push(candidate);
    }

    names
}
