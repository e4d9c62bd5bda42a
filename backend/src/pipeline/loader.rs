//! Vector loading into the spatial store.
//!
//! ## Strategies
//!
//! 1. **Direct**: shapes and dBase records are read in lock-step, attribute
//!    types follow the dBase field types and geometries are sent as WKT.
//!    Any read error, record/shape count mismatch or store error fails it.
//! 2. **GeoJSON interchange**: the dataset is serialized to a GeoJSON
//!    FeatureCollection inside the working directory, read back, and loaded
//!    with every attribute as text and geometries parsed by PostGIS from
//!    GeoJSON. Unreadable attribute tables degrade to a geometry-only import.
//!
//! The second strategy only runs when the first one failed; both outcomes
//! are logged.

use crate::error::PipelineError;
use crate::pipeline::dataset::{sibling_with_extension, LayerName, VectorDataset};
use crate::store::{
    normalize_column_names, AttributeValue, Column, ColumnType, FeatureRow, FeatureTable,
    GeometryText, SpatialStore, StoreError,
};
use dbase::encoding::LossyCodePage;
use dbase::yore::code_pages;
use dbase::{FieldType, FieldValue};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::{debug, info, warn};
use shapefile::{Shape, ShapeReader};
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use wkt::ToWkt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    Direct,
    GeoJsonFallback,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::Direct => f.write_str("direct"),
            LoadStrategy::GeoJsonFallback => f.write_str("geojson fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub layer: LayerName,
    pub features: u64,
    pub strategy: LoadStrategy,
    /// Null shapes that had no geometry to import.
    pub skipped: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} features into '{}' ({})",
            self.features, self.layer, self.strategy
        )?;
        if self.skipped > 0 {
            write!(f, ", {} null shapes skipped", self.skipped)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error("cannot read dataset: {0}")]
    Read(String),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("interchange file: {0}")]
    Interchange(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<shapefile::Error> for LoadError {
    fn from(err: shapefile::Error) -> Self {
        LoadError::Read(err.to_string())
    }
}

impl From<dbase::Error> for LoadError {
    fn from(err: dbase::Error) -> Self {
        LoadError::Read(err.to_string())
    }
}

/// Reads located datasets and writes them through a [`SpatialStore`].
#[derive(Clone)]
pub struct VectorLoader {
    store: Arc<dyn SpatialStore>,
}

impl VectorLoader {
    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self { store }
    }

    /// Replaces the table named after `dataset` with its features.
    ///
    /// `scratch_dir` receives the interchange file of the fallback strategy.
    pub async fn load(
        &self,
        dataset: &VectorDataset,
        scratch_dir: &Path,
    ) -> Result<ImportReport, PipelineError> {
        let direct_error = match self.load_direct(dataset).await {
            Ok(report) => return Ok(report),
            Err(e) => e,
        };
        warn!(
            "Direct import of '{}' failed: {}; retrying through GeoJSON interchange",
            dataset.layer, direct_error
        );

        match self.load_via_geojson(dataset, scratch_dir).await {
            Ok(report) => {
                info!(
                    "GeoJSON fallback imported {} features into '{}'",
                    report.features, report.layer
                );
                Ok(report)
            }
            Err(fallback_error) => {
                warn!(
                    "GeoJSON fallback for '{}' failed: {}",
                    dataset.layer, fallback_error
                );
                Err(PipelineError::ImportFailed(format!(
                    "direct import: {direct_error}; geojson fallback: {fallback_error}"
                )))
            }
        }
    }

    async fn load_direct(&self, dataset: &VectorDataset) -> Result<ImportReport, LoadError> {
        let shp_path = dataset.shp_path.clone();
        let dbf_path = dataset.dbf_path();
        let (table, skipped) =
            tokio::task::spawn_blocking(move || read_typed_table(&shp_path, dbf_path.as_deref()))
                .await??;

        let features = self.store.replace_table(&dataset.layer, &table).await?;
        Ok(ImportReport {
            layer: dataset.layer.clone(),
            features,
            strategy: LoadStrategy::Direct,
            skipped,
        })
    }

    async fn load_via_geojson(
        &self,
        dataset: &VectorDataset,
        scratch_dir: &Path,
    ) -> Result<ImportReport, LoadError> {
        let shp_path = dataset.shp_path.clone();
        let dbf_path = dataset.dbf_path();
        let interchange_path = scratch_dir.join(format!("{}.geojson", dataset.layer));

        let (table, skipped) = tokio::task::spawn_blocking(move || {
            let skipped = write_geojson(&shp_path, dbf_path.as_deref(), &interchange_path)?;
            let table = read_geojson_table(&interchange_path)?;
            Ok::<_, LoadError>((table, skipped))
        })
        .await??;

        let features = self.store.replace_table(&dataset.layer, &table).await?;
        Ok(ImportReport {
            layer: dataset.layer.clone(),
            features,
            strategy: LoadStrategy::GeoJsonFallback,
            skipped,
        })
    }
}

fn read_shapes(shp_path: &Path) -> Result<Vec<Shape>, LoadError> {
    let mut reader = ShapeReader::from_path(shp_path)?;
    let shapes = reader.iter_shapes().collect::<Result<Vec<_>, _>>()?;
    Ok(shapes)
}

type DbaseTable = (Vec<dbase::FieldInfo>, Vec<dbase::Record>);

fn read_records(dbf_path: &Path) -> Result<DbaseTable, LoadError> {
    let mut reader = dbase::Reader::from_path(dbf_path)?;
    if let Some(label) = read_code_page_label(dbf_path) {
        if !apply_code_page(&mut reader, &label) {
            warn!(
                "Unknown code page '{}' declared for {}, decoding by the dBase header",
                label,
                file_label(dbf_path)
            );
        }
    }
    let fields = reader.fields().to_vec();
    let records = reader.iter_records().collect::<Result<Vec<_>, _>>()?;
    Ok((fields, records))
}

/// File name only; error messages reach API clients and must not carry
/// working directory paths.
fn file_label(path: &Path) -> Cow<'_, str> {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or(Cow::Borrowed("<unnamed>"))
}

/// Contents of the `.cpg` sidecar next to `dbf_path`, if any.
fn read_code_page_label(dbf_path: &Path) -> Option<String> {
    let cpg_path = sibling_with_extension(dbf_path, "cpg")?;
    let label = std::fs::read_to_string(cpg_path).ok()?;
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// Overrides the header code page with the one a `.cpg` sidecar declares.
/// Returns `false` when the label names no supported code page.
fn apply_code_page<T: Read + Seek>(reader: &mut dbase::Reader<T>, label: &str) -> bool {
    let normalized: String = label
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect::<String>()
        .to_ascii_uppercase();
    let digits = normalized.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    match (normalized.as_str(), digits) {
        ("UTF8", _) | (_, "65001") => reader.set_encoding(dbase::UnicodeLossy),
        ("LATIN1" | "ISO88591", _) | (_, "1252" | "88591") => {
            reader.set_encoding(LossyCodePage(code_pages::CP1252))
        }
        (_, "1250") => reader.set_encoding(LossyCodePage(code_pages::CP1250)),
        (_, "1251") => reader.set_encoding(LossyCodePage(code_pages::CP1251)),
        (_, "850") => reader.set_encoding(LossyCodePage(code_pages::CP850)),
        (_, "437") => reader.set_encoding(LossyCodePage(code_pages::CP437)),
        _ => return false,
    }
    true
}

fn to_geometry(shape: Shape) -> Result<Option<geo_types::Geometry<f64>>, LoadError> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }
    geo_types::Geometry::<f64>::try_from(shape)
        .map(Some)
        .map_err(|e| LoadError::Read(format!("unsupported geometry: {e}")))
}

fn column_type(field_type: FieldType) -> ColumnType {
    match field_type {
        FieldType::Numeric | FieldType::Float | FieldType::Double | FieldType::Currency => {
            ColumnType::Double
        }
        FieldType::Integer => ColumnType::Integer,
        FieldType::Logical => ColumnType::Boolean,
        _ => ColumnType::Text,
    }
}

fn format_date(date: &dbase::Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

fn attribute_value(value: Option<&FieldValue>) -> AttributeValue {
    match value {
        None => AttributeValue::Null,
        Some(FieldValue::Character(v)) => v
            .as_ref()
            .map(|s| AttributeValue::Text(s.trim_end().to_string()))
            .unwrap_or(AttributeValue::Null),
        Some(FieldValue::Memo(v)) => AttributeValue::Text(v.clone()),
        Some(FieldValue::Numeric(v)) => {
            v.map(AttributeValue::Double).unwrap_or(AttributeValue::Null)
        }
        Some(FieldValue::Float(v)) => v
            .map(|f| AttributeValue::Double(f64::from(f)))
            .unwrap_or(AttributeValue::Null),
        Some(FieldValue::Double(v)) | Some(FieldValue::Currency(v)) => AttributeValue::Double(*v),
        Some(FieldValue::Integer(v)) => AttributeValue::Integer(i64::from(*v)),
        Some(FieldValue::Logical(v)) => {
            v.map(AttributeValue::Boolean).unwrap_or(AttributeValue::Null)
        }
        Some(FieldValue::Date(v)) => v
            .as_ref()
            .map(|d| AttributeValue::Text(format_date(d)))
            .unwrap_or(AttributeValue::Null),
        Some(FieldValue::DateTime(v)) => {
            let time = v.time();
            AttributeValue::Text(format!(
                "{}T{:02}:{:02}:{:02}",
                format_date(&v.date()),
                time.hours(),
                time.minutes(),
                time.seconds()
            ))
        }
        #[allow(unreachable_patterns)]
        Some(_) => AttributeValue::Null,
    }
}

/// Direct strategy reader: typed columns, strict record/shape pairing.
fn read_typed_table(
    shp_path: &Path,
    dbf_path: Option<&Path>,
) -> Result<(FeatureTable, usize), LoadError> {
    let shapes = read_shapes(shp_path)?;
    let (fields, records) = match dbf_path {
        Some(path) => read_records(path)?,
        None => (Vec::new(), Vec::new()),
    };
    if dbf_path.is_some() && records.len() != shapes.len() {
        return Err(LoadError::Read(format!(
            "{} shapes but {} attribute records",
            shapes.len(),
            records.len()
        )));
    }

    let raw_names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
    let columns: Vec<Column> = normalize_column_names(&raw_names)
        .into_iter()
        .zip(&fields)
        .map(|(name, field)| Column {
            name,
            kind: column_type(field.field_type()),
        })
        .collect();

    let mut rows = Vec::with_capacity(shapes.len());
    let mut skipped = 0;
    let mut records = records.into_iter();
    for shape in shapes {
        let record = records.next();
        let Some(geometry) = to_geometry(shape)? else {
            skipped += 1;
            continue;
        };
        let values = raw_names
            .iter()
            .map(|name| attribute_value(record.as_ref().and_then(|r| r.get(name))))
            .collect();
        rows.push(FeatureRow {
            geometry: GeometryText::Wkt(geometry.wkt_string()),
            values,
        });
    }

    Ok((FeatureTable { columns, rows }, skipped))
}

fn json_value(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Text(v) => JsonValue::from(v.as_str()),
        AttributeValue::Integer(v) => JsonValue::from(*v),
        AttributeValue::Double(v) => JsonValue::from(*v),
        AttributeValue::Boolean(v) => JsonValue::from(*v),
    }
}

/// Serializes the dataset as a GeoJSON FeatureCollection at `out_path`.
///
/// Attribute records are paired with shapes by position; an unreadable
/// attribute table produces features without properties.
fn write_geojson(
    shp_path: &Path,
    dbf_path: Option<&Path>,
    out_path: &Path,
) -> Result<usize, LoadError> {
    let shapes = read_shapes(shp_path)?;
    let (fields, records) = match dbf_path.map(read_records) {
        Some(Ok(table)) => table,
        Some(Err(e)) => {
            warn!("Ignoring unreadable attribute table {:?}: {}", dbf_path, e);
            (Vec::new(), Vec::new())
        }
        None => (Vec::new(), Vec::new()),
    };
    let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();

    let mut features = Vec::with_capacity(shapes.len());
    let mut skipped = 0;
    let mut records = records.into_iter();
    for shape in shapes {
        let record = records.next();
        let Some(geometry) = to_geometry(shape)? else {
            skipped += 1;
            continue;
        };
        let mut properties = JsonObject::new();
        if let Some(record) = &record {
            for name in &names {
                properties.insert(
                    name.to_string(),
                    json_value(&attribute_value(record.get(name))),
                );
            }
        }
        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    std::fs::write(out_path, collection.to_string()).map_err(|e| {
        debug!("Failed to write interchange file {:?}: {}", out_path, e);
        LoadError::Interchange(format!("cannot write {}: {e}", file_label(out_path)))
    })?;
    Ok(skipped)
}

/// Reads an interchange file back as an all-text feature table.
fn read_geojson_table(path: &Path) -> Result<FeatureTable, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        debug!("Failed to read interchange file {:?}: {}", path, e);
        LoadError::Interchange(format!("cannot read {}: {e}", file_label(path)))
    })?;
    let collection = match text
        .parse::<GeoJson>()
        .map_err(|e| LoadError::Interchange(e.to_string()))?
    {
        GeoJson::FeatureCollection(collection) => collection,
        _ => {
            return Err(LoadError::Interchange(
                "expected a FeatureCollection".to_string(),
            ))
        }
    };

    // Property order follows the first feature carrying properties.
    let raw_names: Vec<String> = collection
        .features
        .iter()
        .find_map(|f| f.properties.as_ref())
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    let columns = normalize_column_names(&raw_names)
        .into_iter()
        .map(|name| Column {
            name,
            kind: ColumnType::Text,
        })
        .collect();

    let mut rows = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let geometry = serde_json::to_string(geometry)
            .map_err(|e| LoadError::Interchange(e.to_string()))?;
        let values = raw_names
            .iter()
            .map(|name| match feature.property(name) {
                None | Some(JsonValue::Null) => AttributeValue::Null,
                Some(JsonValue::String(s)) => AttributeValue::Text(s.clone()),
                Some(other) => AttributeValue::Text(other.to_string()),
            })
            .collect();
        rows.push(FeatureRow {
            geometry: GeometryText::GeoJson(geometry),
            values,
        });
    }

    Ok(FeatureTable { columns, rows })
}
