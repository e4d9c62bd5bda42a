use crate::model::layer::LayerUrls;
use serde::{Deserialize, Serialize};

/// Successful response of the shapefile upload endpoint.
///
/// `geoserver` is only present when the layer was published; when the import
/// succeeded but publication did not, `warning` explains why and the table is
/// still queryable directly in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub table_name: String,
    /// Number of features written to the spatial table.
    pub features: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoserver: Option<LayerUrls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
