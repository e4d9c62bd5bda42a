use serde::{Deserialize, Serialize};

/// Access URLs for a layer published in the map server.
///
/// All three are derived from the configured map server base URL, the fixed
/// workspace and the layer identifier, so clients can render the layer as a
/// map image (`wms`), fetch its features as GeoJSON (`wfs`) or open the
/// server's built-in preview page (`preview`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerUrls {
    pub wms: String,
    pub wfs: String,
    pub preview: String,
}

/// A layer currently published in the map server workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedLayer {
    /// Layer identifier, identical to the spatial table name.
    pub name: String,
    /// Human readable title derived from the identifier.
    pub title: String,
    #[serde(flatten)]
    pub urls: LayerUrls,
}

/// Payload of `GET /api/layers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerList {
    pub layers: Vec<PublishedLayer>,
}
