use crate::config::{DatabaseConfig, GeoServerConfig};
use crate::geoserver::client::GeoServerClient;
use crate::geoserver::GeoServerError;
use crate::pipeline::dataset::LayerName;
use common::model::layer::LayerUrls;
use log::{info, warn};

/// Registers imported tables as map server layers.
#[derive(Clone)]
pub struct LayerPublisher {
    client: GeoServerClient,
    database: DatabaseConfig,
}

impl LayerPublisher {
    pub fn new(client: GeoServerClient, database: DatabaseConfig) -> Self {
        Self { client, database }
    }

    /// Ensures the data store and the layer exist, then returns its URLs.
    ///
    /// An already published layer is left untouched so manual server-side
    /// configuration survives re-uploads.
    pub async fn publish(&self, layer: &LayerName) -> Result<LayerUrls, GeoServerError> {
        self.ensure_datastore().await?;

        if self.client.feature_type_exists(layer).await? {
            info!("Layer '{}' is already published", layer);
        } else if let Err(e) = self.client.create_feature_type(layer).await {
            // A timed out create may still have been applied.
            if !self.client.feature_type_exists(layer).await.unwrap_or(false) {
                return Err(e);
            }
            warn!("Creating layer '{}' reported {} but it exists", layer, e);
        } else {
            info!("Published layer '{}'", layer);
        }

        Ok(layer_urls(self.client.config(), layer))
    }

    async fn ensure_datastore(&self) -> Result<(), GeoServerError> {
        if self.client.datastore_exists().await? {
            return Ok(());
        }
        info!(
            "Creating data store '{}' in workspace '{}'",
            self.client.config().datastore,
            self.client.config().workspace
        );
        if let Err(e) = self.client.create_datastore(&self.database).await {
            if !self.client.datastore_exists().await.unwrap_or(false) {
                return Err(e);
            }
            warn!("Creating data store reported {} but it exists", e);
        }
        Ok(())
    }
}

/// WMS, WFS and preview URLs for a layer of the configured workspace.
pub fn layer_urls(config: &GeoServerConfig, layer: &LayerName) -> LayerUrls {
    let base = config.base_url();
    let ws = &config.workspace;
    LayerUrls {
        wms: format!(
            "{base}/{ws}/wms?service=WMS&version=1.1.0&request=GetMap&layers={ws}:{layer}"
        ),
        wfs: format!(
            "{base}/{ws}/ows?service=WFS&version=1.0.0&request=GetFeature\
             &typeName={ws}:{layer}&outputFormat=application/json"
        ),
        preview: format!(
            "{base}/{ws}/wms/reflect?layers={ws}:{layer}&format=application/openlayers"
        ),
    }
}
