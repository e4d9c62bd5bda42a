//! Shared application state handed to the HTTP handlers as `web::Data`.

use crate::config::AppConfig;
use crate::geoserver::{GeoServerClient, GeoServerError, LayerPublisher};
use crate::pipeline::loader::VectorLoader;
use crate::pipeline::locks::LayerLocks;
use crate::pipeline::registry::LayerRegistry;
use crate::pipeline::ShapefilePipeline;
use crate::store::postgis::PostgisStore;
use crate::store::SpatialStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ShapefilePipeline,
    pub registry: LayerRegistry,
}

impl AppState {
    /// Production wiring: PostGIS store and the configured map server.
    pub fn from_config(config: &AppConfig) -> Result<Self, GeoServerError> {
        let store: Arc<dyn SpatialStore> = Arc::new(PostgisStore::connect_lazy(&config.database));
        Self::with_store(config, store)
    }

    /// Wires the components around an arbitrary spatial store.
    ///
    /// The pipeline and the registry share one lock table so uploads and
    /// deletions of the same layer never interleave.
    pub fn with_store(
        config: &AppConfig,
        store: Arc<dyn SpatialStore>,
    ) -> Result<Self, GeoServerError> {
        let client = GeoServerClient::new(Arc::new(config.geoserver.clone()))?;
        let locks = LayerLocks::new();

        let pipeline = ShapefilePipeline::new(
            VectorLoader::new(store.clone()),
            LayerPublisher::new(client.clone(), config.database.clone()),
            locks.clone(),
            config.upload.clone(),
        );
        let registry = LayerRegistry::new(client, store, locks);

        Ok(Self { pipeline, registry })
    }
}
