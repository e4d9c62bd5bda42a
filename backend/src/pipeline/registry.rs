use crate::error::{PipelineError, PipelineResult};
use crate::geoserver::{layer_urls, GeoServerClient};
use crate::pipeline::dataset::LayerName;
use crate::pipeline::locks::LayerLocks;
use crate::store::SpatialStore;
use common::model::layer::PublishedLayer;
use log::{error, info, warn};
use std::sync::Arc;

/// What one system did with a deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Removed,
    Absent,
    Failed,
}

/// Which of the two systems a deletion removed the layer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    Both,
    MapServerOnly,
    DatabaseOnly,
    /// Neither system knew the layer. Nothing was removed and nothing failed.
    Absent,
    Neither,
}

impl DeletionOutcome {
    fn from_removals(map_server: Removal, database: Removal) -> Self {
        match (map_server, database) {
            (Removal::Removed, Removal::Removed) => DeletionOutcome::Both,
            (Removal::Absent, Removal::Absent) => DeletionOutcome::Absent,
            (Removal::Removed, _) => DeletionOutcome::MapServerOnly,
            (_, Removal::Removed) => DeletionOutcome::DatabaseOnly,
            _ => DeletionOutcome::Neither,
        }
    }

    /// Partial deletions still count as success.
    pub fn is_success(self) -> bool {
        self != DeletionOutcome::Neither
    }

    pub fn is_partial(self) -> bool {
        matches!(
            self,
            DeletionOutcome::MapServerOnly | DeletionOutcome::DatabaseOnly
        )
    }

    pub fn message(self, layer: &LayerName) -> String {
        match self {
            DeletionOutcome::Both => format!("Layer '{layer}' deleted successfully"),
            DeletionOutcome::MapServerOnly => format!(
                "Layer '{layer}' partially deleted: removed from the map server \
                 but no table was dropped"
            ),
            DeletionOutcome::DatabaseOnly => format!(
                "Layer '{layer}' partially deleted: table dropped \
                 but no map server layer was removed"
            ),
            DeletionOutcome::Absent => {
                format!("Layer '{layer}' did not exist; nothing was deleted")
            }
            DeletionOutcome::Neither => format!("Layer '{layer}' could not be deleted"),
        }
    }
}

/// Lists and deletes layers across the map server and the spatial store.
#[derive(Clone)]
pub struct LayerRegistry {
    client: GeoServerClient,
    store: Arc<dyn SpatialStore>,
    locks: LayerLocks,
}

impl LayerRegistry {
    pub fn new(client: GeoServerClient, store: Arc<dyn SpatialStore>, locks: LayerLocks) -> Self {
        Self {
            client,
            store,
            locks,
        }
    }

    /// Removes `raw_name` from both systems, each attempted independently.
    ///
    /// The name is validated before anything is sent anywhere. A system that
    /// never had the layer reports it as absent rather than removed.
    pub async fn delete(&self, raw_name: &str) -> PipelineResult<(LayerName, DeletionOutcome)> {
        let layer = LayerName::parse(raw_name)?;
        let _guard = self.locks.acquire(&layer).await;

        let map_server = self.unpublish(&layer).await;
        let database = match self.store.drop_table(&layer).await {
            Ok(true) => Removal::Removed,
            Ok(false) => Removal::Absent,
            Err(e) => {
                error!("Failed to drop table for layer '{}': {}", layer, e);
                Removal::Failed
            }
        };

        let outcome = DeletionOutcome::from_removals(map_server, database);
        match outcome {
            DeletionOutcome::Both => info!("Deleted layer '{}'", layer),
            DeletionOutcome::Absent => info!("Layer '{}' not found in either system", layer),
            _ if outcome.is_partial() => warn!("{}", outcome.message(&layer)),
            _ => {}
        }
        Ok((layer, outcome))
    }

    /// Deletes the layer and then its feature type. The feature type call is
    /// made even when the layer call fails.
    async fn unpublish(&self, layer: &LayerName) -> Removal {
        let results = [
            self.client.delete_layer(layer).await,
            self.client.delete_feature_type(layer).await,
        ];
        let mut removal = Removal::Absent;
        for result in results {
            match result {
                Ok(true) if removal == Removal::Absent => removal = Removal::Removed,
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to remove layer '{}' from the map server: {}", layer, e);
                    removal = Removal::Failed;
                }
            }
        }
        removal
    }

    /// Layers currently published in the workspace, with their service URLs.
    ///
    /// Names the map server reports that are not valid identifiers were not
    /// created here and are skipped.
    pub async fn list(&self) -> PipelineResult<Vec<PublishedLayer>> {
        let names = self
            .client
            .list_layers()
            .await
            .map_err(|e| PipelineError::MapServerUnavailable(e.to_string()))?;

        Ok(names
            .iter()
            .filter_map(|name| LayerName::parse(name).ok())
            .map(|layer| PublishedLayer {
                name: layer.to_string(),
                title: layer.title(),
                urls: layer_urls(self.client.config(), &layer),
            })
            .collect())
    }
}
