//! Shapefile upload pipeline.
//!
//! An upload goes through `Received → Validated → Extracted → Loaded →
//! Published → Done`. Every request works in its own temporary directory,
//! which is removed however the run ends. Load and publish of the same layer
//! identifier are serialized through [`locks::LayerLocks`].

pub mod archive;
pub mod dataset;
pub mod loader;
pub mod locks;
pub mod registry;

use crate::config::UploadConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::geoserver::{GeoServerError, LayerPublisher};
use crate::pipeline::dataset::{LayerName, VectorDataset};
use crate::pipeline::loader::{LoadStrategy, VectorLoader};
use crate::pipeline::locks::LayerLocks;
use common::model::layer::LayerUrls;
use log::{debug, error, info, warn};
use std::fmt;
use std::fs;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Extracted,
    Loaded,
    Published,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Extracted => "extracted",
            Stage::Loaded => "loaded",
            Stage::Published => "published",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// An uploaded archive as received from the client.
#[derive(Debug, Clone)]
pub struct UploadArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub layer: LayerName,
    pub features: u64,
    pub strategy: LoadStrategy,
    /// Service URLs, absent when publication failed.
    pub urls: Option<LayerUrls>,
    pub publish_warning: Option<String>,
}

#[derive(Clone)]
pub struct ShapefilePipeline {
    loader: VectorLoader,
    publisher: LayerPublisher,
    locks: LayerLocks,
    upload: UploadConfig,
}

impl ShapefilePipeline {
    pub fn new(
        loader: VectorLoader,
        publisher: LayerPublisher,
        locks: LayerLocks,
        upload: UploadConfig,
    ) -> Self {
        Self {
            loader,
            publisher,
            locks,
            upload,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.upload.max_upload_bytes()
    }

    /// Validates, extracts, imports and publishes one uploaded archive.
    ///
    /// A publication failure does not undo the import: the outcome carries a
    /// warning instead of service URLs.
    pub async fn run(&self, upload: UploadArchive) -> PipelineResult<PipelineOutcome> {
        let request_id = Uuid::new_v4();
        let mut stage = Stage::Received;
        info!(
            "[{}] {}: '{}' ({} bytes)",
            request_id,
            stage,
            upload.file_name,
            upload.bytes.len()
        );

        let result = self.execute(request_id, upload, &mut stage).await;
        if let Err(e) = &result {
            error!("[{}] failed after stage '{}': {}", request_id, stage, e);
        }
        result
    }

    async fn execute(
        &self,
        request_id: Uuid,
        upload: UploadArchive,
        stage: &mut Stage,
    ) -> PipelineResult<PipelineOutcome> {
        archive::validate_upload(
            &upload.file_name,
            &upload.bytes,
            self.upload.max_upload_bytes(),
        )?;
        advance(request_id, stage, Stage::Validated);

        let work_root = self.upload.work_root();
        fs::create_dir_all(&work_root)?;
        let workdir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(&work_root)?;
        debug!("[{}] working directory {:?}", request_id, workdir.path());

        let zip_path = workdir.path().join("upload.zip");
        let extract_dir = workdir.path().join("extracted");
        let bytes = upload.bytes;
        let max_extracted = self.upload.max_extracted_bytes();
        let dataset: VectorDataset = tokio::task::spawn_blocking(move || {
            fs::write(&zip_path, &bytes)?;
            let entries = archive::extract_archive(&zip_path, &extract_dir, max_extracted)?;
            debug!("[{}] extracted {} entries", request_id, entries);
            archive::locate_dataset(&extract_dir)
        })
        .await??;
        advance(request_id, stage, Stage::Extracted);
        info!(
            "[{}] dataset {:?} -> layer '{}'",
            request_id,
            dataset.shp_path.file_name().unwrap_or_default(),
            dataset.layer
        );

        let guard = self.locks.acquire(&dataset.layer).await;

        let report = self.loader.load(&dataset, workdir.path()).await?;
        advance(request_id, stage, Stage::Loaded);
        info!("[{}] imported {}", request_id, report);
        if report.skipped > 0 {
            warn!(
                "[{}] {} shapes without geometry were not imported into '{}'",
                request_id, report.skipped, report.layer
            );
        }

        let (urls, publish_warning) = match self.publisher.publish(&report.layer).await {
            Ok(urls) => (Some(urls), None),
            Err(e) => {
                warn!(
                    "[{}] layer '{}' imported but not published: {}",
                    request_id, report.layer, e
                );
                (None, Some(unpublished_warning(&e)))
            }
        };
        advance(request_id, stage, Stage::Published);
        drop(guard);

        if let Err(e) = workdir.close() {
            warn!("[{}] failed to remove working directory: {}", request_id, e);
        }
        advance(request_id, stage, Stage::Done);

        Ok(PipelineOutcome {
            layer: report.layer,
            features: report.features,
            strategy: report.strategy,
            urls,
            publish_warning,
        })
    }
}

/// Upload response warning for a layer that was imported but not published.
fn unpublished_warning(err: &GeoServerError) -> String {
    format!(
        "Layer imported but could not be published ({})",
        PipelineError::PublishFailed(err.to_string())
    )
}

fn advance(request_id: Uuid, stage: &mut Stage, next: Stage) {
    info!("[{}] {} -> {}", request_id, stage, next);
    *stage = next;
}
