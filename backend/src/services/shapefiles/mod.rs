//! Shapefile upload.
//!
//! `POST /api/upload-shapefile` (also reachable as `/api/process-shapefile`)
//! takes a multipart form with a `file` field holding a zipped shapefile. The
//! archive is validated, extracted, imported into the spatial database and
//! published in the map server. The response names the table, the number of
//! imported features and, when publication succeeded, the layer URLs.

use actix_web::web::{post, ServiceConfig};

mod upload;

pub fn configure_routes(cfg: &mut ServiceConfig) {
    cfg.route("/upload-shapefile", post().to(upload::process))
        .route("/process-shapefile", post().to(upload::process));
}
