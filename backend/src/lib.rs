//! Backend that imports zipped shapefiles into PostGIS and publishes them as
//! GeoServer layers.

pub mod config;
pub mod error;
pub mod geoserver;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod store;

use actix_web::web;

/// Registers every route of the backend.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(services::index))
        .service(services::configure_routes());
}
