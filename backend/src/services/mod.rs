pub mod layers;
pub mod shapefiles;

use actix_web::web::scope;
use actix_web::{HttpResponse, Responder, Scope};
use common::responses::ApiResponse;

const API_PATH: &str = "/api";

/// All `/api` routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .service(layers::configure_routes())
        .configure(shapefiles::configure_routes)
}

/// `GET /`: confirms the backend is up.
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::<()>::message(
        true,
        "Shapefile ingestion backend is running",
    ))
}
