//! Published layer management.
//!
//! - `GET /api/layers`: layers published in the map server workspace, each
//!   with its WMS, WFS and preview URLs.
//! - `DELETE /api/layers/{layer_name}`: removes the layer from the map
//!   server and drops its table. A layer removed from only one of the two
//!   systems is reported as a partial deletion.

use actix_web::web::{delete, get, scope};
use actix_web::Scope;

mod delete;
mod list;

const API_PATH: &str = "/layers";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", get().to(list::process))
        .route("/{layer_name}", delete().to(delete::process))
}
