use crate::state::AppState;
use actix_web::{web, HttpResponse, ResponseError};
use common::model::layer::LayerList;
use common::responses::ApiResponse;
use log::error;

pub(crate) async fn process(state: web::Data<AppState>) -> HttpResponse {
    match state.registry.list().await {
        Ok(layers) => {
            let message = format!("{} layers published", layers.len());
            HttpResponse::Ok().json(ApiResponse::ok(LayerList { layers }, message))
        }
        Err(e) => {
            error!("Failed to list layers: {}", e);
            e.error_response()
        }
    }
}
