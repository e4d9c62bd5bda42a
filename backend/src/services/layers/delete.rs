use crate::state::AppState;
use actix_web::{web, HttpResponse, ResponseError};
use common::responses::ApiResponse;

pub(crate) async fn process(
    layer_name: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match state.registry.delete(&layer_name.into_inner()).await {
        Ok((layer, outcome)) => {
            let body = ApiResponse::<()>::message(outcome.is_success(), outcome.message(&layer));
            if outcome.is_success() {
                HttpResponse::Ok().json(body)
            } else {
                HttpResponse::InternalServerError().json(body)
            }
        }
        Err(e) => e.error_response(),
    }
}
