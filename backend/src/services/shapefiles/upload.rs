use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{PipelineOutcome, UploadArchive};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use common::model::upload::UploadResponse;
use futures_util::StreamExt;

const FILE_FIELD: &str = "file";

/// Runs the upload pipeline and renders its outcome.
///
/// - On success: `200 OK` with an [`UploadResponse`].
/// - On failure: `400` or `500` with `{"success": false, "error": ...}`.
pub async fn process(payload: Multipart, state: web::Data<AppState>) -> HttpResponse {
    match upload_shapefile(payload, &state).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => e.error_response(),
    }
}

async fn upload_shapefile(payload: Multipart, state: &AppState) -> PipelineResult<UploadResponse> {
    let upload = read_upload(payload, state.pipeline.max_upload_bytes()).await?;
    let outcome = state.pipeline.run(upload).await?;
    Ok(into_response(outcome))
}

/// Reads the `file` field of the form, refusing payloads above `max_bytes`.
async fn read_upload(mut payload: Multipart, max_bytes: usize) -> PipelineResult<UploadArchive> {
    let mut upload: Option<UploadArchive> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(malformed)?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));

        if name.as_deref() != Some(FILE_FIELD) || upload.is_some() {
            // Drain fields we do not use.
            while let Some(chunk) = field.next().await {
                chunk.map_err(malformed)?;
            }
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
            .unwrap_or_default();
        if file_name.is_empty() {
            return Err(PipelineError::InvalidInput("no file selected".to_string()));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(malformed)?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(PipelineError::InvalidInput(format!(
                    "file exceeds the maximum upload size of {} MB",
                    max_bytes / (1024 * 1024)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some(UploadArchive { file_name, bytes });
    }

    upload.ok_or_else(|| PipelineError::InvalidInput("no file part in the request".to_string()))
}

fn malformed(err: actix_multipart::MultipartError) -> PipelineError {
    PipelineError::InvalidInput(format!("malformed multipart payload: {err}"))
}

fn into_response(outcome: PipelineOutcome) -> UploadResponse {
    let message = match outcome.publish_warning {
        None => format!(
            "Shapefile imported and published as layer '{}'",
            outcome.layer
        ),
        Some(_) => format!("Shapefile imported into table '{}'", outcome.layer),
    };
    UploadResponse {
        success: true,
        message,
        table_name: outcome.layer.to_string(),
        features: outcome.features,
        geoserver: outcome.urls,
        warning: outcome.publish_warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::LayerName;
    use crate::pipeline::loader::LoadStrategy;

    fn outcome(warning: Option<&str>) -> PipelineOutcome {
        PipelineOutcome {
            layer: LayerName::parse("parks").unwrap(),
            features: 10,
            strategy: LoadStrategy::Direct,
            urls: None,
            publish_warning: warning.map(str::to_string),
        }
    }

    #[test]
    fn publish_warning_keeps_success() {
        let response = into_response(outcome(Some("map server unreachable")));
        assert!(response.success);
        assert_eq!(response.table_name, "parks");
        assert_eq!(response.features, 10);
        assert!(response.geoserver.is_none());
        assert_eq!(response.warning.as_deref(), Some("map server unreachable"));
    }

    #[test]
    fn warning_is_omitted_from_json_when_published() {
        let body = serde_json::to_value(into_response(outcome(None))).unwrap();
        assert!(body.get("warning").is_none());
        assert_eq!(body["table_name"], "parks");
    }
}
