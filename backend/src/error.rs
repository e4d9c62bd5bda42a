use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::responses::ErrorResponse;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure modes of the upload pipeline and the layer endpoints.
///
/// Validation failures map to `400`, processing failures to `500`. The
/// message of [`PipelineError::Internal`] is only logged; callers see a
/// generic text so no filesystem paths or driver messages leak out.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("corrupt archive")]
    CorruptArchive,

    #[error("no dataset found")]
    NoDatasetFound,

    #[error("import failed: {0}")]
    ImportFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("map server unavailable: {0}")]
    MapServerUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Message safe to return to the client.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidInput(_)
            | PipelineError::CorruptArchive
            | PipelineError::NoDatasetFound => StatusCode::BAD_REQUEST,
            PipelineError::ImportFailed(_)
            | PipelineError::PublishFailed(_)
            | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::MapServerUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.public_message()))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Internal(format!("IO error: {err}"))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Internal(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        assert_eq!(
            PipelineError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::CorruptArchive.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::NoDatasetFound.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn processing_errors_are_server_errors() {
        assert_eq!(
            PipelineError::ImportFailed("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PipelineError::PublishFailed("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PipelineError::MapServerUnavailable("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = PipelineError::Internal("IO error: /tmp/upload-1234/upload.zip".into());
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(PipelineError::NoDatasetFound.public_message(), "no dataset found");
    }
}
