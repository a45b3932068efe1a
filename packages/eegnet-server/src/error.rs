use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eegnet_prep::PipelineError;
use serde::{Deserialize, Serialize};

/// Body of every non-2xx response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Model is not loaded")]
    ModelUnavailable,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::ModelUnavailable => "model_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::ClassifierUnavailable => ApiError::ModelUnavailable,
            e if e.is_client_error() => ApiError::BadRequest(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = match &self {
            ApiError::Internal(message) => {
                tracing::error!("Request failed: {}", message);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: self.kind().to_string(),
            detail,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_errors_map_to_status() {
        let shape: ApiError = PipelineError::Shape("20 channels".into()).into();
        assert_eq!(shape.status(), StatusCode::BAD_REQUEST);

        let short: ApiError = PipelineError::InsufficientSamples {
            required: 1000,
            actual: 10,
        }
        .into();
        assert_eq!(short.status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = PipelineError::ClassifierUnavailable.into();
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);

        let failed: ApiError = PipelineError::Inference("NaN".into()).into();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_detail_is_generic() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "internal_error");
        assert_eq!(body.detail, "Internal server error");
    }

    #[tokio::test]
    async fn test_client_detail_is_kept() {
        let response = ApiError::from(PipelineError::Shape("Request has 20 channels".into()))
            .into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "invalid_input");
        assert!(body.detail.contains("20 channels"));
    }
}
