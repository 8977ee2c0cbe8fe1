use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// JSON body for error and acknowledgement responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Returned when a background job is accepted.
#[derive(Debug, Serialize, Clone)]
pub struct JobSubmission {
    pub job_id: Uuid,
    pub status_url: String,
}

impl JobSubmission {
    pub fn new(job_id: Uuid, status_url: impl Into<String>) -> Self {
        Self {
            job_id,
            status_url: status_url.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiMessage>);

pub fn json_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiMessage::new(message)))
}

/// Log `err` and answer with a generic 500.
pub fn internal_error(context: &'static str, err: anyhow::Error) -> ApiError {
    error!(?err, context, "internal error");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
}
