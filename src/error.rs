//! HTTP-facing errors.
//!
//! Every error body has the shape `{"error": <status text>, "reason": <string>}`.

use actix_web::http::StatusCode;
use actix_web::http::header::{HeaderValue, RETRY_AFTER};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::completion::CompletionError;
use crate::gate::{Admission, Decision, GateError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Too Many Requests: {reason}")]
    RateLimited {
        reason: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Bad Gateway: {0}")]
    BadGateway(#[from] CompletionError),

    #[error("Service Unavailable: {0}")]
    GateUnavailable(#[from] GateError),
}

impl ApiError {
    pub fn from_denial(decision: &Decision) -> Self {
        ApiError::RateLimited {
            reason: decision.reason.to_string(),
            retry_after_secs: decision.reason.retry_after_secs(),
        }
    }

    /// Map a guarded gate check onto the handler flow: `Ok` to continue,
    /// `Err` to short-circuit.
    pub fn check_admission(admission: Admission) -> Result<Decision, ApiError> {
        match admission {
            Admission::Allowed(decision) => Ok(decision),
            Admission::Denied(decision) => Err(ApiError::from_denial(&decision)),
            Admission::Unavailable(err) => Err(ApiError::GateUnavailable(err)),
        }
    }

    fn reason(&self) -> String {
        match self {
            ApiError::RateLimited { reason, .. } => reason.clone(),
            ApiError::BadRequest(reason) => reason.clone(),
            ApiError::PayloadTooLarge { limit } => format!("Body exceeds limit of {} bytes", limit),
            ApiError::BadGateway(err) => err.to_string(),
            ApiError::GateUnavailable(err) => err.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        if let ApiError::RateLimited {
            retry_after_secs: Some(secs),
            ..
        } = self
        {
            builder.insert_header((RETRY_AFTER, HeaderValue::from(*secs)));
        }
        builder.json(json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "reason": self.reason(),
        }))
    }
}
