use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::container::ContainerError;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request failure taxonomy.
///
/// Every variant maps to exactly one HTTP status; bodies stay empty so
/// no internal detail leaks to the client. The originating condition is
/// logged before the response is rendered.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authorization required for namespace '{realm}'")]
    Unauthorized { realm: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("replication policy not satisfied")]
    ReplicationPolicy,

    #[error("every node-level lookup failed")]
    AllLookupsFailed,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ContainerError> for GatewayError {
    fn from(err: ContainerError) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::error!("{self}");

        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST.into_response(),
            GatewayError::Unauthorized { realm } => (
                StatusCode::UNAUTHORIZED,
                [(
                    header::WWW_AUTHENTICATE,
                    format!("Basic realm=\"{realm}\""),
                )],
            )
                .into_response(),
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND.into_response(),
            GatewayError::Storage(err) if err.is_not_found() => {
                StatusCode::NOT_FOUND.into_response()
            }
            GatewayError::AllLookupsFailed => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            GatewayError::Precondition(_)
            | GatewayError::ReplicationPolicy
            | GatewayError::Decode(_)
            | GatewayError::Storage(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
