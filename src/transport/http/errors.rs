use {
    crate::domain::error::{EngineError, GatewayErrorKind},
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Serialize,
};

/// Newtype so the domain error can become an axum response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Malformed path, query or body.
    pub fn bad_request(msg: impl std::fmt::Display) -> Self {
        Self(EngineError::Validation(msg.to_string()))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = &self.0;
        let status = match err {
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Gateway(g) if g.kind == GatewayErrorKind::Timeout => {
                StatusCode::GATEWAY_TIMEOUT
            }
            EngineError::Gateway(g) if g.kind == GatewayErrorKind::InProgress => {
                StatusCode::ACCEPTED
            }
            EngineError::Gateway(_) => StatusCode::BAD_GATEWAY,
            EngineError::Signature(_) => StatusCode::BAD_REQUEST,
            EngineError::State { .. } => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Database(_) | EngineError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if err.is_internal() {
            tracing::error!(error = %err, "internal error");
            "internal error".to_string()
        } else {
            err.to_string()
        };

        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: err.code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
