//! HTTP error responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use promptbench::DispatchError;
use tracing::{error, warn};

/// Error returned by a handler, rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// A dispatch operation failed.
    Dispatch(DispatchError),
    /// The inbound request could not be understood.
    BadRequest(String),
    /// An extractor rejected the request; keeps the extractor's status.
    Rejected { status: StatusCode, detail: String },
    /// Local failure unrelated to upstream (e.g. writing the report file).
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Dispatch(e) => match e {
                DispatchError::InvalidModel(_) | DispatchError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                DispatchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                DispatchError::UpstreamError { .. }
                | DispatchError::UpstreamUnavailable(_)
                | DispatchError::MalformedResponse(_)
                | DispatchError::StreamInterrupted(_)
                | DispatchError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Dispatch(e) => e.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::Rejected { detail, .. } => detail.clone(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        ApiError::Dispatch(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            error!("{status}: {detail}");
        } else {
            warn!("{status}: {detail}");
        }
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_status_codes() {
        let cases = [
            (DispatchError::InvalidModel("m".into()), 400),
            (DispatchError::InvalidRequest("runs".into()), 400),
            (DispatchError::RateLimited { attempts: 5 }, 429),
            (
                DispatchError::UpstreamError {
                    status: 502,
                    body: String::new(),
                },
                500,
            ),
            (DispatchError::UpstreamUnavailable("down".into()), 500),
            (DispatchError::MalformedResponse("no text".into()), 500),
            (DispatchError::Transport("reset".into()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status().as_u16(), expected);
        }
    }

    #[test]
    fn local_errors_map_to_status_codes() {
        assert_eq!(
            ApiError::BadRequest("missing field".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("disk full".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let rejected = ApiError::Rejected {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: "missing field `model`".into(),
        };
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(rejected.detail(), "missing field `model`");
    }
}
