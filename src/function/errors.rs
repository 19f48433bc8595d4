use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::security::credential::CredentialError;

/// Why an invocation could not relay a backend response.
///
/// The `Display` text stays in logs; callers only ever see [`ForwardError::public_message`].
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("token acquisition failed: {0}")]
    Authentication(#[from] CredentialError),
    #[error("backend gateway unreachable: {0}")]
    UpstreamUnavailable(String),
    #[error("backend gateway timed out")]
    UpstreamTimeout,
    #[error("{0} cannot be sent as an HTTP header")]
    InvalidHeader(&'static str),
}

impl ForwardError {
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout
        } else {
            // Strip the URL; it is logged separately.
            Self::UpstreamUnavailable(err.without_url().to_string())
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidHeader("name") => StatusCode::BAD_REQUEST,
            Self::InvalidHeader(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Failed to acquire access token for backend call",
            Self::UpstreamUnavailable(_) => "Backend gateway unreachable",
            Self::UpstreamTimeout => "Backend gateway timed out",
            Self::InvalidHeader("name") => "The name parameter contains characters not allowed in a header",
            Self::InvalidHeader(_) => "Backend call could not be prepared",
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
