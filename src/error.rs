use poem::error::ResponseError;
use poem::http::StatusCode;

/// The failures a request can end in once it is past the auth gate.
///
/// The rendered message is sent back as the response body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    /// The source image could not be fetched or decoded.
    #[error("failed to retrieve source image: {0:#}")]
    UpstreamFetch(anyhow::Error),

    /// Storage, queue or encoder failure.
    #[error("backend failure: {0:#}")]
    Backend(anyhow::Error),
}

impl ApiError {
    pub fn upstream(e: impl Into<anyhow::Error>) -> Self {
        Self::UpstreamFetch(e.into())
    }

    pub fn backend(e: impl Into<anyhow::Error>) -> Self {
        Self::Backend(e.into())
    }
}

impl ResponseError for ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
