//! Failures as the client sees them: a status code and nothing else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::Display;
use shutter_gallery::error::ErrorKind as GalleryErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ApiError {
    #[display("unauthorized")]
    Unauthorized,
    #[display("bad request")]
    BadRequest,
    #[display("not found")]
    NotFound,
    #[display("conflict")]
    Conflict,
    #[display("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&GalleryErrorKind> for ApiError {
    fn from(kind: &GalleryErrorKind) -> Self {
        match kind {
            GalleryErrorKind::InvalidInput(_) => Self::BadRequest,
            GalleryErrorKind::NotFound(_) => Self::NotFound,
            GalleryErrorKind::ReloadInProgress => Self::Conflict,
            GalleryErrorKind::Storage | GalleryErrorKind::Store | GalleryErrorKind::Sidecar | GalleryErrorKind::Reload => {
                Self::Internal
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(GalleryErrorKind::InvalidInput("x".to_string()), StatusCode::BAD_REQUEST)]
    #[case(GalleryErrorKind::NotFound("x".to_string()), StatusCode::NOT_FOUND)]
    #[case(GalleryErrorKind::ReloadInProgress, StatusCode::CONFLICT)]
    #[case(GalleryErrorKind::Sidecar, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(GalleryErrorKind::Reload, StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_gallery_error_status(#[case] kind: GalleryErrorKind, #[case] status: StatusCode) {
        assert_eq!(ApiError::from(&kind).status(), status);
        assert_eq!(ApiError::from(&kind).into_response().status(), status);
    }
}
