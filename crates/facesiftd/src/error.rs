use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facesift_scan::ArchiveError;
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by `/process`, each rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("No selfie uploaded")]
    MissingSelfie,

    #[error("No Google Drive link provided")]
    MissingDriveLink,

    #[error("No selfie selected")]
    EmptySelfieName,

    #[error("Invalid Google Drive folder URL")]
    InvalidFolderUrl,

    #[error("No face detected in selfie. Please upload a clear photo.")]
    NoFaceInSelfie,

    #[error("Could not extract folder ID from URL")]
    MissingFolderId,

    #[error("No images found in the folder or folder is private")]
    EmptyFolder,

    #[error("No photos found with your face")]
    NoMatches,

    #[error("Error creating ZIP file")]
    Archive(#[from] ArchiveError),

    #[error("File too large. Maximum size is {0}MB.")]
    PayloadTooLarge(usize),

    #[error("Malformed upload: {0}")]
    BadRequest(String),

    #[error("An error occurred while processing your request")]
    Engine(EngineError),
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MissingSelfie
            | ServerError::MissingDriveLink
            | ServerError::EmptySelfieName
            | ServerError::InvalidFolderUrl
            | ServerError::NoFaceInSelfie
            | ServerError::MissingFolderId
            | ServerError::EmptyFolder
            | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NoMatches => StatusCode::NOT_FOUND,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Archive(_) | ServerError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoFaceDetected => ServerError::NoFaceInSelfie,
            other => ServerError::Engine(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ServerError::Archive(e) => tracing::error!(error = %e, "archive build failed"),
            ServerError::Engine(e) => tracing::error!(error = %e, "engine failure"),
            other => tracing::info!(status = status.as_u16(), error = %other, "request rejected"),
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServerError::MissingSelfie.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServerError::NoMatches.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::PayloadTooLarge(16).status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ServerError::Engine(EngineError::ChannelClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_no_face_maps_to_client_error() {
        let err = ServerError::from(EngineError::NoFaceDetected);
        assert!(matches!(err, ServerError::NoFaceInSelfie));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_messages() {
        assert_eq!(ServerError::PayloadTooLarge(16).to_string(), "File too large. Maximum size is 16MB.");
        assert_eq!(
            ServerError::Archive(ArchiveError::TooManyEntries(70_000)).to_string(),
            "Error creating ZIP file"
        );
    }
}
