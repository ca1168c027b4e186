//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirestoreError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map an HTTP status to the matching error variant.
    pub fn from_http_status(status: u16, msg: String) -> Self {
        match status {
            401 => Self::Auth(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            412 => Self::PreconditionFailed(msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status this error maps back to, for metrics labeling.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Auth(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RequestFailed(_) | Self::InvalidResponse(_) => Some(500),
            Self::Network(_) | Self::Json(_) => None,
        }
    }

    /// True if the write was rejected because its updateTime precondition no
    /// longer matched (another writer got there first).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
            || matches!(
                self,
                Self::RequestFailed(msg) if msg.contains("FAILED_PRECONDITION")
            )
    }

    /// True if the document already existed on a create.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_round_trip() {
        for status in [401, 403, 404, 409, 412] {
            let err = FirestoreError::from_http_status(status, "boom".to_string());
            assert_eq!(err.http_status(), Some(status));
        }
        let err = FirestoreError::from_http_status(503, "down".to_string());
        assert_eq!(err.http_status(), Some(500));
    }

    #[test]
    fn test_precondition_detection() {
        assert!(FirestoreError::PreconditionFailed("x".into()).is_precondition_failed());
        assert!(
            FirestoreError::RequestFailed("code FAILED_PRECONDITION".into())
                .is_precondition_failed()
        );
        assert!(!FirestoreError::NotFound("x".into()).is_precondition_failed());
    }
}
