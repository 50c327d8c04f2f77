use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported back to the connection that caused them. Never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Invalid data")]
    InvalidData,
    #[error("Course not found")]
    CourseNotFound,
    #[error("Internal server error")]
    InternalError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 3] = [
        ErrorKind::InvalidData,
        ErrorKind::CourseNotFound,
        ErrorKind::InternalError,
    ];

    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidData => 1001,
            ErrorKind::CourseNotFound => 1002,
            ErrorKind::InternalError => 2000,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }
}

/// Human-readable text for an error code, as sent in error payloads.
pub fn error_message(code: i32) -> String {
    ErrorKind::from_code(code)
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "Unknown error".to_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
}

impl From<ErrorKind> for ErrorPayload {
    fn from(kind: ErrorKind) -> Self {
        Self {
            code: kind.code(),
            message: kind.to_string(),
        }
    }
}
