use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type ConnectionId = uuid::Uuid;
pub type SessionId = uuid::Uuid;
pub type CourseId = String;
pub type ObjectId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Teacher,
    Student,
    Observer,
}

/// An authenticated peer. Fixed for the lifetime of its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
}

/// Encoded on the wire as an integer: 0 for teaching, 1 for practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i64")]
pub enum CourseMode {
    #[default]
    TeachingMode,
    PracticeMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown course mode {0}")]
pub struct UnknownCourseMode(pub i64);

impl TryFrom<i64> for CourseMode {
    type Error = UnknownCourseMode;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::TeachingMode),
            1 => Ok(Self::PracticeMode),
            other => Err(UnknownCourseMode(other)),
        }
    }
}

impl From<CourseMode> for i32 {
    fn from(mode: CourseMode) -> Self {
        match mode {
            CourseMode::TeachingMode => 0,
            CourseMode::PracticeMode => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub description: String,
    pub mode: CourseMode,
    /// Only meaningful in `PracticeMode`.
    pub duration: Duration,
}

impl Course {
    pub fn new(id: impl Into<CourseId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            mode: CourseMode::default(),
            duration: Duration::ZERO,
        }
    }
}
