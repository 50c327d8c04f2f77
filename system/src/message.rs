use crate::course_detail::{AttachmentMap, CourseDetail};
use crate::error::{ErrorKind, ErrorPayload};
use crate::types::{CourseId, CourseMode};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // inbound
    Heartbeat,
    CourseSelection,
    CourseModeSelection,
    ObjectManipulation,
    CourseExit,
    // outbound
    HeartbeatResponse,
    CourseSelected,
    CourseStart,
    CourseDetail,
    Error,
    #[serde(other)]
    Unknown,
}

/// The envelope every frame is wrapped in, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub data: Value,
}

impl Message {
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            code: 0,
            data,
        }
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn heartbeat_response() -> Self {
        Self::new(MessageType::HeartbeatResponse, json!("pong"))
    }

    pub fn course_selected(course_id: &str) -> Self {
        Self::new(MessageType::CourseSelected, json!({ "courseId": course_id }))
    }

    pub fn course_start(course_id: &str, mode: CourseMode) -> Self {
        Self::new(
            MessageType::CourseStart,
            json!({ "courseId": course_id, "mode": i32::from(mode) }),
        )
    }

    pub fn course_detail(detail: &CourseDetail) -> Result<Self, serde_json::Error> {
        Ok(Self::new(MessageType::CourseDetail, serde_json::to_value(detail)?))
    }

    /// Fans out the manipulation exactly as it was received.
    pub fn object_manipulation(data: Value) -> Self {
        Self::new(MessageType::ObjectManipulation, data)
    }

    pub fn course_exit() -> Self {
        Self::new(MessageType::CourseExit, json!("Course exited"))
    }

    pub fn error(kind: ErrorKind) -> Self {
        let payload = ErrorPayload::from(kind);
        Self {
            kind: MessageType::Error,
            code: payload.code,
            data: json!({ "code": payload.code, "message": payload.message }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSelection {
    pub course_id: CourseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModeSelection {
    pub course_id: CourseId,
    #[serde(deserialize_with = "whole_number")]
    pub mode: i64,
    /// Practice duration in seconds.
    #[serde(default, deserialize_with = "optional_whole_number")]
    pub duration: Option<u64>,
}

/// Largest float that still maps onto an integer exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Accepts `1` as well as `1.0`; clients built on float-only JSON numbers
/// send the latter.
fn whole_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let number = Number::deserialize(deserializer)?;
    let value = match number.as_i64() {
        Some(value) => Some(value),
        None => number
            .as_f64()
            .filter(|value| value.fract() == 0.0 && value.abs() <= MAX_EXACT_FLOAT)
            .map(|value| value as i64),
    };
    value
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a whole number, got {}", number)))
}

fn optional_whole_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    match Option::<Number>::deserialize(deserializer)? {
        Some(number) => whole_number(number).map(Some).map_err(de::Error::custom),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectManipulation {
    pub data_attachment: AttachmentMap,
}
