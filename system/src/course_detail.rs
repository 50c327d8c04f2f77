use crate::types::{CourseId, CourseMode, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Latest transform payload per object.
pub type AttachmentMap = BTreeMap<ObjectId, Value>;

/// What a newly joining viewer should see right now.
///
/// An empty `course_id` means no course is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    pub course_id: CourseId,
    pub mode: CourseMode,
    pub data_attachment: AttachmentMap,
}

impl CourseDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.course_id.is_empty()
    }

    /// Switching to another course drops the previous course's mode and
    /// attachments; re-selecting the active course keeps them.
    pub fn select_course(&mut self, course_id: &str) {
        if self.course_id != course_id {
            self.mode = CourseMode::default();
            self.data_attachment.clear();
            self.course_id = course_id.to_owned();
        }
    }

    pub fn start_course(&mut self, course_id: &str, mode: CourseMode) {
        self.select_course(course_id);
        self.mode = mode;
    }

    /// Last write wins per object id; objects absent from `update` are kept.
    pub fn merge_attachments<I>(&mut self, update: I)
    where
        I: IntoIterator<Item = (ObjectId, Value)>,
    {
        self.data_attachment.extend(update);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
