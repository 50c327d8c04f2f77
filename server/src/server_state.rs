use crate::course::CourseRegistry;
use crate::session::SessionRegistry;
use classroom_system::CourseDetail;
use tokio::sync::RwLock;

/// State shared by the hub and every connection's handlers.
///
/// Lock order: a connection's session slot, then `courses`, then `sessions`,
/// then `course_detail`. No lock is held while waiting on the hub.
pub struct ServerState {
    pub courses: CourseRegistry,
    pub sessions: SessionRegistry,
    pub course_detail: RwLock<CourseDetail>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            courses: CourseRegistry::new(),
            sessions: SessionRegistry::new(),
            course_detail: RwLock::new(CourseDetail::new()),
        }
    }

    /// A copy of the snapshot, if a course is active.
    pub async fn active_course_detail(&self) -> Option<CourseDetail> {
        let detail = self.course_detail.read().await;
        if detail.is_active() {
            Some(detail.clone())
        } else {
            None
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
