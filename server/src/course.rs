use classroom_system::{Course, CourseId, CourseMode};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Courses by id. Entries stay until explicitly deleted.
pub struct CourseRegistry {
    courses: RwLock<HashMap<CourseId, Course>>,
}

impl CourseRegistry {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `course`, replacing any course with the same id.
    pub async fn create(&self, course: Course) -> Course {
        let mut courses = self.courses.write().await;
        log::info!("Created course {} ({:?})", course.id, course.name);
        courses.insert(course.id.clone(), course.clone());
        course
    }

    pub async fn get_or_create(&self, course_id: &str) -> Course {
        let mut courses = self.courses.write().await;
        courses
            .entry(course_id.to_owned())
            .or_insert_with(|| {
                log::info!("Created course {}", course_id);
                Course::new(course_id)
            })
            .clone()
    }

    pub async fn get(&self, course_id: &str) -> Option<Course> {
        self.courses.read().await.get(course_id).cloned()
    }

    /// Returns the updated course, or `None` if it is not registered.
    pub async fn update(
        &self,
        course_id: &str,
        mode: CourseMode,
        duration: Duration,
    ) -> Option<Course> {
        let mut courses = self.courses.write().await;
        let course = courses.get_mut(course_id)?;
        course.mode = mode;
        course.duration = match mode {
            CourseMode::PracticeMode => duration,
            CourseMode::TeachingMode => Duration::ZERO,
        };
        log::info!("Updated course {} to {:?}", course_id, mode);
        Some(course.clone())
    }

    pub async fn delete(&self, course_id: &str) -> bool {
        let removed = self.courses.write().await.remove(course_id).is_some();
        if removed {
            log::info!("Deleted course {}", course_id);
        }
        removed
    }

    pub async fn list(&self) -> Vec<Course> {
        let mut courses: Vec<Course> = self.courses.read().await.values().cloned().collect();
        courses.sort_by(|a, b| a.id.cmp(&b.id));
        courses
    }
}

impl Default for CourseRegistry {
    fn default() -> Self {
        Self::new()
    }
}
