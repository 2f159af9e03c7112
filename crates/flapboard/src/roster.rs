//! Secondary course groups and their student rosters.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::auth::AuthGate;
use crate::error::{Error, Result};
use crate::model::{CourseId, SecondaryCourse, Student, StudentId};
use crate::store::DocumentStore;

/// A course group with the students listed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseRoster {
    /// The group.
    pub course: SecondaryCourse,
    /// Its students, ordered by name.
    pub students: Vec<Student>,
}

impl CourseRoster {
    /// Pair each course with its students, keeping the course order.
    /// Students of unknown courses are left out.
    #[must_use]
    pub fn group(courses: Vec<SecondaryCourse>, students: Vec<Student>) -> Vec<Self> {
        let mut rosters: Vec<Self> = courses
            .into_iter()
            .map(|course| Self {
                course,
                students: Vec::new(),
            })
            .collect();
        for student in students {
            if let Some(roster) = rosters.iter_mut().find(|r| r.course.id == student.course_id) {
                roster.students.push(student);
            }
        }
        rosters
    }
}

/// Names from a one-name-per-line text, trimmed, blank lines dropped.
#[must_use]
pub fn parse_roster_text(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn required_name(field: &'static str, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation(field, "name is required"));
    }
    Ok(name.to_string())
}

/// Course and student create/rename/delete, plus bulk import.
#[derive(Debug, Clone)]
pub struct RosterService {
    store: Arc<dyn DocumentStore>,
    gate: AuthGate,
}

impl RosterService {
    /// Build a service writing to `store` behind `gate`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, gate: AuthGate) -> Self {
        Self { store, gate }
    }

    /// Create a course group.
    ///
    /// # Errors
    ///
    /// Validation, auth or store errors.
    pub async fn create_course(&self, name: &str) -> Result<CourseId> {
        let name = required_name("name", name)?;
        self.gate.check().await?;
        let id = self.store.insert_course(&name).await?;
        info!("Created course {} ({})", name, id);
        Ok(id)
    }

    /// Rename a course group.
    ///
    /// # Errors
    ///
    /// Validation, auth or store errors, `NotFound` for an unknown id.
    pub async fn rename_course(&self, id: CourseId, name: &str) -> Result<()> {
        let name = required_name("name", name)?;
        self.gate.check().await?;
        self.store.rename_course(id, &name).await?;
        info!("Renamed course {} to {}", id, name);
        Ok(())
    }

    /// Delete a course group and all of its students in one batch.
    /// Returns the number of students removed.
    ///
    /// # Errors
    ///
    /// Auth or store errors. On failure nothing is deleted.
    pub async fn delete_course(&self, id: CourseId) -> Result<usize> {
        self.gate.check().await?;
        let removed = self.store.delete_course_cascade(id).await?;
        info!("Deleted course {} with {} students", id, removed);
        Ok(removed)
    }

    /// Add one student to a course.
    ///
    /// # Errors
    ///
    /// Validation, auth or store errors, `NotFound` for an unknown course.
    pub async fn add_student(&self, course_id: CourseId, name: &str) -> Result<StudentId> {
        let name = required_name("name", name)?;
        self.gate.check().await?;
        let ids = self.store.insert_students(course_id, &[name]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::internal("student insert returned no id"))
    }

    /// Rename a student.
    ///
    /// # Errors
    ///
    /// Validation, auth or store errors, `NotFound` for an unknown id.
    pub async fn rename_student(&self, id: StudentId, name: &str) -> Result<()> {
        let name = required_name("name", name)?;
        self.gate.check().await?;
        self.store.rename_student(id, &name).await
    }

    /// Delete a student. Returns whether one was removed.
    ///
    /// # Errors
    ///
    /// Auth or store errors.
    pub async fn delete_student(&self, id: StudentId) -> Result<bool> {
        self.gate.check().await?;
        self.store.delete_student(id).await
    }

    /// Create one student per non-blank line of `text`, in a single batch.
    /// Returns how many were created.
    ///
    /// # Errors
    ///
    /// A validation error when `text` has no names; auth or store errors
    /// otherwise. On failure no student is created.
    pub async fn bulk_import_students(&self, course_id: CourseId, text: &str) -> Result<usize> {
        let names = parse_roster_text(text);
        if names.is_empty() {
            return Err(Error::validation("students", "no names to import"));
        }
        self.gate.check().await?;
        let ids = self.store.insert_students(course_id, &names).await?;
        info!("Imported {} students into course {}", ids.len(), course_id);
        Ok(ids.len())
    }
}
