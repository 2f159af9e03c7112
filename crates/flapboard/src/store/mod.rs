//! Document store contract for the board.
//!
//! The board treats its database as a set of logical collections that can be
//! read, written and watched. [`DocumentStore`] is that contract;
//! [`SqliteStore`] implements it over a local `SQLite` file.
//!
//! Every successful write publishes a [`Change`] on the store's broadcast
//! channel. Live queries ([`crate::live`]) turn those events into fresh
//! snapshots, so no view needs a manual refresh after a write.

pub mod migrations;
pub mod schema;
mod sqlite;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::{
    AttendanceKey, AttendanceRecord, CourseId, EntryId, Leg, ScheduleDraft, ScheduleEntry,
    SecondaryCourse, Student, StudentId, TripField,
};

pub use sqlite::SqliteStore;

/// Logical collections of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Scheduled trips.
    Courses,
    /// Secondary course groups.
    SecondaryCourses,
    /// Students.
    Students,
    /// Per-trip attendance.
    Attendance,
}

impl Collection {
    /// Every collection.
    pub const ALL: [Self; 4] = [
        Self::Courses,
        Self::SecondaryCourses,
        Self::Students,
        Self::Attendance,
    ];

    /// Collection name as used in document paths and errors.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::SecondaryCourses => "secondary_courses",
            Self::Students => "students",
            Self::Attendance => "attendance",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notification that a collection was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    /// The collection that changed.
    pub collection: Collection,
}

/// Document counts per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Scheduled trips.
    pub courses: i64,
    /// Secondary course groups.
    pub secondary_courses: i64,
    /// Students.
    pub students: i64,
    /// Attendance records.
    pub attendance: i64,
}

/// Reads, writes and change notifications over the board's collections.
///
/// Writes are last-write-wins; multi-document operations that must be
/// all-or-nothing say so below.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    // === Schedule ===

    /// All scheduled trips, in insertion order.
    async fn list_schedule(&self) -> Result<Vec<ScheduleEntry>>;

    /// One trip by id.
    async fn get_schedule(&self, id: EntryId) -> Result<Option<ScheduleEntry>>;

    /// Insert a validated draft, stamping the creation time.
    async fn insert_schedule(&self, draft: &ScheduleDraft, owner_id: Option<&str>)
        -> Result<EntryId>;

    /// Write the draft's fields onto an existing trip. Optional fields that
    /// are `None` in the draft keep their stored value; fields named in
    /// `clear` are set to `None`. Fails with `NotFound` if `id` does not
    /// exist.
    async fn update_schedule(
        &self,
        id: EntryId,
        draft: &ScheduleDraft,
        clear: &[TripField],
    ) -> Result<()>;

    /// Delete a trip. Returns whether a document was removed.
    async fn delete_schedule(&self, id: EntryId) -> Result<bool>;

    // === Roster ===

    /// Create a course group.
    async fn insert_course(&self, name: &str) -> Result<CourseId>;

    /// Rename a course group.
    async fn rename_course(&self, id: CourseId, name: &str) -> Result<()>;

    /// Delete a course group and every student listed under it, atomically.
    /// Returns the number of students removed.
    async fn delete_course_cascade(&self, id: CourseId) -> Result<usize>;

    /// All course groups ordered by name.
    async fn list_courses(&self) -> Result<Vec<SecondaryCourse>>;

    /// Insert several students under one course in a single batch.
    async fn insert_students(&self, course_id: CourseId, names: &[String])
        -> Result<Vec<StudentId>>;

    /// Rename a student.
    async fn rename_student(&self, id: StudentId, name: &str) -> Result<()>;

    /// Delete a student. Returns whether a document was removed.
    async fn delete_student(&self, id: StudentId) -> Result<bool>;

    /// Students ordered by name, optionally limited to one course.
    async fn list_students(&self, course_id: Option<CourseId>) -> Result<Vec<Student>>;

    // === Attendance ===

    /// The record stored under `key`, if any.
    async fn get_attendance(&self, key: &AttendanceKey) -> Result<Option<AttendanceRecord>>;

    /// Write `record` under its key, replacing whatever was there.
    async fn put_attendance(&self, record: &AttendanceRecord) -> Result<()>;

    /// Mark `leg` present on an existing record, keeping the other leg.
    async fn set_attendance_leg(&self, key: &AttendanceKey, leg: Leg) -> Result<()>;

    /// Remove the `leg` field from an existing record.
    async fn clear_attendance_leg(&self, key: &AttendanceKey, leg: Leg) -> Result<()>;

    /// Delete the record under `key`. Returns whether one was removed.
    async fn delete_attendance(&self, key: &AttendanceKey) -> Result<bool>;

    /// All records for one trip on one date.
    async fn list_attendance(&self, date: NaiveDate, trip_id: EntryId)
        -> Result<Vec<AttendanceRecord>>;

    // === Changes ===

    /// Subscribe to write notifications.
    fn changes(&self) -> broadcast::Receiver<Change>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Courses.name(), "courses");
        assert_eq!(Collection::SecondaryCourses.to_string(), "secondary_courses");
        assert_eq!(Collection::Students.name(), "students");
        assert_eq!(Collection::Attendance.name(), "attendance");
    }

    #[test]
    fn test_store_stats_default() {
        let stats = StoreStats::default();
        assert_eq!(stats.courses, 0);
        assert_eq!(stats.attendance, 0);
    }
}
