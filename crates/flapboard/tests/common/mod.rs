//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{broadcast, Barrier};

use flapboard::model::{
    AttendanceKey, AttendanceRecord, CourseId, CourseName, Day, Direction, EntryId, Leg, Level,
    ScheduleDraft, ScheduleEntry, SecondaryCourse, Student, StudentId, TripField,
};
use flapboard::store::Change;
use flapboard::{DocumentStore, Error, Result, SqliteStore};

/// Wraps an in-memory store and can be switched offline, or made to hold
/// attendance reads until two of them are in flight.
#[derive(Debug)]
pub struct FlakyStore {
    inner: SqliteStore,
    offline: AtomicBool,
    read_barrier: Option<Barrier>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            offline: AtomicBool::new(false),
            read_barrier: None,
        }
    }

    /// Every attendance read waits until a second one arrives.
    pub fn with_paired_reads() -> Self {
        Self {
            read_barrier: Some(Barrier::new(2)),
            ..Self::new()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("network unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn list_schedule(&self) -> Result<Vec<ScheduleEntry>> {
        self.check()?;
        self.inner.list_schedule().await
    }

    async fn get_schedule(&self, id: EntryId) -> Result<Option<ScheduleEntry>> {
        self.check()?;
        self.inner.get_schedule(id).await
    }

    async fn insert_schedule(
        &self,
        draft: &ScheduleDraft,
        owner_id: Option<&str>,
    ) -> Result<EntryId> {
        self.check()?;
        self.inner.insert_schedule(draft, owner_id).await
    }

    async fn update_schedule(
        &self,
        id: EntryId,
        draft: &ScheduleDraft,
        clear: &[TripField],
    ) -> Result<()> {
        self.check()?;
        self.inner.update_schedule(id, draft, clear).await
    }

    async fn delete_schedule(&self, id: EntryId) -> Result<bool> {
        self.check()?;
        self.inner.delete_schedule(id).await
    }

    async fn insert_course(&self, name: &str) -> Result<CourseId> {
        self.check()?;
        self.inner.insert_course(name).await
    }

    async fn rename_course(&self, id: CourseId, name: &str) -> Result<()> {
        self.check()?;
        self.inner.rename_course(id, name).await
    }

    async fn delete_course_cascade(&self, id: CourseId) -> Result<usize> {
        self.check()?;
        self.inner.delete_course_cascade(id).await
    }

    async fn list_courses(&self) -> Result<Vec<SecondaryCourse>> {
        self.check()?;
        self.inner.list_courses().await
    }

    async fn insert_students(
        &self,
        course_id: CourseId,
        names: &[String],
    ) -> Result<Vec<StudentId>> {
        self.check()?;
        self.inner.insert_students(course_id, names).await
    }

    async fn rename_student(&self, id: StudentId, name: &str) -> Result<()> {
        self.check()?;
        self.inner.rename_student(id, name).await
    }

    async fn delete_student(&self, id: StudentId) -> Result<bool> {
        self.check()?;
        self.inner.delete_student(id).await
    }

    async fn list_students(&self, course_id: Option<CourseId>) -> Result<Vec<Student>> {
        self.check()?;
        self.inner.list_students(course_id).await
    }

    async fn get_attendance(&self, key: &AttendanceKey) -> Result<Option<AttendanceRecord>> {
        self.check()?;
        let record = self.inner.get_attendance(key).await?;
        if let Some(barrier) = &self.read_barrier {
            barrier.wait().await;
        }
        Ok(record)
    }

    async fn put_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        self.check()?;
        self.inner.put_attendance(record).await
    }

    async fn set_attendance_leg(&self, key: &AttendanceKey, leg: Leg) -> Result<()> {
        self.check()?;
        self.inner.set_attendance_leg(key, leg).await
    }

    async fn clear_attendance_leg(&self, key: &AttendanceKey, leg: Leg) -> Result<()> {
        self.check()?;
        self.inner.clear_attendance_leg(key, leg).await
    }

    async fn delete_attendance(&self, key: &AttendanceKey) -> Result<bool> {
        self.check()?;
        self.inner.delete_attendance(key).await
    }

    async fn list_attendance(
        &self,
        date: NaiveDate,
        trip_id: EntryId,
    ) -> Result<Vec<AttendanceRecord>> {
        self.check()?;
        self.inner.list_attendance(date, trip_id).await
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.changes()
    }
}

pub fn memory_store() -> Arc<dyn DocumentStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

pub fn draft(level: Level, course: &str, time: &str, day: Day) -> ScheduleDraft {
    ScheduleDraft {
        id: None,
        level,
        course_name: CourseName::from(course),
        time: time.to_string(),
        day: Some(day),
        place: None,
        carrier: None,
        direction: Direction::Arrival,
        notes: None,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
