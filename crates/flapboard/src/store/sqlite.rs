//! `SQLite` implementation of [`DocumentStore`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{migrations, Change, Collection, DocumentStore, StoreStats};
use crate::error::{Error, Result};
use crate::model::{
    parse_date, AttendanceKey, AttendanceRecord, CourseId, CourseName, EntryId, Leg,
    ScheduleDraft, ScheduleEntry, SecondaryCourse, Student, StudentId, TripField,
};

/// Default capacity of the change broadcast channel.
pub const DEFAULT_CHANGE_BUFFER: usize = 64;

const SCHEDULE_COLUMNS: &str =
    "id, level, course_name, time, day, place, carrier, direction, notes, owner_id, created_at";

const ATTENDANCE_COLUMNS: &str = "student_id, course_id, trip_id, date, outbound, return_leg";

/// Board database backed by a single `SQLite` connection.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Write notifications.
    changes: broadcast::Sender<Change>,
}

impl SqliteStore {
    /// Open or create a board database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening board database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Board database opened at {}", path.display());
        Ok(Self::from_connection(path, conn))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self::from_connection(PathBuf::from(":memory:"), conn))
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANGE_BUFFER);
        Self {
            path,
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Replace the change channel with one of the given capacity.
    ///
    /// Call before handing out subscriptions; existing receivers stay on the
    /// old channel.
    #[must_use]
    pub fn with_change_buffer(mut self, capacity: usize) -> Self {
        self.changes = broadcast::channel(capacity.max(1)).0;
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Document counts per collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(StoreStats {
            courses: count("courses")?,
            secondary_courses: count("secondary_courses")?,
            students: count("students")?,
            attendance: count("attendance")?,
        })
    }

    /// Publish changes committed by other processes sharing the database file.
    ///
    /// Polls `PRAGMA data_version` every `interval`; when another connection
    /// has committed, every collection is reported changed. The baseline is
    /// read before this returns, so any later foreign commit is reported. The
    /// task ends once the store is dropped.
    pub fn watch_external_writes(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut last_version = self.data_version().ok();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                match store.data_version() {
                    Ok(version) => {
                        if last_version.is_some_and(|last| last != version) {
                            debug!("Database changed by another connection");
                            for collection in Collection::ALL {
                                store.notify(collection);
                            }
                        }
                        last_version = Some(version);
                    }
                    Err(e) => warn!("Failed to poll database version: {}", e),
                }
            }
        })
    }

    fn data_version(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    /// Run `f` against the underlying connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("board database lock poisoned"))
    }

    fn notify(&self, collection: Collection) {
        debug!("Collection {} changed", collection);
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(Change { collection });
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<ScheduleEntry> {
        let course_name: String = row.get(2)?;
        let course_name: CourseName = serde_json::from_str(&course_name)
            .map_err(|e| conversion_failure(2, e.to_string()))?;
        Ok(ScheduleEntry {
            id: EntryId(row.get(0)?),
            level: parse_column(row, 1)?,
            course_name,
            time: row.get(3)?,
            day: parse_optional_column(row, 4)?,
            place: parse_optional_column(row, 5)?,
            carrier: parse_optional_column(row, 6)?,
            direction: parse_column(row, 7)?,
            notes: row.get(8)?,
            owner_id: row.get(9)?,
            created_at: parse_timestamp(row, 10)?,
        })
    }

    fn row_to_course(row: &Row) -> rusqlite::Result<SecondaryCourse> {
        Ok(SecondaryCourse {
            id: CourseId(row.get(0)?),
            name: row.get(1)?,
            created_at: parse_timestamp(row, 2)?,
        })
    }

    fn row_to_student(row: &Row) -> rusqlite::Result<Student> {
        Ok(Student {
            id: StudentId(row.get(0)?),
            course_id: CourseId(row.get(1)?),
            name: row.get(2)?,
            created_at: parse_timestamp(row, 3)?,
            legacy_outbound: row.get(4)?,
            legacy_return: row.get(5)?,
        })
    }

    fn row_to_attendance(row: &Row) -> rusqlite::Result<AttendanceRecord> {
        let date: String = row.get(3)?;
        Ok(AttendanceRecord {
            student_id: StudentId(row.get(0)?),
            course_id: CourseId(row.get(1)?),
            trip_id: EntryId(row.get(2)?),
            date: parse_date(&date).map_err(|e| conversion_failure(3, e.to_string()))?,
            outbound: row.get(4)?,
            return_leg: row.get(5)?,
        })
    }
}

fn conversion_failure(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_column<T: FromStr<Err = Error>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let value: String = row.get(idx)?;
    value
        .parse()
        .map_err(|e: Error| conversion_failure(idx, e.to_string()))
}

fn parse_optional_column<T: FromStr<Err = Error>>(
    row: &Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|v| v.parse().map_err(|e: Error| conversion_failure(idx, e.to_string())))
        .transpose()
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e.to_string()))
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn leg_column(leg: Leg) -> &'static str {
    match leg {
        Leg::Outbound => "outbound",
        Leg::Return => "return_leg",
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_schedule(&self) -> Result<Vec<ScheduleEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {SCHEDULE_COLUMNS} FROM courses ORDER BY id"))?;
        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    async fn get_schedule(&self, id: EntryId) -> Result<Option<ScheduleEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM courses WHERE id = ?1"),
                [id.0],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    async fn insert_schedule(
        &self,
        draft: &ScheduleDraft,
        owner_id: Option<&str>,
    ) -> Result<EntryId> {
        let course_name = serde_json::to_string(&draft.course_name)?;
        let id = {
            let conn = self.lock()?;
            conn.execute(
                r"
                INSERT INTO courses
                    (level, course_name, time, day, place, carrier, direction, notes, owner_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    draft.level.as_str(),
                    course_name,
                    draft.time,
                    draft.day.map(|d| d.as_str()),
                    draft.place.map(|p| p.as_str()),
                    draft.carrier.map(|c| c.as_str()),
                    draft.direction.as_str(),
                    draft.notes,
                    owner_id,
                    now(),
                ],
            )?;
            EntryId(conn.last_insert_rowid())
        };
        debug!("Inserted schedule entry {}", id);
        self.notify(Collection::Courses);
        Ok(id)
    }

    async fn update_schedule(
        &self,
        id: EntryId,
        draft: &ScheduleDraft,
        clear: &[TripField],
    ) -> Result<()> {
        let course_name = serde_json::to_string(&draft.course_name)?;
        let affected = self.lock()?.execute(
            r"
            UPDATE courses SET
                level = ?2, course_name = ?3, time = ?4,
                day = CASE WHEN ?10 THEN NULL ELSE COALESCE(?5, day) END,
                place = CASE WHEN ?11 THEN NULL ELSE COALESCE(?6, place) END,
                carrier = CASE WHEN ?12 THEN NULL ELSE COALESCE(?7, carrier) END,
                direction = ?8,
                notes = CASE WHEN ?13 THEN NULL ELSE COALESCE(?9, notes) END
            WHERE id = ?1
            ",
            params![
                id.0,
                draft.level.as_str(),
                course_name,
                draft.time,
                draft.day.map(|d| d.as_str()),
                draft.place.map(|p| p.as_str()),
                draft.carrier.map(|c| c.as_str()),
                draft.direction.as_str(),
                draft.notes,
                clear.contains(&TripField::Day),
                clear.contains(&TripField::Place),
                clear.contains(&TripField::Carrier),
                clear.contains(&TripField::Notes),
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found(Collection::Courses.name(), id));
        }
        debug!("Updated schedule entry {} (cleared {:?})", id, clear);
        self.notify(Collection::Courses);
        Ok(())
    }

    async fn delete_schedule(&self, id: EntryId) -> Result<bool> {
        let affected = self
            .lock()?
            .execute("DELETE FROM courses WHERE id = ?1", [id.0])?;
        if affected > 0 {
            self.notify(Collection::Courses);
        }
        Ok(affected > 0)
    }

    async fn insert_course(&self, name: &str) -> Result<CourseId> {
        let id = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO secondary_courses (name, created_at) VALUES (?1, ?2)",
                params![name, now()],
            )?;
            CourseId(conn.last_insert_rowid())
        };
        self.notify(Collection::SecondaryCourses);
        Ok(id)
    }

    async fn rename_course(&self, id: CourseId, name: &str) -> Result<()> {
        let affected = self.lock()?.execute(
            "UPDATE secondary_courses SET name = ?2 WHERE id = ?1",
            params![id.0, name],
        )?;
        if affected == 0 {
            return Err(Error::not_found(Collection::SecondaryCourses.name(), id));
        }
        self.notify(Collection::SecondaryCourses);
        Ok(())
    }

    async fn delete_course_cascade(&self, id: CourseId) -> Result<usize> {
        let removed = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let students = tx.execute("DELETE FROM students WHERE course_id = ?1", [id.0])?;
            let courses = tx.execute("DELETE FROM secondary_courses WHERE id = ?1", [id.0])?;
            if courses == 0 {
                // Dropping the transaction rolls back the student deletes.
                return Err(Error::not_found(Collection::SecondaryCourses.name(), id));
            }
            tx.commit()?;
            Ok(students)
        })?;
        debug!("Deleted course {} with {} students", id, removed);
        self.notify(Collection::SecondaryCourses);
        if removed > 0 {
            self.notify(Collection::Students);
        }
        Ok(removed)
    }

    async fn list_courses(&self) -> Result<Vec<SecondaryCourse>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM secondary_courses ORDER BY name COLLATE NOCASE, id",
        )?;
        let courses = stmt
            .query_map([], Self::row_to_course)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    async fn insert_students(
        &self,
        course_id: CourseId,
        names: &[String],
    ) -> Result<Vec<StudentId>> {
        let ids = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM secondary_courses WHERE id = ?1",
                    [course_id.0],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(Error::not_found(
                    Collection::SecondaryCourses.name(),
                    course_id,
                ));
            }
            let created_at = now();
            let mut ids = Vec::with_capacity(names.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO students (course_id, name, created_at) VALUES (?1, ?2, ?3)",
                )?;
                for name in names {
                    stmt.execute(params![course_id.0, name, created_at])?;
                    ids.push(StudentId(tx.last_insert_rowid()));
                }
            }
            tx.commit()?;
            Ok(ids)
        })?;
        debug!("Inserted {} students into course {}", ids.len(), course_id);
        if !ids.is_empty() {
            self.notify(Collection::Students);
        }
        Ok(ids)
    }

    async fn rename_student(&self, id: StudentId, name: &str) -> Result<()> {
        let affected = self.lock()?.execute(
            "UPDATE students SET name = ?2 WHERE id = ?1",
            params![id.0, name],
        )?;
        if affected == 0 {
            return Err(Error::not_found(Collection::Students.name(), id));
        }
        self.notify(Collection::Students);
        Ok(())
    }

    async fn delete_student(&self, id: StudentId) -> Result<bool> {
        let affected = self
            .lock()?
            .execute("DELETE FROM students WHERE id = ?1", [id.0])?;
        if affected > 0 {
            self.notify(Collection::Students);
        }
        Ok(affected > 0)
    }

    async fn list_students(&self, course_id: Option<CourseId>) -> Result<Vec<Student>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, course_id, name, created_at, va, vuelve FROM students
            WHERE ?1 IS NULL OR course_id = ?1
            ORDER BY name COLLATE NOCASE, id
            ",
        )?;
        let students = stmt
            .query_map([course_id.map(|c| c.0)], Self::row_to_student)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(students)
    }

    async fn get_attendance(&self, key: &AttendanceKey) -> Result<Option<AttendanceRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE key = ?1"),
                [key.to_string()],
                Self::row_to_attendance,
            )
            .optional()?;
        Ok(record)
    }

    async fn put_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let key = record.key();
        self.lock()?.execute(
            r"
            INSERT OR REPLACE INTO attendance
                (key, student_id, course_id, trip_id, date, outbound, return_leg)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                key.to_string(),
                record.student_id.0,
                record.course_id.0,
                record.trip_id.0,
                record.date.format("%Y-%m-%d").to_string(),
                record.has(Leg::Outbound).then_some(true),
                record.has(Leg::Return).then_some(true),
            ],
        )?;
        debug!("Wrote attendance {}", key);
        self.notify(Collection::Attendance);
        Ok(())
    }

    async fn set_attendance_leg(&self, key: &AttendanceKey, leg: Leg) -> Result<()> {
        let affected = self.lock()?.execute(
            &format!("UPDATE attendance SET {} = 1 WHERE key = ?1", leg_column(leg)),
            [key.to_string()],
        )?;
        if affected == 0 {
            return Err(Error::not_found(Collection::Attendance.name(), key));
        }
        self.notify(Collection::Attendance);
        Ok(())
    }

    async fn clear_attendance_leg(&self, key: &AttendanceKey, leg: Leg) -> Result<()> {
        let emptied = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let affected = tx.execute(
                &format!("UPDATE attendance SET {} = NULL WHERE key = ?1", leg_column(leg)),
                [key.to_string()],
            )?;
            if affected == 0 {
                return Err(Error::not_found(Collection::Attendance.name(), key));
            }
            // A record with no leg left must not exist.
            let emptied = tx.execute(
                "DELETE FROM attendance
                 WHERE key = ?1 AND outbound IS NULL AND return_leg IS NULL",
                [key.to_string()],
            )?;
            tx.commit()?;
            Ok(emptied > 0)
        })?;
        if emptied {
            debug!("Attendance {} lost its last leg, removed", key);
        }
        self.notify(Collection::Attendance);
        Ok(())
    }

    async fn delete_attendance(&self, key: &AttendanceKey) -> Result<bool> {
        let affected = self
            .lock()?
            .execute("DELETE FROM attendance WHERE key = ?1", [key.to_string()])?;
        if affected > 0 {
            self.notify(Collection::Attendance);
        }
        Ok(affected > 0)
    }

    async fn list_attendance(
        &self,
        date: NaiveDate,
        trip_id: EntryId,
    ) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE date = ?1 AND trip_id = ?2 ORDER BY student_id"
        ))?;
        let records = stmt
            .query_map(
                params![date.format("%Y-%m-%d").to_string(), trip_id.0],
                Self::row_to_attendance,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Carrier, Day, Direction, Level, Place};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    fn draft(course: &str, time: &str) -> ScheduleDraft {
        ScheduleDraft {
            id: None,
            level: Level::Secundaria,
            course_name: CourseName::from(course),
            time: time.to_string(),
            day: Some(Day::Thursday),
            place: Some(Place::Farm),
            carrier: Some(Carrier::Bili),
            direction: Direction::Departure,
            notes: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_schedule() {
        let store = create_test_store();
        let id = store.insert_schedule(&draft("3A, 3B", "14:10"), None).await.unwrap();

        let entry = store.get_schedule(id).await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.course_name.names(), vec!["3A", "3B"]);
        assert_eq!(entry.day, Some(Day::Thursday));
        assert_eq!(entry.carrier, Some(Carrier::Bili));
        assert_eq!(entry.direction, Direction::Departure);
    }

    #[tokio::test]
    async fn test_get_schedule_nonexistent() {
        let store = create_test_store();
        assert!(store.get_schedule(EntryId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_schedule_overwrites_in_place() {
        let store = create_test_store();
        let id = store.insert_schedule(&draft("3A", "14:10"), Some("u1")).await.unwrap();
        let before = store.get_schedule(id).await.unwrap().unwrap();

        let mut edit = draft("4A", "15:00");
        edit.carrier = Some(Carrier::Cri);
        edit.direction = Direction::Arrival;
        store.update_schedule(id, &edit, &[]).await.unwrap();

        let after = store.get_schedule(id).await.unwrap().unwrap();
        assert_eq!(after.course_name.to_string(), "4A");
        assert_eq!(after.time, "15:00");
        assert_eq!(after.carrier, Some(Carrier::Cri));
        assert_eq!(after.direction, Direction::Arrival);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.owner_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_update_schedule_keeps_optionals_missing_from_the_draft() {
        let store = create_test_store();
        let mut first = draft("3A", "14:10");
        first.place = Some(Place::School);
        first.carrier = Some(Carrier::Cri);
        first.notes = Some("Puerta lateral".into());
        let id = store.insert_schedule(&first, None).await.unwrap();

        let time_only = ScheduleDraft {
            day: None,
            place: None,
            carrier: None,
            notes: None,
            ..draft("3A", "14:40")
        };
        store.update_schedule(id, &time_only, &[]).await.unwrap();

        let after = store.get_schedule(id).await.unwrap().unwrap();
        assert_eq!(after.time, "14:40");
        assert_eq!(after.day, Some(Day::Thursday));
        assert_eq!(after.place, Some(Place::School));
        assert_eq!(after.carrier, Some(Carrier::Cri));
        assert_eq!(after.notes.as_deref(), Some("Puerta lateral"));
    }

    #[tokio::test]
    async fn test_update_schedule_clears_named_fields() {
        let store = create_test_store();
        let mut first = draft("3A", "14:10");
        first.notes = Some("Puerta lateral".into());
        let id = store.insert_schedule(&first, None).await.unwrap();

        // A value in the draft does not override an explicit clear.
        store
            .update_schedule(id, &first, &[TripField::Notes, TripField::Carrier])
            .await
            .unwrap();

        let after = store.get_schedule(id).await.unwrap().unwrap();
        assert_eq!(after.notes, None);
        assert_eq!(after.carrier, None);
        assert_eq!(after.day, Some(Day::Thursday));
        assert_eq!(after.place, Some(Place::Farm));
    }

    #[tokio::test]
    async fn test_update_schedule_missing_is_not_found() {
        let store = create_test_store();
        let err = store
            .update_schedule(EntryId(5), &draft("3A", "08:00"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_schedule() {
        let store = create_test_store();
        let id = store.insert_schedule(&draft("3A", "08:00"), None).await.unwrap();
        assert!(store.delete_schedule(id).await.unwrap());
        assert!(!store.delete_schedule(id).await.unwrap());
        assert!(store.list_schedule().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let store = create_test_store();
        let mut rx = store.changes();
        store.insert_schedule(&draft("3A", "08:00"), None).await.unwrap();
        store.insert_course("5C").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().collection, Collection::Courses);
        assert_eq!(rx.recv().await.unwrap().collection, Collection::SecondaryCourses);
    }

    #[tokio::test]
    async fn test_courses_ordered_by_name() {
        let store = create_test_store();
        store.insert_course("5B").await.unwrap();
        store.insert_course("3A").await.unwrap();
        let names: Vec<_> = store
            .list_courses()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["3A", "5B"]);
    }

    #[tokio::test]
    async fn test_insert_students_into_missing_course_fails() {
        let store = create_test_store();
        let err = store
            .insert_students(CourseId(3), &["Ana".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(store.stats().unwrap().students, 0);
    }

    #[tokio::test]
    async fn test_delete_course_cascade_missing_rolls_back() {
        let store = create_test_store();
        let err = store.delete_course_cascade(CourseId(8)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_students_by_course() {
        let store = create_test_store();
        let a = store.insert_course("3A").await.unwrap();
        let b = store.insert_course("3B").await.unwrap();
        store
            .insert_students(a, &["Zoe".to_string(), "Ana".to_string()])
            .await
            .unwrap();
        store.insert_students(b, &["Luis".to_string()]).await.unwrap();

        let in_a: Vec<_> = store
            .list_students(Some(a))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(in_a, vec!["Ana", "Zoe"]);
        assert_eq!(store.list_students(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_attendance_put_get_and_legs() {
        let store = create_test_store();
        let key = AttendanceKey::new(date(), EntryId(1), StudentId(2));
        let record = AttendanceRecord::with_leg(key, CourseId(3), Leg::Outbound);
        store.put_attendance(&record).await.unwrap();

        store.set_attendance_leg(&key, Leg::Return).await.unwrap();
        let stored = store.get_attendance(&key).await.unwrap().unwrap();
        assert!(stored.has(Leg::Outbound) && stored.has(Leg::Return));

        store.clear_attendance_leg(&key, Leg::Outbound).await.unwrap();
        let stored = store.get_attendance(&key).await.unwrap().unwrap();
        assert_eq!(stored.outbound, None);
        assert_eq!(stored.return_leg, Some(true));

        assert!(store.delete_attendance(&key).await.unwrap());
        assert!(store.get_attendance(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clearing_the_only_leg_removes_the_record() {
        let store = create_test_store();
        let key = AttendanceKey::new(date(), EntryId(1), StudentId(2));
        let record = AttendanceRecord::with_leg(key, CourseId(3), Leg::Return);
        store.put_attendance(&record).await.unwrap();

        store.clear_attendance_leg(&key, Leg::Return).await.unwrap();
        assert!(store.get_attendance(&key).await.unwrap().is_none());
        assert!(store.list_attendance(date(), EntryId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attendance_leg_update_on_missing_record() {
        let store = create_test_store();
        let key = AttendanceKey::new(date(), EntryId(1), StudentId(2));
        assert!(store.set_attendance_leg(&key, Leg::Return).await.is_err());
        assert!(store.clear_attendance_leg(&key, Leg::Return).await.is_err());
    }

    #[tokio::test]
    async fn test_list_attendance_for_trip() {
        let store = create_test_store();
        for (trip, student) in [(1, 1), (1, 2), (2, 1)] {
            let key = AttendanceKey::new(date(), EntryId(trip), StudentId(student));
            store
                .put_attendance(&AttendanceRecord::with_leg(key, CourseId(1), Leg::Outbound))
                .await
                .unwrap();
        }
        let sheet = store.list_attendance(date(), EntryId(1)).await.unwrap();
        assert_eq!(sheet.len(), 2);
        assert!(sheet.iter().all(|r| r.trip_id == EntryId(1)));
    }

    #[test]
    fn test_open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("board.db");

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.path(), db_path);
        assert!(db_path.exists());
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_in_memory_path() {
        let store = create_test_store();
        assert_eq!(store.path(), Path::new(":memory:"));
    }

    #[tokio::test]
    async fn test_external_writes_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.db");
        let watched = Arc::new(SqliteStore::open(&path).unwrap());
        let mut changes = watched.changes();
        let poller = watched.watch_external_writes(Duration::from_millis(10));

        // Written before the poller task has run once.
        let other = SqliteStore::open(&path).unwrap();
        other.insert_course("7A").await.unwrap();

        let change = tokio::time::timeout(Duration::from_secs(2), changes.recv())
            .await
            .expect("no change published")
            .unwrap();
        assert!(Collection::ALL.contains(&change.collection));
        assert_eq!(watched.list_courses().await.unwrap().len(), 1);

        drop(watched);
        tokio::time::timeout(Duration::from_secs(2), poller)
            .await
            .expect("poller did not stop")
            .unwrap();
    }
}
