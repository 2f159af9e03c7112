//! Live queries over a [`DocumentStore`].
//!
//! A subscription yields the query's full result once, then again after
//! every write to a collection the query watches. Each snapshot replaces the
//! previous one wholesale; callers never diff.
//!
//! ```no_run
//! # async fn demo(store: std::sync::Arc<dyn flapboard::store::DocumentStore>) {
//! use flapboard::live::{subscribe, ScheduleQuery};
//!
//! let mut sub = subscribe(&store, ScheduleQuery::default());
//! while let Some(snapshot) = sub.next().await {
//!     match snapshot {
//!         Ok(entries) => println!("{} trips", entries.len()),
//!         Err(e) => eprintln!("refresh failed: {e}"),
//!     }
//! }
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::filter::sort_entries;
use crate::model::{AttendanceRecord, CourseId, EntryId, Level, ScheduleEntry, SecondaryCourse, Student};
use crate::roster::CourseRoster;
use crate::store::{Change, Collection, DocumentStore};

/// A query that can be re-run whenever its collections change.
#[async_trait]
pub trait LiveQuery: Send + Sync + fmt::Debug + 'static {
    /// Snapshot element type.
    type Item: Send + 'static;

    /// Whether a write to `collection` can change this query's result.
    fn watches(&self, collection: Collection) -> bool;

    /// Run the query once.
    async fn fetch(&self, store: &dyn DocumentStore) -> Result<Vec<Self::Item>>;
}

/// Scheduled trips ordered by day then time, optionally for one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleQuery {
    /// Restrict to one level.
    pub level: Option<Level>,
}

#[async_trait]
impl LiveQuery for ScheduleQuery {
    type Item = ScheduleEntry;

    fn watches(&self, collection: Collection) -> bool {
        collection == Collection::Courses
    }

    async fn fetch(&self, store: &dyn DocumentStore) -> Result<Vec<ScheduleEntry>> {
        let mut entries = store.list_schedule().await?;
        if let Some(level) = self.level {
            entries.retain(|e| e.level == level);
        }
        sort_entries(&mut entries);
        Ok(entries)
    }
}

/// Secondary course groups ordered by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CourseQuery;

#[async_trait]
impl LiveQuery for CourseQuery {
    type Item = SecondaryCourse;

    fn watches(&self, collection: Collection) -> bool {
        collection == Collection::SecondaryCourses
    }

    async fn fetch(&self, store: &dyn DocumentStore) -> Result<Vec<SecondaryCourse>> {
        store.list_courses().await
    }
}

/// Students ordered by name, optionally for one course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudentQuery {
    /// Restrict to one course.
    pub course_id: Option<CourseId>,
}

#[async_trait]
impl LiveQuery for StudentQuery {
    type Item = Student;

    fn watches(&self, collection: Collection) -> bool {
        collection == Collection::Students
    }

    async fn fetch(&self, store: &dyn DocumentStore) -> Result<Vec<Student>> {
        store.list_students(self.course_id).await
    }
}

/// Every course group with its students, as the attendance page lists them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterQuery;

#[async_trait]
impl LiveQuery for RosterQuery {
    type Item = CourseRoster;

    fn watches(&self, collection: Collection) -> bool {
        matches!(collection, Collection::SecondaryCourses | Collection::Students)
    }

    async fn fetch(&self, store: &dyn DocumentStore) -> Result<Vec<CourseRoster>> {
        let courses = store.list_courses().await?;
        let students = store.list_students(None).await?;
        Ok(CourseRoster::group(courses, students))
    }
}

/// Attendance records for one trip on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceQuery {
    /// Trip date.
    pub date: NaiveDate,
    /// The trip.
    pub trip_id: EntryId,
}

#[async_trait]
impl LiveQuery for AttendanceQuery {
    type Item = AttendanceRecord;

    fn watches(&self, collection: Collection) -> bool {
        collection == Collection::Attendance
    }

    async fn fetch(&self, store: &dyn DocumentStore) -> Result<Vec<AttendanceRecord>> {
        store.list_attendance(self.date, self.trip_id).await
    }
}

/// A live query bound to a store.
///
/// Holds only a weak reference to the store: once the store is dropped the
/// subscription ends.
pub struct Subscription<Q: LiveQuery> {
    store: Weak<dyn DocumentStore>,
    query: Q,
    changes: broadcast::Receiver<Change>,
    primed: bool,
}

impl<Q: LiveQuery> fmt::Debug for Subscription<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("query", &self.query)
            .field("primed", &self.primed)
            .finish_non_exhaustive()
    }
}

/// Subscribe to `query` on `store`.
///
/// The change feed is joined before the first fetch, so no write between
/// the two is missed.
pub fn subscribe<Q: LiveQuery>(store: &Arc<dyn DocumentStore>, query: Q) -> Subscription<Q> {
    Subscription {
        changes: store.changes(),
        store: Arc::downgrade(store),
        query,
        primed: false,
    }
}

impl<Q: LiveQuery> Subscription<Q> {
    /// The query this subscription runs.
    #[must_use]
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Wait for the next full snapshot.
    ///
    /// The first call returns immediately with the current result. Later
    /// calls wait for a relevant write; a burst of writes yields one
    /// snapshot. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Result<Vec<Q::Item>>> {
        if self.primed {
            loop {
                match self.changes.recv().await {
                    Ok(change) if self.query.watches(change.collection) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Live query lagged by {} changes, refetching", skipped);
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
            self.drain_pending();
        }
        self.primed = true;

        let store = self.store.upgrade()?;
        Some(self.query.fetch(store.as_ref()).await)
    }

    /// Stop listening. Dropping the subscription does the same.
    pub fn unsubscribe(self) {}

    fn drain_pending(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// Handle for a callback registered with [`observe`]. Dropping it stops the
/// callback.
#[derive(Debug)]
pub struct Observer {
    task: JoinHandle<()>,
}

impl Observer {
    /// Stop delivering snapshots.
    pub fn unsubscribe(self) {}

    /// Whether the observer task has ended (store dropped).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `on_snapshot` with every snapshot of `query` on a background task.
///
/// Failed refreshes are logged and skipped; the previous snapshot stays in
/// place on the caller's side.
pub fn observe<Q, F>(store: &Arc<dyn DocumentStore>, query: Q, mut on_snapshot: F) -> Observer
where
    Q: LiveQuery,
    F: FnMut(Vec<Q::Item>) + Send + 'static,
{
    let mut subscription = subscribe(store, query);
    let task = tokio::spawn(async move {
        while let Some(snapshot) = subscription.next().await {
            match snapshot {
                Ok(items) => on_snapshot(items),
                Err(e) => warn!("Live query {:?} failed: {}", subscription.query(), e),
            }
        }
    });
    Observer { task }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{CourseName, Day, Direction, ScheduleDraft};
    use crate::store::SqliteStore;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    fn draft(level: Level, day: Day, time: &str) -> ScheduleDraft {
        ScheduleDraft {
            id: None,
            level,
            course_name: CourseName::from("2A"),
            time: time.to_string(),
            day: Some(day),
            place: None,
            carrier: None,
            direction: Direction::Arrival,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_first_snapshot_is_immediate() {
        let store = store();
        store
            .insert_schedule(&draft(Level::Primaria, Day::Monday, "08:00"), None)
            .await
            .unwrap();
        let mut sub = subscribe(&store, ScheduleQuery::default());
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_write_produces_new_snapshot() {
        let store = store();
        let mut sub = subscribe(&store, ScheduleQuery::default());
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store
            .insert_schedule(&draft(Level::Primaria, Day::Monday, "08:00"), None)
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_sorted_and_level_filtered() {
        let store = store();
        store
            .insert_schedule(&draft(Level::Jardin, Day::Tuesday, "07:00"), None)
            .await
            .unwrap();
        store
            .insert_schedule(&draft(Level::Jardin, Day::Monday, "16:30"), None)
            .await
            .unwrap();
        store
            .insert_schedule(&draft(Level::Primaria, Day::Monday, "06:00"), None)
            .await
            .unwrap();

        let mut sub = subscribe(
            &store,
            ScheduleQuery {
                level: Some(Level::Jardin),
            },
        );
        let snapshot = sub.next().await.unwrap().unwrap();
        let order: Vec<_> = snapshot.iter().map(|e| (e.day, e.time.as_str())).collect();
        assert_eq!(
            order,
            vec![(Some(Day::Monday), "16:30"), (Some(Day::Tuesday), "07:00")]
        );
    }

    #[tokio::test]
    async fn test_unrelated_writes_are_ignored() {
        let store = store();
        let mut sub = subscribe(&store, CourseQuery);
        sub.next().await.unwrap().unwrap();

        store
            .insert_schedule(&draft(Level::Primaria, Day::Monday, "08:00"), None)
            .await
            .unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err(), "schedule writes must not refresh courses");
    }

    #[tokio::test]
    async fn test_burst_of_writes_coalesces() {
        let store = store();
        let mut sub = subscribe(&store, CourseQuery);
        sub.next().await.unwrap().unwrap();

        for name in ["1A", "1B", "1C"] {
            store.insert_course(name).await.unwrap();
        }
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 3);
        let pending = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_roster_query_watches_both_collections() {
        let store = store();
        let mut sub = subscribe(&store, RosterQuery);
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        let course = store.insert_course("4A").await.unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot[0].students.len(), 0);

        store
            .insert_students(course, &["Ana".to_string()])
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot[0].students.len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_store_dropped() {
        let store = store();
        let mut sub = subscribe(&store, CourseQuery);
        sub.next().await.unwrap().unwrap();
        drop(store);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_observe_delivers_snapshots() {
        let store = store();
        let (tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
        let observer = observe(&store, CourseQuery, move |courses| {
            let _ = tx.send(courses.len());
        });

        assert_eq!(seen.recv().await, Some(0));
        store.insert_course("6A").await.unwrap();
        assert_eq!(seen.recv().await, Some(1));

        observer.unsubscribe();
        store.insert_course("6B").await.unwrap();
        // The aborted task drops the callback, closing the channel with
        // nothing further sent.
        assert_eq!(seen.recv().await, None);
    }
}
