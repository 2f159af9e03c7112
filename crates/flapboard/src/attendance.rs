//! Per-trip attendance toggles.
//!
//! A record exists for a (date, trip, student) key exactly when at least one
//! leg is marked present. Toggling a leg off either drops that leg from the
//! record or, if it was the last one, deletes the record.
//!
//! [`AttendanceService::set_presence`] reads the current record and then
//! writes, with no transaction around the two. Two toggles racing on the same
//! key can lose one of the updates.
//!
//! Two concurrent "off" toggles, one per leg, both see the other leg still
//! marked and each clear only their own. The store's leg clear deletes a
//! record once neither leg is left, so that race ends with no record rather
//! than an empty one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthGate;
use crate::error::Result;
use crate::model::{AttendanceKey, AttendanceRecord, CourseId, EntryId, Leg, Presence, StudentId};
use crate::store::DocumentStore;

/// One toggle flip from the attendance page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    /// The student.
    pub student_id: StudentId,
    /// The student's course.
    pub course_id: CourseId,
    /// The scheduled trip.
    pub trip_id: EntryId,
    /// Trip date.
    pub date: NaiveDate,
    /// Which leg was toggled.
    pub leg: Leg,
    /// New toggle value.
    pub present: bool,
}

impl PresenceChange {
    /// The key of the record this change touches.
    #[must_use]
    pub fn key(&self) -> AttendanceKey {
        AttendanceKey::new(self.date, self.trip_id, self.student_id)
    }
}

/// What a toggle did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceOutcome {
    /// A new record with only the toggled leg.
    Created,
    /// The leg was set on an existing record.
    Marked,
    /// The leg was removed; the other leg keeps the record alive.
    LegCleared,
    /// The last leg was removed along with the record.
    Deleted,
    /// Nothing to do.
    Unchanged,
}

impl fmt::Display for PresenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Marked => "marked",
            Self::LegCleared => "leg cleared",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Attendance reads and toggles.
#[derive(Debug, Clone)]
pub struct AttendanceService {
    store: Arc<dyn DocumentStore>,
    gate: AuthGate,
}

impl AttendanceService {
    /// Build a service writing to `store` behind `gate`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, gate: AuthGate) -> Self {
        Self { store, gate }
    }

    /// Apply one toggle.
    ///
    /// # Errors
    ///
    /// Auth or store errors. A failed toggle may leave the record as it was.
    pub async fn set_presence(&self, change: PresenceChange) -> Result<PresenceOutcome> {
        self.gate.check().await?;
        let key = change.key();
        let existing = self.store.get_attendance(&key).await?;

        let outcome = match (existing, change.present) {
            (None, true) => {
                let record = AttendanceRecord::with_leg(key, change.course_id, change.leg);
                self.store.put_attendance(&record).await?;
                PresenceOutcome::Created
            }
            (Some(_), true) => {
                self.store.set_attendance_leg(&key, change.leg).await?;
                PresenceOutcome::Marked
            }
            (None, false) => PresenceOutcome::Unchanged,
            (Some(record), false) if record.has(change.leg.other()) => {
                self.store.clear_attendance_leg(&key, change.leg).await?;
                PresenceOutcome::LegCleared
            }
            (Some(_), false) => {
                self.store.delete_attendance(&key).await?;
                PresenceOutcome::Deleted
            }
        };

        debug!("Attendance {} {} -> {}", key, change.leg, outcome);
        Ok(outcome)
    }

    /// Toggle state of every marked student on one trip. Students missing
    /// from the map have both legs off.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn presence_for_trip(
        &self,
        date: NaiveDate,
        trip_id: EntryId,
    ) -> Result<HashMap<StudentId, Presence>> {
        let records = self.store.list_attendance(date, trip_id).await?;
        Ok(records
            .iter()
            .map(|r| (r.student_id, Presence::from(r)))
            .collect())
    }
}
