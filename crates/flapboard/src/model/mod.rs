//! Record types shared by the board, roster and attendance modules.
//!
//! The schedule record is the superset of every shape the board has stored
//! over time: fields that older documents lack are `Option`s rather than
//! separate record types.

mod attendance;
mod ids;
mod roster;
mod schedule;

pub use attendance::{parse_date, AttendanceKey, AttendanceRecord, Leg, Presence};
pub use ids::{CourseId, EntryId, StudentId};
pub use roster::{SecondaryCourse, Student};
pub use schedule::{
    validate_time, Carrier, CourseName, Day, Direction, Level, Place, ScheduleDraft, ScheduleEntry,
    TripField,
};
