//! Secondary-school course groups and their students.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CourseId, StudentId};

/// A secondary course group such as "3A".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryCourse {
    /// Store-assigned id.
    pub id: CourseId,
    /// Group name, never empty.
    pub name: String,
    /// Set by the store on creation.
    pub created_at: DateTime<Utc>,
}

/// A student on a secondary course roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Store-assigned id.
    pub id: StudentId,
    /// The course this student is listed under.
    pub course_id: CourseId,
    /// Display name, never empty.
    pub name: String,
    /// Set by the store on creation.
    pub created_at: DateTime<Utc>,
    /// Outbound flag from rosters written before per-trip attendance.
    /// Read for display of old data, never written.
    #[serde(default, rename = "va", skip_serializing_if = "Option::is_none")]
    pub legacy_outbound: Option<bool>,
    /// Return flag from rosters written before per-trip attendance.
    #[serde(default, rename = "vuelve", skip_serializing_if = "Option::is_none")]
    pub legacy_return: Option<bool>,
}
