//! Per-trip attendance for secondary students.
//!
//! Presence is sparse: a leg is either marked present or absent from the
//! record entirely, and a record with no legs present must not exist.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::{CourseId, EntryId, StudentId};
use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One leg of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    /// Going ("va").
    Outbound,
    /// Coming back ("vuelve").
    Return,
}

impl Leg {
    /// The opposite leg.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Outbound => Self::Return,
            Self::Return => Self::Outbound,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => f.write_str("outbound"),
            Self::Return => f.write_str("return"),
        }
    }
}

impl FromStr for Leg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "outbound" | "va" | "ida" => Ok(Self::Outbound),
            "return" | "vuelve" | "vuelta" => Ok(Self::Return),
            _ => Err(Error::validation("leg", format!("unknown leg {s:?}"))),
        }
    }
}

/// Composite identity of an attendance record.
///
/// The display form, `YYYY-MM-DD_trip_student`, is the record's document id,
/// so at most one record exists per tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttendanceKey {
    /// Trip date.
    pub date: NaiveDate,
    /// The scheduled trip.
    pub trip_id: EntryId,
    /// The student.
    pub student_id: StudentId,
}

impl AttendanceKey {
    /// Build a key.
    #[must_use]
    pub fn new(date: NaiveDate, trip_id: EntryId, student_id: StudentId) -> Self {
        Self {
            date,
            trip_id,
            student_id,
        }
    }
}

impl fmt::Display for AttendanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.date.format(DATE_FORMAT),
            self.trip_id,
            self.student_id
        )
    }
}

impl FromStr for AttendanceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '_');
        let (Some(date), Some(trip), Some(student)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::validation("attendance key", format!("malformed key {s:?}")));
        };
        Ok(Self {
            date: parse_date(date)?,
            trip_id: trip.parse()?,
            student_id: student.parse()?,
        })
    }
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns a validation error for anything else.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| Error::validation("date", format!("{s:?} is not a YYYY-MM-DD date")))
}

/// Stored attendance for one student on one trip and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// The student.
    pub student_id: StudentId,
    /// The student's course at the time of marking.
    pub course_id: CourseId,
    /// The scheduled trip.
    pub trip_id: EntryId,
    /// Trip date.
    pub date: NaiveDate,
    /// `Some(true)` when present on the outbound leg, otherwise absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<bool>,
    /// `Some(true)` when present on the return leg, otherwise absent.
    #[serde(default, rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_leg: Option<bool>,
}

impl AttendanceRecord {
    /// A record with only `leg` marked present.
    #[must_use]
    pub fn with_leg(key: AttendanceKey, course_id: CourseId, leg: Leg) -> Self {
        let mut record = Self {
            student_id: key.student_id,
            course_id,
            trip_id: key.trip_id,
            date: key.date,
            outbound: None,
            return_leg: None,
        };
        record.mark(leg);
        record
    }

    /// This record's key.
    #[must_use]
    pub fn key(&self) -> AttendanceKey {
        AttendanceKey::new(self.date, self.trip_id, self.student_id)
    }

    /// Whether `leg` is marked present.
    #[must_use]
    pub fn has(&self, leg: Leg) -> bool {
        let flag = match leg {
            Leg::Outbound => self.outbound,
            Leg::Return => self.return_leg,
        };
        flag == Some(true)
    }

    /// Mark `leg` present.
    pub fn mark(&mut self, leg: Leg) {
        match leg {
            Leg::Outbound => self.outbound = Some(true),
            Leg::Return => self.return_leg = Some(true),
        }
    }

    /// Remove `leg` from the record.
    pub fn clear(&mut self, leg: Leg) {
        match leg {
            Leg::Outbound => self.outbound = None,
            Leg::Return => self.return_leg = None,
        }
    }

    /// True when no leg is present; such a record must be deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has(Leg::Outbound) && !self.has(Leg::Return)
    }
}

/// Both toggles of one attendance row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Presence {
    /// Outbound toggle.
    pub outbound: bool,
    /// Return toggle.
    #[serde(rename = "return")]
    pub return_leg: bool,
}

impl From<&AttendanceRecord> for Presence {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            outbound: record.has(Leg::Outbound),
            return_leg: record.has(Leg::Return),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AttendanceKey {
        AttendanceKey::new(
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            EntryId(12),
            StudentId(7),
        )
    }

    #[test]
    fn test_key_display_and_parse() {
        let k = key();
        assert_eq!(k.to_string(), "2024-05-06_12_7");
        assert_eq!("2024-05-06_12_7".parse::<AttendanceKey>().unwrap(), k);
    }

    #[test]
    fn test_key_parse_rejects_malformed() {
        assert!("2024-05-06_12".parse::<AttendanceKey>().is_err());
        assert!("06/05/2024_12_7".parse::<AttendanceKey>().is_err());
        assert!("2024-05-06_x_7".parse::<AttendanceKey>().is_err());
    }

    #[test]
    fn test_record_with_leg() {
        let record = AttendanceRecord::with_leg(key(), CourseId(1), Leg::Return);
        assert!(record.has(Leg::Return));
        assert!(!record.has(Leg::Outbound));
        assert_eq!(record.outbound, None);
        assert_eq!(record.key(), key());
    }

    #[test]
    fn test_record_clear_to_empty() {
        let mut record = AttendanceRecord::with_leg(key(), CourseId(1), Leg::Outbound);
        record.mark(Leg::Return);
        record.clear(Leg::Outbound);
        assert!(!record.is_empty());
        record.clear(Leg::Return);
        assert!(record.is_empty());
    }

    #[test]
    fn test_record_serializes_sparse() {
        let record = AttendanceRecord::with_leg(key(), CourseId(1), Leg::Outbound);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""outbound":true"#));
        assert!(!json.contains("return"));
    }

    #[test]
    fn test_leg_parse_aliases() {
        assert_eq!("va".parse::<Leg>().unwrap(), Leg::Outbound);
        assert_eq!("Vuelve".parse::<Leg>().unwrap(), Leg::Return);
        assert_eq!(Leg::Outbound.other(), Leg::Return);
        assert!("both".parse::<Leg>().is_err());
    }

    #[test]
    fn test_presence_from_record() {
        let mut record = AttendanceRecord::with_leg(key(), CourseId(1), Leg::Outbound);
        record.mark(Leg::Return);
        let presence = Presence::from(&record);
        assert!(presence.outbound && presence.return_leg);
    }
}
