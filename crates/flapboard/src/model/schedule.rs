//! Scheduled trips shown on the board.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ids::EntryId;
use crate::error::{Error, Result};

/// 24h `HH:mm` with an optional leading zero on the hour.
const TIME_PATTERN: &str = r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$";

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIME_PATTERN).expect("time pattern is a valid regex"))
}

/// Lowercases and folds the accented vowels used by the locale names.
fn fold(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace('á', "a")
        .replace('é', "e")
        .replace('í', "i")
        .replace('ó', "o")
        .replace('ú', "u")
}

/// School level a trip belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Kindergarten.
    #[serde(rename = "Jardín")]
    Jardin,
    /// Primary school.
    #[serde(rename = "Primaria")]
    Primaria,
    /// Secondary school.
    #[serde(rename = "Secundaria")]
    Secundaria,
}

impl Level {
    /// Every level, in board order.
    pub const ALL: [Self; 3] = [Self::Jardin, Self::Primaria, Self::Secundaria];

    /// Name as stored and displayed.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jardin => "Jardín",
            Self::Primaria => "Primaria",
            Self::Secundaria => "Secundaria",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "jardin" | "kindergarten" => Ok(Self::Jardin),
            "primaria" | "primary" => Ok(Self::Primaria),
            "secundaria" | "secondary" => Ok(Self::Secundaria),
            _ => Err(Error::validation("level", format!("unknown level {s:?}"))),
        }
    }
}

/// School day. Weekends carry no trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    /// Lunes.
    #[serde(rename = "Lunes")]
    Monday,
    /// Martes.
    #[serde(rename = "Martes")]
    Tuesday,
    /// Miércoles.
    #[serde(rename = "Miércoles")]
    Wednesday,
    /// Jueves.
    #[serde(rename = "Jueves")]
    Thursday,
    /// Viernes.
    #[serde(rename = "Viernes")]
    Friday,
}

impl Day {
    /// Every school day, Monday first.
    pub const ALL: [Self; 5] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
    ];

    /// Name as stored and displayed.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "Lunes",
            Self::Tuesday => "Martes",
            Self::Wednesday => "Miércoles",
            Self::Thursday => "Jueves",
            Self::Friday => "Viernes",
        }
    }

    /// The school day for a calendar weekday, `None` on weekends.
    #[must_use]
    pub fn from_weekday(weekday: Weekday) -> Option<Self> {
        match weekday {
            Weekday::Mon => Some(Self::Monday),
            Weekday::Tue => Some(Self::Tuesday),
            Weekday::Wed => Some(Self::Wednesday),
            Weekday::Thu => Some(Self::Thursday),
            Weekday::Fri => Some(Self::Friday),
            Weekday::Sat | Weekday::Sun => None,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Day {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "lunes" | "monday" | "mon" => Ok(Self::Monday),
            "martes" | "tuesday" | "tue" => Ok(Self::Tuesday),
            "miercoles" | "wednesday" | "wed" => Ok(Self::Wednesday),
            "jueves" | "thursday" | "thu" => Ok(Self::Thursday),
            "viernes" | "friday" | "fri" => Ok(Self::Friday),
            _ => Err(Error::validation("day", format!("unknown school day {s:?}"))),
        }
    }
}

/// Site a trip runs from or to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Place {
    /// The school building.
    #[serde(rename = "Escuela")]
    School,
    /// The farm campus.
    #[serde(rename = "Campo")]
    Farm,
}

impl Place {
    /// Both sites.
    pub const ALL: [Self; 2] = [Self::School, Self::Farm];

    /// Name as stored and displayed.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::School => "Escuela",
            Self::Farm => "Campo",
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Place {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "escuela" | "school" => Ok(Self::School),
            "campo" | "farm" | "granja" => Ok(Self::Farm),
            _ => Err(Error::validation("place", format!("unknown place {s:?}"))),
        }
    }
}

/// Vehicle operating a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Carrier {
    /// The CRI bus.
    #[serde(rename = "CRI")]
    Cri,
    /// The Bili bus.
    #[serde(rename = "Bili")]
    Bili,
}

impl Carrier {
    /// Both vehicles.
    pub const ALL: [Self; 2] = [Self::Cri, Self::Bili];

    /// Name as stored and displayed.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cri => "CRI",
            Self::Bili => "Bili",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Carrier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "cri" => Ok(Self::Cri),
            "bili" => Ok(Self::Bili),
            _ => Err(Error::validation("carrier", format!("unknown carrier {s:?}"))),
        }
    }
}

/// Whether a trip arrives at or leaves its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Llegada.
    #[serde(rename = "Llegada")]
    Arrival,
    /// Salida.
    #[serde(rename = "Salida")]
    Departure,
}

impl Direction {
    /// Both directions.
    pub const ALL: [Self; 2] = [Self::Arrival, Self::Departure];

    /// Name as stored and displayed.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "Llegada",
            Self::Departure => "Salida",
        }
    }

    /// Status column text on the public board.
    #[must_use]
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Arrival => "LLEGANDO",
            Self::Departure => "SALIENDO",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "llegada" | "arrival" => Ok(Self::Arrival),
            "salida" | "departure" => Ok(Self::Departure),
            _ => Err(Error::validation("direction", format!("unknown direction {s:?}"))),
        }
    }
}

/// Course group(s) served by a trip.
///
/// Older documents hold a single string; newer ones a list, since one trip
/// may carry several groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CourseName {
    /// A single course group.
    One(String),
    /// Several course groups sharing the trip.
    Many(Vec<String>),
}

impl CourseName {
    /// The individual group names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// True when no group carries a non-blank name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names().iter().all(|n| n.trim().is_empty())
    }

    /// Trim every name and drop blank ones, collapsing to `One` when a single
    /// name remains.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut names: Vec<String> = self
            .names()
            .into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if names.len() == 1 {
            Self::One(names.remove(0))
        } else {
            Self::Many(names)
        }
    }
}

impl fmt::Display for CourseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" / "))
    }
}

impl From<&str> for CourseName {
    /// Comma separated input yields several groups.
    fn from(s: &str) -> Self {
        if s.contains(',') {
            Self::Many(s.split(',').map(|n| n.trim().to_string()).collect())
        } else {
            Self::One(s.trim().to_string())
        }
    }
}

/// A stored trip on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    /// Store-assigned id.
    pub id: EntryId,
    /// School level.
    pub level: Level,
    /// Course group(s) on this trip.
    pub course_name: CourseName,
    /// Departure or arrival time, `HH:mm`.
    pub time: String,
    /// Day of the week; absent on the oldest records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<Day>,
    /// Site served by the trip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<Place>,
    /// Vehicle; absent before carriers were tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<Carrier>,
    /// Arrival or departure.
    pub direction: Direction,
    /// Free-form notes, possibly drafted by the text generator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Owner of the record when the board runs with sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Set by the store on creation.
    pub created_at: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Minutes since midnight, used for ordering.
    #[must_use]
    pub fn minutes(&self) -> u16 {
        time_minutes(&self.time).unwrap_or(u16::MAX)
    }

    /// Prompt used when drafting notes for this trip.
    #[must_use]
    pub fn notes_prompt(&self) -> String {
        trip_prompt(
            &self.course_name,
            self.level,
            self.place,
            self.direction,
            &self.time,
            self.day,
        )
    }
}

/// One-line description of a trip, fed to the notes generator.
fn trip_prompt(
    course_name: &CourseName,
    level: Level,
    place: Option<Place>,
    direction: Direction,
    time: &str,
    day: Option<Day>,
) -> String {
    let (from, to) = match (place, direction) {
        (Some(Place::School), Direction::Arrival) | (Some(Place::Farm), Direction::Departure) => {
            ("Campo", "Escuela")
        }
        (Some(Place::School), Direction::Departure) | (Some(Place::Farm), Direction::Arrival) => {
            ("Escuela", "Campo")
        }
        (None, _) => ("?", "?"),
    };
    let day = day.map_or("any day", Day::as_str);
    format!("A shuttle for {course_name} ({level}) from {from} to {to} at {time} on {day}.")
}

/// Parse `HH:mm` into minutes since midnight.
fn time_minutes(time: &str) -> Option<u16> {
    let (h, m) = time.split_once(':')?;
    h.parse::<u16>()
        .ok()?
        .checked_mul(60)?
        .checked_add(m.parse::<u16>().ok()?)
}

/// Check a time-of-day string against the board's `HH:mm` format.
///
/// # Errors
///
/// Returns a validation error if `time` is not a 24h `H:mm`/`HH:mm` value.
pub fn validate_time(time: &str) -> Result<()> {
    if time_regex().is_match(time) {
        Ok(())
    } else {
        Err(Error::validation(
            "time",
            format!("{time:?} is not a valid time, use HH:mm"),
        ))
    }
}

/// Candidate record for create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    /// Present when editing an existing entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    /// School level.
    pub level: Level,
    /// Course group(s).
    pub course_name: CourseName,
    /// `HH:mm`.
    pub time: String,
    /// Day of the week.
    #[serde(default)]
    pub day: Option<Day>,
    /// Site.
    #[serde(default)]
    pub place: Option<Place>,
    /// Vehicle.
    #[serde(default)]
    pub carrier: Option<Carrier>,
    /// Arrival or departure.
    pub direction: Direction,
    /// Notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Optional trip field an edit can blank out.
///
/// An update leaves a field alone when the draft has `None` for it; naming
/// the field here is the only way to store `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripField {
    /// Day of the week.
    Day,
    /// Site.
    Place,
    /// Vehicle.
    Carrier,
    /// Notes.
    Notes,
}

impl TripField {
    /// Every clearable field.
    pub const ALL: [Self; 4] = [Self::Day, Self::Place, Self::Carrier, Self::Notes];

    /// Name accepted by `--clear`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Place => "place",
            Self::Carrier => "carrier",
            Self::Notes => "notes",
        }
    }
}

impl fmt::Display for TripField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match fold(s).as_str() {
            "day" | "dia" => Ok(Self::Day),
            "place" | "lugar" => Ok(Self::Place),
            "carrier" | "colectivo" => Ok(Self::Carrier),
            "notes" | "notas" => Ok(Self::Notes),
            _ => Err(Error::validation(
                "field",
                format!("{s:?} cannot be cleared, use day, place, carrier or notes"),
            )),
        }
    }
}

impl From<&ScheduleEntry> for ScheduleDraft {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            id: Some(entry.id),
            level: entry.level,
            course_name: entry.course_name.clone(),
            time: entry.time.clone(),
            day: entry.day,
            place: entry.place,
            carrier: entry.carrier,
            direction: entry.direction,
            notes: entry.notes.clone(),
        }
    }
}

impl ScheduleDraft {
    /// Prompt used when drafting notes for this trip before it is saved.
    #[must_use]
    pub fn notes_prompt(&self) -> String {
        trip_prompt(
            &self.course_name,
            self.level,
            self.place,
            self.direction,
            self.time.trim(),
            self.day,
        )
    }

    /// Validate the draft and return it with names and time trimmed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed time or an empty course name.
    pub fn validated(self) -> Result<Self> {
        let time = self.time.trim().to_string();
        validate_time(&time)?;
        if self.course_name.is_empty() {
            return Err(Error::validation("courseName", "course name is required"));
        }
        let course_name = self.course_name.normalized();
        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(Self {
            time,
            course_name,
            notes,
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn draft(time: &str, course: CourseName) -> ScheduleDraft {
        ScheduleDraft {
            id: None,
            level: Level::Primaria,
            course_name: course,
            time: time.to_string(),
            day: Some(Day::Monday),
            place: Some(Place::School),
            carrier: Some(Carrier::Cri),
            direction: Direction::Arrival,
            notes: None,
        }
    }

    #[test]
    fn test_validate_time_accepts() {
        for t in ["00:00", "23:59", "9:05", "07:30", "19:00"] {
            assert!(validate_time(t).is_ok(), "{t} should be accepted");
        }
    }

    #[test]
    fn test_validate_time_rejects() {
        for t in ["24:00", "9:60", "abc", "", "12:5", "12:345", " 9:05"] {
            assert!(validate_time(t).is_err(), "{t} should be rejected");
        }
    }

    #[test]
    fn test_draft_rejects_empty_course() {
        let err = draft("08:00", CourseName::One("   ".into()))
            .validated()
            .unwrap_err();
        assert!(err.to_string().contains("course name"));

        let err = draft("08:00", CourseName::Many(vec![]))
            .validated()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_draft_normalizes_names() {
        let d = draft(" 8:15 ", CourseName::Many(vec![" 3A ".into(), String::new()]))
            .validated()
            .unwrap();
        assert_eq!(d.time, "8:15");
        assert_eq!(d.course_name, CourseName::One("3A".into()));
    }

    #[test]
    fn test_course_name_from_str() {
        assert_eq!(CourseName::from("3A"), CourseName::One("3A".into()));
        assert_eq!(
            CourseName::from("3A, 3B"),
            CourseName::Many(vec!["3A".into(), "3B".into()])
        );
        assert_eq!(CourseName::from("3A, 3B").to_string(), "3A / 3B");
    }

    #[test]
    fn test_course_name_untagged_serde() {
        let one: CourseName = serde_json::from_str(r#""1B""#).unwrap();
        assert_eq!(one, CourseName::One("1B".into()));
        let many: CourseName = serde_json::from_str(r#"["1B","2B"]"#).unwrap();
        assert_eq!(many.names(), vec!["1B", "2B"]);
    }

    #[test]
    fn test_enum_parse_locale_and_english() {
        assert_eq!("Jardín".parse::<Level>().unwrap(), Level::Jardin);
        assert_eq!("jardin".parse::<Level>().unwrap(), Level::Jardin);
        assert_eq!("Miércoles".parse::<Day>().unwrap(), Day::Wednesday);
        assert_eq!("friday".parse::<Day>().unwrap(), Day::Friday);
        assert_eq!("farm".parse::<Place>().unwrap(), Place::Farm);
        assert_eq!("BILI".parse::<Carrier>().unwrap(), Carrier::Bili);
        assert_eq!("salida".parse::<Direction>().unwrap(), Direction::Departure);
        assert!("sábado".parse::<Day>().is_err());
    }

    #[test]
    fn test_enum_serde_uses_locale_names() {
        assert_eq!(serde_json::to_string(&Level::Jardin).unwrap(), r#""Jardín""#);
        assert_eq!(serde_json::to_string(&Day::Wednesday).unwrap(), r#""Miércoles""#);
        assert_eq!(serde_json::to_string(&Direction::Arrival).unwrap(), r#""Llegada""#);
    }

    #[test]
    fn test_day_from_weekday() {
        assert_eq!(Day::from_weekday(Weekday::Mon), Some(Day::Monday));
        assert_eq!(Day::from_weekday(Weekday::Sat), None);
        assert_eq!(Day::from_weekday(Weekday::Sun), None);
    }

    #[test]
    fn test_entry_minutes_and_prompt() {
        let entry = ScheduleEntry {
            id: EntryId(1),
            level: Level::Secundaria,
            course_name: CourseName::One("4B".into()),
            time: "7:45".into(),
            day: Some(Day::Tuesday),
            place: Some(Place::Farm),
            carrier: None,
            direction: Direction::Departure,
            notes: None,
            owner_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
        };
        assert_eq!(entry.minutes(), 7 * 60 + 45);
        let prompt = entry.notes_prompt();
        assert!(prompt.contains("from Campo to Escuela"));
        assert!(prompt.contains("at 7:45 on Martes"));
    }

    #[test]
    fn test_draft_prompt() {
        let prompt = draft(" 8:10 ", CourseName::from("2A, 2B")).notes_prompt();
        assert_eq!(
            prompt,
            "A shuttle for 2A / 2B (Primaria) from Campo to Escuela at 8:10 on Lunes."
        );
    }

    #[test]
    fn test_minutes_of_out_of_range_time_does_not_wrap() {
        let mut entry = ScheduleEntry {
            id: EntryId(2),
            level: Level::Primaria,
            course_name: CourseName::One("1A".into()),
            time: "9999:00".into(),
            day: None,
            place: None,
            carrier: None,
            direction: Direction::Arrival,
            notes: None,
            owner_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
        };
        assert_eq!(entry.minutes(), u16::MAX);
        entry.time = "1092:59".into();
        assert_eq!(entry.minutes(), u16::MAX);
        entry.time = "23:59".into();
        assert_eq!(entry.minutes(), 23 * 60 + 59);
    }

    #[test]
    fn test_trip_field_parse() {
        assert_eq!("notas".parse::<TripField>().unwrap(), TripField::Notes);
        assert_eq!("Día".parse::<TripField>().unwrap(), TripField::Day);
        assert_eq!("CARRIER".parse::<TripField>().unwrap(), TripField::Carrier);
        assert!("time".parse::<TripField>().unwrap_err().is_validation());
        for field in TripField::ALL {
            assert_eq!(field.to_string().parse::<TripField>().unwrap(), field);
        }
    }

    #[test]
    fn test_direction_status_label() {
        assert_eq!(Direction::Arrival.status_label(), "LLEGANDO");
        assert_eq!(Direction::Departure.status_label(), "SALIENDO");
    }
}
