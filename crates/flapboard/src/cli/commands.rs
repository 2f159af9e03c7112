//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand};

use crate::filter::FilterCriteria;
use crate::model::{
    Carrier, CourseId, CourseName, Day, Direction, EntryId, Leg, Level, Place, ScheduleDraft,
    ScheduleEntry, StudentId, TripField,
};

/// Equality filters shared by `schedule list` and `board`.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Only this day (Lunes..Viernes)
    #[arg(long)]
    pub day: Option<Day>,

    /// Only this place (Escuela, Campo)
    #[arg(long)]
    pub place: Option<Place>,

    /// Only this carrier (CRI, Bili)
    #[arg(long)]
    pub carrier: Option<Carrier>,

    /// Only this direction (Llegada, Salida)
    #[arg(long)]
    pub direction: Option<Direction>,

    /// Only this level (Jardín, Primaria, Secundaria)
    #[arg(long)]
    pub level: Option<Level>,
}

impl FilterArgs {
    /// Overlay these flags on `base`; flags that were given win.
    #[must_use]
    pub fn apply_to(&self, base: FilterCriteria) -> FilterCriteria {
        FilterCriteria {
            day: self.day.or(base.day),
            place: self.place.or(base.place),
            carrier: self.carrier.or(base.carrier),
            direction: self.direction.or(base.direction),
            level: self.level.or(base.level),
        }
    }
}

/// Trip fields for `schedule add`.
#[derive(Debug, Clone, Args)]
pub struct TripArgs {
    /// School level
    #[arg(long)]
    pub level: Level,

    /// Course group(s), comma separated
    #[arg(long)]
    pub course: String,

    /// Time of day, HH:mm
    #[arg(long)]
    pub time: String,

    /// Day of the week
    #[arg(long)]
    pub day: Option<Day>,

    /// Place served
    #[arg(long)]
    pub place: Option<Place>,

    /// Vehicle
    #[arg(long)]
    pub carrier: Option<Carrier>,

    /// Arrival or departure
    #[arg(long)]
    pub direction: Direction,

    /// Notes for the trip
    #[arg(long)]
    pub notes: Option<String>,
}

impl From<TripArgs> for ScheduleDraft {
    fn from(args: TripArgs) -> Self {
        Self {
            id: None,
            level: args.level,
            course_name: CourseName::from(args.course.as_str()),
            time: args.time,
            day: args.day,
            place: args.place,
            carrier: args.carrier,
            direction: args.direction,
            notes: args.notes,
        }
    }
}

/// Trip fields for `schedule edit`; only the given ones change.
#[derive(Debug, Clone, Default, Args)]
pub struct TripPatchArgs {
    /// School level
    #[arg(long)]
    pub level: Option<Level>,

    /// Course group(s), comma separated
    #[arg(long)]
    pub course: Option<String>,

    /// Time of day, HH:mm
    #[arg(long)]
    pub time: Option<String>,

    /// Day of the week
    #[arg(long)]
    pub day: Option<Day>,

    /// Place served
    #[arg(long)]
    pub place: Option<Place>,

    /// Vehicle
    #[arg(long)]
    pub carrier: Option<Carrier>,

    /// Arrival or departure
    #[arg(long)]
    pub direction: Option<Direction>,

    /// Notes for the trip
    #[arg(long)]
    pub notes: Option<String>,

    /// Blank an optional field (day, place, carrier, notes); repeatable.
    /// Wins over a value given for the same field.
    #[arg(long, value_name = "FIELD", value_delimiter = ',')]
    pub clear: Vec<TripField>,
}

impl TripPatchArgs {
    /// A draft of `entry` with the given fields overwritten. Fields listed
    /// in `clear` are `None` in the draft; pass the same list to
    /// `ScheduleService::save` so the store blanks them too.
    #[must_use]
    pub fn merge_into(self, entry: &ScheduleEntry) -> ScheduleDraft {
        let base = ScheduleDraft::from(entry);
        let kept = |field: TripField| !self.clear.contains(&field);
        ScheduleDraft {
            level: self.level.unwrap_or(base.level),
            course_name: self.course.as_deref().map_or(base.course_name, CourseName::from),
            time: self.time.unwrap_or(base.time),
            day: self.day.or(base.day).filter(|_| kept(TripField::Day)),
            place: self.place.or(base.place).filter(|_| kept(TripField::Place)),
            carrier: self.carrier.or(base.carrier).filter(|_| kept(TripField::Carrier)),
            direction: self.direction.unwrap_or(base.direction),
            notes: self.notes.or(base.notes).filter(|_| kept(TripField::Notes)),
            id: base.id,
        }
    }
}

/// Schedule commands.
#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// List trips ordered by day and time
    List {
        /// Filters
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Add a trip
    Add {
        /// Trip fields
        #[command(flatten)]
        trip: TripArgs,

        /// Draft the notes with the text generator
        #[arg(long, conflicts_with = "notes")]
        draft_notes: bool,
    },

    /// Change fields of a trip
    Edit {
        /// Trip id
        id: EntryId,

        /// Fields to change
        #[command(flatten)]
        patch: TripPatchArgs,
    },

    /// Delete a trip
    Remove {
        /// Trip id
        id: EntryId,
    },
}

/// Board command arguments.
#[derive(Debug, Args)]
pub struct BoardCommand {
    /// Open on today's school day (weekends show Monday)
    #[arg(long)]
    pub today: bool,

    /// Keep the board open and animate every change
    #[arg(short, long)]
    pub watch: bool,

    /// Filters
    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Roster commands.
#[derive(Debug, Subcommand)]
pub enum RosterCommand {
    /// Manage secondary course groups
    #[command(subcommand)]
    Course(CourseCommand),

    /// Manage students
    #[command(subcommand)]
    Student(StudentCommand),
}

/// Course group commands.
#[derive(Debug, Subcommand)]
pub enum CourseCommand {
    /// Create a course group
    Add {
        /// Group name
        name: String,
    },

    /// Rename a course group
    Rename {
        /// Course id
        id: CourseId,
        /// New name
        name: String,
    },

    /// Delete a course group and all of its students
    Remove {
        /// Course id
        id: CourseId,
    },

    /// List course groups with their students
    List,
}

/// Student commands.
#[derive(Debug, Subcommand)]
pub enum StudentCommand {
    /// Add a student to a course
    Add {
        /// Course id
        course: CourseId,
        /// Student name
        name: String,
    },

    /// Rename a student
    Rename {
        /// Student id
        id: StudentId,
        /// New name
        name: String,
    },

    /// Delete a student
    Remove {
        /// Student id
        id: StudentId,
    },

    /// Import one student per line
    Import {
        /// Course id
        course: CourseId,
        /// Text file with one name per line; stdin when omitted or `-`
        file: Option<PathBuf>,
    },
}

/// Attendance commands.
#[derive(Debug, Subcommand)]
pub enum AttendanceCommand {
    /// Toggle one leg for one student
    Set {
        /// Trip id
        #[arg(long)]
        trip: EntryId,

        /// Student id
        #[arg(long)]
        student: StudentId,

        /// Leg: va/outbound or vuelve/return
        #[arg(long)]
        leg: Leg,

        /// Mark absent instead of present
        #[arg(long)]
        absent: bool,

        /// Trip date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show who is marked on a trip
    Show {
        /// Trip id
        #[arg(long)]
        trip: EntryId,

        /// Trip date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Sign-in commands.
#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Create an account and sign in
    Signup {
        /// Email address
        email: String,
        /// Password, at least 6 characters
        #[arg(long)]
        password: String,
    },

    /// Sign in
    Signin {
        /// Email address
        email: String,
        /// Password
        #[arg(long)]
        password: String,
    },

    /// Sign out
    Signout,

    /// Show the signed-in user
    Whoami,
}

/// Generative-text commands.
#[derive(Debug, Subcommand)]
pub enum AiCommand {
    /// Restyle a status label for the board
    Stylize {
        /// Status text
        text: String,
    },

    /// Draft notes for a trip
    Notes {
        /// Trip id
        id: EntryId,

        /// Store the drafted notes on the trip
        #[arg(long)]
        save: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
