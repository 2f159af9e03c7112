//! `SQLite` schema definitions for flapboard.
//!
//! Each logical collection of the board lives in its own table. The
//! statements here create the version 1 layout; later columns are added by
//! [`super::migrations`].

/// Scheduled trips (`courses` collection).
pub const CREATE_COURSES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    course_name TEXT NOT NULL,
    time TEXT NOT NULL,
    place TEXT,
    direction TEXT NOT NULL,
    notes TEXT,
    owner_id TEXT,
    created_at TEXT NOT NULL
)
";

/// Secondary course groups (`secondary_courses` collection).
pub const CREATE_SECONDARY_COURSES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS secondary_courses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// Students (`students` collection). `va`/`vuelve` are legacy presence
/// flags kept for reading old rosters.
pub const CREATE_STUDENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    va INTEGER,
    vuelve INTEGER
)
";

/// Index for roster lookups by course.
pub const CREATE_STUDENTS_COURSE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)
";

/// Attendance (`attendance` collection), keyed by `date_trip_student`.
/// A NULL leg is an absent field; `false` is never stored.
pub const CREATE_ATTENDANCE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS attendance (
    key TEXT PRIMARY KEY,
    student_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    trip_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    outbound INTEGER CHECK (outbound IS NULL OR outbound = 1),
    return_leg INTEGER CHECK (return_leg IS NULL OR return_leg = 1)
)
";

/// Index for loading one trip's attendance sheet.
pub const CREATE_ATTENDANCE_TRIP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_attendance_trip ON attendance(date, trip_id)
";

/// Accounts for the local identity provider.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    salt TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// The signed-in user, at most one row.
pub const CREATE_SESSION_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS session (
    slot INTEGER PRIMARY KEY CHECK (slot = 1),
    user_id INTEGER NOT NULL,
    signed_in_at TEXT NOT NULL
)
";

/// Key-value metadata, holds the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_COURSES_TABLE,
    CREATE_SECONDARY_COURSES_TABLE,
    CREATE_STUDENTS_TABLE,
    CREATE_STUDENTS_COURSE_INDEX,
    CREATE_ATTENDANCE_TABLE,
    CREATE_ATTENDANCE_TRIP_INDEX,
    CREATE_USERS_TABLE,
    CREATE_SESSION_TABLE,
    CREATE_METADATA_TABLE,
];
