//! Schema versioning for the board database.
//!
//! Version 1 is the layout in [`super::schema`]. Each later version is one
//! `Step`; pending steps run in order, each in its own transaction together
//! with the version bump, so an interrupted upgrade resumes where it stopped.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// Version a freshly created or fully upgraded database reports.
pub const CURRENT_VERSION: i32 = 2;

const VERSION_KEY: &str = "schema_version";

/// One upgrade from `version - 1` to `version`.
struct Step {
    version: i32,
    summary: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

const STEPS: &[Step] = &[Step {
    version: 2,
    summary: "trips gain day and carrier",
    apply: add_day_and_carrier,
}];

/// Create missing tables, then bring an older board file up to
/// [`CURRENT_VERSION`].
///
/// # Errors
///
/// Fails when a statement is rejected or the stored version is unreadable.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    // A file without a version row was created by this code at version 1.
    let stored = stored_version(conn)?.unwrap_or(1);
    if stored > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!("board file is at v{stored}, newer than this build (v{CURRENT_VERSION})"),
        });
    }
    for step in STEPS.iter().filter(|s| s.version > stored) {
        let tx = conn.unchecked_transaction()?;
        (step.apply)(&tx)?;
        write_version(&tx, step.version)?;
        tx.commit()?;
        info!("Board database at v{}: {}", step.version, step.summary);
    }

    if stored_version(conn)?.is_none() {
        write_version(conn, CURRENT_VERSION)?;
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<Option<i32>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|v| {
        v.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("unreadable schema version {v:?}"),
        })
    })
    .transpose()
}

fn write_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn add_day_and_carrier(conn: &Connection) -> Result<()> {
    for column in ["day", "carrier"] {
        if !trip_columns(conn)?.iter().any(|c| c == column) {
            conn.execute(&format!("ALTER TABLE courses ADD COLUMN {column} TEXT"), [])?;
        }
    }
    Ok(())
}

fn trip_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(courses)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_file() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for statement in SCHEMA_STATEMENTS {
            conn.execute(statement, []).unwrap();
        }
        write_version(&conn, 1).unwrap();
        conn
    }

    #[test]
    fn test_fresh_file_has_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["courses", "secondary_courses", "students", "attendance", "users", "session"] {
            let found: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(found, 1, "missing table {table}");
        }
        assert_eq!(stored_version(&conn).unwrap(), Some(CURRENT_VERSION));
        assert!(trip_columns(&conn).unwrap().contains(&"carrier".to_string()));
    }

    #[test]
    fn test_reopening_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), Some(CURRENT_VERSION));
    }

    #[test]
    fn test_v1_trips_survive_the_upgrade() {
        let conn = v1_file();
        conn.execute(
            "INSERT INTO courses (level, course_name, time, direction, created_at)
             VALUES ('Primaria', '\"3A\"', '08:00', 'Llegada', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        initialize_schema(&conn).unwrap();

        assert_eq!(stored_version(&conn).unwrap(), Some(2));
        let (time, day): (String, Option<String>) = conn
            .query_row("SELECT time, day FROM courses", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(time, "08:00");
        assert!(day.is_none());
    }

    #[test]
    fn test_newer_file_is_refused() {
        let conn = v1_file();
        write_version(&conn, CURRENT_VERSION + 1).unwrap();
        let err = initialize_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("newer than this build"));
    }

    #[test]
    fn test_garbled_version_is_an_error() {
        let conn = v1_file();
        conn.execute("UPDATE metadata SET value = 'two' WHERE key = ?1", [VERSION_KEY])
            .unwrap();
        assert!(initialize_schema(&conn).is_err());
    }
}
