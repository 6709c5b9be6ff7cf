//! Event log and user directory over a single SQLite database.
//!
//! Two tables: `Logs` is the append-only activity log (every inbound event
//! plus the hub's synthetic connect/disconnect/join rows); `Users` carries
//! presence and identity (online flag, color, photo path, project). The hub
//! is the only writer. Timestamps are stored as `TIME_FORMAT` text, which
//! sorts lexicographically, so SQL `min`/`max` and range comparisons work
//! on the raw strings.

use chrono::NaiveDateTime;
use radar_core::{Event, TIME_FORMAT};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;
use thiserror::Error;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Constraints for a historical event query. An empty user or type set
/// means no constraint on that axis.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub users: Vec<String>,
    pub types: Vec<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.apply_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.apply_schema()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> DbResult<()> {
        self.conn
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        Ok(())
    }

    fn apply_schema(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event store
    // -----------------------------------------------------------------------

    /// Append one event; the assigned log ID is returned.
    pub fn append_event(&self, event: &Event) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO Logs (Time, Client, Event, Parameters) VALUES (?1, ?2, ?3, ?4)",
            params![event.format_time(), event.user_name, event.event_type, event.parameters],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Events matching `filter`, oldest first.
    pub fn events(&self, filter: &EventFilter) -> DbResult<Vec<Event>> {
        let mut sql = String::from("SELECT Client, Event, Parameters, Time FROM Logs");
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if !filter.users.is_empty() {
            clauses.push(format!("Client IN ({})", placeholders(filter.users.len())));
            values.extend(filter.users.iter().cloned());
        }
        if !filter.types.is_empty() {
            clauses.push(format!("Event IN ({})", placeholders(filter.types.len())));
            values.extend(filter.types.iter().cloned());
        }
        if let Some(start) = filter.start {
            clauses.push("Time >= ?".to_owned());
            values.push(start.format(TIME_FORMAT).to_string());
        }
        if let Some(end) = filter.end {
            clauses.push("Time <= ?".to_owned());
            values.push(end.format(TIME_FORMAT).to_string());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY Time, ID");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), event_row)?;
        let mut events = Vec::new();
        for row in rows {
            if let Some(event) = parse_event_row(row?) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Earliest and latest log timestamps, `None` on an empty log.
    pub fn time_span(&self) -> DbResult<Option<(NaiveDateTime, NaiveDateTime)>> {
        let (min, max): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT min(Time), max(Time) FROM Logs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        match (min, max) {
            (Some(min), Some(max)) => {
                Ok(Event::parse_time(&min).zip(Event::parse_time(&max)))
            }
            _ => Ok(None),
        }
    }

    /// The target user's most recent event of the given type.
    pub fn latest_event_of_type(&self, user: &str, event_type: &str) -> DbResult<Option<Event>> {
        let row = self
            .conn
            .query_row(
                "SELECT Client, Event, Parameters, Time FROM Logs
                 WHERE Client = ?1 AND Event = ?2
                 ORDER BY Time DESC, ID DESC LIMIT 1",
                params![user, event_type],
                event_row,
            )
            .optional()?;
        Ok(row.and_then(parse_event_row))
    }

    /// Admin-only: drop the whole log.
    pub fn clear_logs(&self) -> DbResult<()> {
        self.conn.execute("DELETE FROM Logs", [])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // User directory
    // -----------------------------------------------------------------------

    /// Create the user record on first sight; existing records are kept.
    pub fn upsert_user(&self, name: &str) -> DbResult<()> {
        self.conn
            .execute("INSERT OR IGNORE INTO Users (Username) VALUES (?1)", params![name])?;
        Ok(())
    }

    pub fn set_online(&self, name: &str, online: bool) -> DbResult<()> {
        self.conn.execute(
            "UPDATE Users SET Online = ?1 WHERE Username = ?2",
            params![i64::from(online), name],
        )?;
        Ok(())
    }

    /// Startup sweep: clears stale online flags left by an unclean shutdown.
    pub fn make_all_offline(&self) -> DbResult<()> {
        self.conn.execute("UPDATE Users SET Online = 0 WHERE Online = 1", [])?;
        Ok(())
    }

    pub fn online(&self, name: &str) -> DbResult<bool> {
        let online: Option<i64> = self
            .conn
            .query_row("SELECT Online FROM Users WHERE Username = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(online.unwrap_or(0) != 0)
    }

    pub fn set_color(&self, name: &str, color: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE Users SET Color = ?1 WHERE Username = ?2",
            params![color, name],
        )?;
        Ok(())
    }

    /// A user with no record reports the default color.
    pub fn color(&self, name: &str) -> DbResult<String> {
        let color: Option<String> = self
            .conn
            .query_row("SELECT Color FROM Users WHERE Username = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(color.unwrap_or_else(|| "#000000".to_owned()))
    }

    pub fn set_image(&self, name: &str, image_path: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE Users SET Image = ?1 WHERE Username = ?2",
            params![image_path, name],
        )?;
        Ok(())
    }

    pub fn set_project(&self, name: &str, project: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE Users SET Project = ?1 WHERE Username = ?2",
            params![project, name],
        )?;
        Ok(())
    }

    pub fn project(&self, name: &str) -> DbResult<String> {
        let project: Option<String> = self
            .conn
            .query_row("SELECT Project FROM Users WHERE Username = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(project.unwrap_or_default())
    }

    /// Every user bound to `project`, sorted by name.
    pub fn project_members(&self, project: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT Username FROM Users WHERE Username <> '' AND Project = ?1 ORDER BY Username",
        )?;
        let rows = stmt.query_map(params![project], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Distinct non-empty project names, sorted.
    pub fn projects(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT Project FROM Users WHERE Project <> '' ORDER BY Project")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

type RawEventRow = (String, String, String, String);

fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEventRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn parse_event_row((user, event_type, parameters, time): RawEventRow) -> Option<Event> {
    let time = Event::parse_time(&time)?;
    Some(Event::at(user, event_type, parameters, time))
}
