use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::PathBuf;

use crate::db;
use crate::error::{MigrationError, Result};
use crate::student::{format_timestamp, parse_timestamp, LegacyStudent, MigratedStudent};

/// Typed access to the legacy and new student collections.
pub trait RecordStore {
    fn query_by_time_since(&self, since: DateTime<Utc>) -> Result<Vec<LegacyStudent>>;
    fn query_by_course(&self, course_id: &str) -> Result<Vec<LegacyStudent>>;
    fn query_all(&self) -> Result<Vec<LegacyStudent>>;
    fn get_legacy(&self, course_id: &str, email: &str) -> Result<Option<LegacyStudent>>;
    fn get_migrated(&self, course_id: &str, email: &str) -> Result<Option<MigratedStudent>>;
    /// Replaces any existing row with the same (course_id, email).
    fn upsert(&mut self, student: &MigratedStudent) -> Result<()>;
}

pub trait RemoteSession {
    type Store: RecordStore;

    fn connect(&mut self) -> Result<Self::Store>;
}

/// Session against a workspace directory holding the SQLite datastore.
pub struct WorkspaceSession {
    pub workspace: PathBuf,
}

impl WorkspaceSession {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

impl RemoteSession for WorkspaceSession {
    type Store = SqliteStore;

    fn connect(&mut self) -> Result<SqliteStore> {
        match db::open_existing_db(&self.workspace) {
            Ok(conn) => Ok(SqliteStore { conn }),
            Err(e) => Err(MigrationError::Connection {
                location: self.workspace.to_string_lossy().to_string(),
                message: format!("{e:#}"),
            }),
        }
    }
}

pub struct SqliteStore {
    conn: Connection,
}

const LEGACY_COLUMNS: &str = "course_id, email, name, last_name, comments, team_name,
    section_name, google_id, registration_key, created_at, updated_at";

impl SqliteStore {
    fn query_legacy(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<LegacyStudent>> {
        let sql = format!(
            "SELECT {} FROM students {} ORDER BY course_id, email",
            LEGACY_COLUMNS, filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, legacy_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RecordStore for SqliteStore {
    /// Compares parsed instants, so rows written with any RFC 3339 offset are
    /// placed correctly. Rows whose creation time cannot be read are kept so
    /// the run reports them instead of skipping them silently.
    fn query_by_time_since(&self, since: DateTime<Utc>) -> Result<Vec<LegacyStudent>> {
        let mut rows = self.query_legacy("", [])?;
        rows.retain(|s| s.created_at.map_or(true, |t| t >= since));
        Ok(rows)
    }

    fn query_by_course(&self, course_id: &str) -> Result<Vec<LegacyStudent>> {
        self.query_legacy("WHERE course_id = ?", [course_id])
    }

    fn query_all(&self) -> Result<Vec<LegacyStudent>> {
        self.query_legacy("", [])
    }

    fn get_legacy(&self, course_id: &str, email: &str) -> Result<Option<LegacyStudent>> {
        let sql = format!(
            "SELECT {} FROM students WHERE course_id = ? AND email = ?",
            LEGACY_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, [course_id, email], legacy_from_row)
            .optional()?;
        Ok(row)
    }

    fn get_migrated(&self, course_id: &str, email: &str) -> Result<Option<MigratedStudent>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, course_id, email, name, last_name, comments, team_name,
                        section_name, google_id, registration_key, created_at, updated_at
                 FROM course_students WHERE course_id = ? AND email = ?",
                [course_id, email],
                migrated_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn upsert(&mut self, s: &MigratedStudent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO course_students(id, course_id, email, name, last_name, comments,
                team_name, section_name, google_id, registration_key, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(course_id, email) DO UPDATE SET
               id = excluded.id,
               name = excluded.name,
               last_name = excluded.last_name,
               comments = excluded.comments,
               team_name = excluded.team_name,
               section_name = excluded.section_name,
               google_id = excluded.google_id,
               registration_key = excluded.registration_key,
               created_at = excluded.created_at,
               updated_at = excluded.updated_at",
            (
                &s.id,
                &s.course_id,
                &s.email,
                &s.name,
                &s.last_name,
                &s.comments,
                &s.team_name,
                &s.section_name,
                &s.google_id,
                &s.registration_key,
                format_timestamp(&s.created_at),
                format_timestamp(&s.updated_at),
            ),
        )?;
        Ok(())
    }
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp {:?}", raw).into(),
        )
    })
}

fn legacy_from_row(row: &Row) -> rusqlite::Result<LegacyStudent> {
    // Unreadable timestamps fail the record later, not the whole query.
    let created_at = row.get_ref(9)?.as_str().ok().and_then(parse_timestamp);
    let updated_at = row.get_ref(10)?.as_str().ok().and_then(parse_timestamp);
    Ok(LegacyStudent {
        course_id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        last_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        comments: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        team_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        section_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        google_id: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        registration_key: row.get(8)?,
        created_at,
        updated_at,
    })
}

fn migrated_from_row(row: &Row) -> rusqlite::Result<MigratedStudent> {
    Ok(MigratedStudent {
        id: row.get(0)?,
        course_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        last_name: row.get(4)?,
        comments: row.get(5)?,
        team_name: row.get(6)?,
        section_name: row.get(7)?,
        google_id: row.get(8)?,
        registration_key: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
        updated_at: timestamp_column(row, 11)?,
    })
}
