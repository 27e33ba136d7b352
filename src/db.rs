use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "students.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

/// Opens an existing workspace database. Never creates one.
pub fn open_existing_db(workspace: &Path) -> anyhow::Result<Connection> {
    let path = db_path(workspace);
    if !path.is_file() {
        anyhow::bail!("database not found: {}", path.to_string_lossy());
    }
    let conn = Connection::open(&path)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            course_id TEXT NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            last_name TEXT,
            comments TEXT,
            team_name TEXT,
            section_name TEXT,
            google_id TEXT,
            registration_key TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(course_id, email)
        )",
        [],
    )?;

    // Legacy tables predating sections and update tracking lack these columns.
    ensure_students_section_name(conn)?;
    ensure_students_updated_at(conn)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_created_at ON students(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_students(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            comments TEXT NOT NULL,
            team_name TEXT NOT NULL,
            section_name TEXT NOT NULL,
            google_id TEXT NOT NULL,
            registration_key TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(course_id, email)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_students_course ON course_students(course_id)",
        [],
    )?;

    Ok(())
}

fn ensure_students_section_name(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "section_name")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN section_name TEXT", [])?;
    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
