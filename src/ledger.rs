use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: String,
    pub applied_at: DateTime<Utc>,
}

pub fn ensure_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations(
            migration_id TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn has_applied(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM schema_migrations WHERE migration_id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// Plain INSERT: a racing writer of the same id must surface as a PK violation.
pub fn mark_applied(conn: &Connection, id: &str, at: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations(migration_id, applied_at) VALUES(?, ?)",
        (id, at),
    )?;
    Ok(())
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<MigrationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT migration_id, applied_at FROM schema_migrations ORDER BY applied_at, migration_id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(MigrationRecord {
                id: r.get(0)?,
                applied_at: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
