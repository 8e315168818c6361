//! Named query catalog standing in for server-side stored procedures.
//!
//! A procedure is a single `SELECT` statement stored under a name in the
//! `stored_procedures` table. Callers execute it by name and never see its body.

use super::DbResult;
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) const SELECT_BODY_SQL: &str = "SELECT body FROM stored_procedures WHERE name = ?1;";

/// Creates or replaces the procedure stored under `name`.
pub fn define_procedure(conn: &Connection, name: &str, body: &str) -> DbResult<()> {
    conn.execute(
        "INSERT INTO stored_procedures (name, body) VALUES (?1, ?2)
         ON CONFLICT (name) DO UPDATE SET body = excluded.body;",
        params![name, body],
    )?;
    Ok(())
}

/// Removes a procedure. Returns whether one existed.
pub fn drop_procedure(conn: &Connection, name: &str) -> DbResult<bool> {
    let removed = conn.execute("DELETE FROM stored_procedures WHERE name = ?1;", [name])?;
    Ok(removed > 0)
}

/// Returns the stored body for `name`, or `None` when it is not defined.
pub fn procedure_body(conn: &Connection, name: &str) -> DbResult<Option<String>> {
    let body = conn
        .query_row(SELECT_BODY_SQL, [name], |row| row.get::<_, String>(0))
        .optional()?;
    Ok(body)
}
