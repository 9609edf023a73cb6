//! DDL for the two backing tables (spec.md §6).

use rusqlite::Connection;

use crate::config::Config;
use crate::error::Result;

/// Creates `map_<name>` and `page_<name>` if they do not already exist.
pub fn ensure_tables(conn: &Connection, config: &Config) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                rowid INTEGER PRIMARY KEY,
                pageKey TEXT NOT NULL
            )",
            config.map_table()
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                pageKey TEXT PRIMARY KEY,
                \"group\" TEXT NOT NULL,
                prevPageKey TEXT,
                count INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
            config.page_table()
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_group ON {0} (\"group\")",
            config.page_table()
        ),
        [],
    )?;
    Ok(())
}
