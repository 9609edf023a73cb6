//! Extension registry keys (spec.md §6): `classVersion` and `version`.
//!
//! `classVersion` tracks this crate's own on-disk schema revision. A
//! mismatch drops and rebuilds the backing tables. `version` is the caller's
//! config version; a mismatch triggers a full repopulation while keeping
//! the tables (their contents are simply overwritten row by row).

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;

/// Current on-disk schema revision for this crate's tables. Mirrors the
/// teacher's `classVersion` history: 1→2 dropped a standalone map table,
/// 2→3 expanded a single metadata blob into the columnar page-table schema
/// used here from the start, so this crate begins at 3.
pub const CLASS_VERSION: i64 = 3;

/// Outcome of reconciling the on-disk registry against [`CLASS_VERSION`]
/// and the caller's [`Config::version`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryAction {
    /// Tables matched both versions; nothing to do.
    UpToDate,
    /// `classVersion` mismatched; tables were dropped and recreated empty.
    DroppedAndRebuilt,
    /// `version` mismatched; tables are kept but the caller must
    /// repopulate every row.
    NeedsRepopulate,
}

/// Ensures the registry table exists and reconciles stored versions against
/// `config`, dropping/recreating the view's tables on a `classVersion`
/// mismatch.
pub fn reconcile(conn: &Connection, config: &Config) -> Result<RegistryAction> {
    let registry_table = config.registry_table();
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {registry_table} (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )"
        ),
        [],
    )?;

    let stored_class_version: Option<i64> = conn
        .query_row(
            &format!("SELECT value FROM {registry_table} WHERE key = 'classVersion'"),
            [],
            |row| row.get(0),
        )
        .ok();

    if stored_class_version != Some(CLASS_VERSION) {
        warn!(
            view = %config.name,
            stored = ?stored_class_version,
            current = CLASS_VERSION,
            "classVersion mismatch, dropping and rebuilding ordered view tables"
        );
        conn.execute(&format!("DROP TABLE IF EXISTS {}", config.map_table()), [])?;
        conn.execute(&format!("DROP TABLE IF EXISTS {}", config.page_table()), [])?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {registry_table} (key, value) VALUES ('classVersion', ?1)"
            ),
            params![CLASS_VERSION],
        )?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {registry_table} (key, value) VALUES ('version', ?1)"
            ),
            params![config.version],
        )?;
        return Ok(RegistryAction::DroppedAndRebuilt);
    }

    let stored_version: Option<i64> = conn
        .query_row(
            &format!("SELECT value FROM {registry_table} WHERE key = 'version'"),
            [],
            |row| row.get(0),
        )
        .ok();

    if stored_version != Some(config.version) {
        debug!(
            view = %config.name,
            stored = ?stored_version,
            current = config.version,
            "version mismatch, repopulation required"
        );
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {registry_table} (key, value) VALUES ('version', ?1)"
            ),
            params![config.version],
        )?;
        return Ok(RegistryAction::NeedsRepopulate);
    }

    Ok(RegistryAction::UpToDate)
}
