//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: version chain + line item changes
    r#"
    -- One row per imported estimate version. Append-only: rows are never
    -- updated or deleted by normal operation.
    CREATE TABLE IF NOT EXISTS estimate_versions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        claim_id         TEXT NOT NULL,
        job_id           TEXT,
        version_number   INTEGER NOT NULL,
        revision_reason  TEXT NOT NULL,      -- 'initial', 'supplement'
        source_format    TEXT NOT NULL,      -- 'ems', 'bms'

        -- Lossless capture: the canonical estimate, verbatim
        snapshot         JSON NOT NULL,
        snapshot_sha256  TEXT NOT NULL,

        -- NULL for version 1
        diff_summary     JSON,

        created_at       DATETIME NOT NULL,

        UNIQUE(claim_id, version_number)
    );

    CREATE INDEX IF NOT EXISTS idx_versions_claim
        ON estimate_versions(claim_id, version_number);

    -- One row per added/removed/modified line, written alongside a
    -- supplement version. Decimal columns are TEXT for exact round-trips.
    CREATE TABLE IF NOT EXISTS line_item_changes (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        version_id        INTEGER NOT NULL REFERENCES estimate_versions(id),
        line_number       INTEGER NOT NULL,
        item_type         TEXT NOT NULL,     -- 'part', 'labor'
        change_type       TEXT NOT NULL,     -- 'added', 'removed', 'modified'
        description       TEXT NOT NULL,

        previous_quantity TEXT,
        current_quantity  TEXT,
        quantity_change   TEXT,

        previous_price    TEXT,
        current_price     TEXT,
        price_change      TEXT,

        previous_hours    TEXT,
        current_hours     TEXT,
        hours_change      TEXT,

        previous_extended TEXT,
        current_extended  TEXT,
        extended_change   TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_changes_version
        ON line_item_changes(version_id, line_number);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
