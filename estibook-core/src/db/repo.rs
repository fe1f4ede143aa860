//! Version store repository
//!
//! Persists the append-only version chain for each claim and the
//! per-line-item change rows that accompany supplement versions.
//!
//! ## Version numbering
//!
//! `version_number` is strictly increasing per claim with no gaps or
//! reuse. Assignment happens inside a `BEGIN IMMEDIATE` transaction that
//! reads the current maximum under the write lock; callers pass the
//! version number their diff was computed against (`expected_parent`), and
//! a mismatch (another import landed first) returns
//! [`Error::VersionConflict`] so the caller can recompute against the new
//! latest and retry. The `UNIQUE(claim_id, version_number)` index backstops
//! the check.

use crate::diff::EstimateDiff;
use crate::error::{Error, Result};
use crate::types::{
    CanonicalEstimate, ChangeType, EstimateVersion, ItemType, LineItemChange, RevisionReason,
    SourceFormat,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Version chain writes
    // ============================================

    /// Persist the next version in a claim's chain.
    ///
    /// Reads the current maximum version number for the claim (0 when the
    /// chain is empty) and assigns `max + 1`. `expected_parent` is the
    /// version number the caller's diff was computed against; when the
    /// stored maximum has moved past it, nothing is written and
    /// [`Error::VersionConflict`] is returned. The version row and its
    /// change rows commit in one transaction.
    pub fn save_version(
        &self,
        claim_id: &str,
        job_id: Option<&str>,
        estimate: &CanonicalEstimate,
        diff: Option<&EstimateDiff>,
        reason: RevisionReason,
        expected_parent: i32,
    ) -> Result<EstimateVersion> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_max: i32 = tx.query_row(
            "SELECT COALESCE(MAX(version_number), 0) FROM estimate_versions WHERE claim_id = ?",
            [claim_id],
            |r| r.get(0),
        )?;
        if current_max != expected_parent {
            return Err(Error::VersionConflict {
                claim_id: claim_id.to_string(),
                expected: expected_parent,
                found: current_max,
            });
        }
        let version_number = current_max + 1;

        let snapshot_json = serde_json::to_string(estimate)?;
        let snapshot_sha256 = hex::encode(Sha256::digest(snapshot_json.as_bytes()));
        let diff_summary = diff.map(|d| d.summary.clone());
        let summary_json = match &diff_summary {
            Some(summary) => Some(serde_json::to_string(summary)?),
            None => None,
        };
        let created_at = Utc::now();

        let inserted = tx.execute(
            r#"
            INSERT INTO estimate_versions
                (claim_id, job_id, version_number, revision_reason, source_format,
                 snapshot, snapshot_sha256, diff_summary, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                claim_id,
                job_id,
                version_number,
                reason.as_str(),
                estimate.metadata.source_format.as_str(),
                snapshot_json,
                snapshot_sha256,
                summary_json,
                created_at.to_rfc3339(),
            ],
        );
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(Error::VersionConflict {
                    claim_id: claim_id.to_string(),
                    expected: expected_parent,
                    found: version_number,
                });
            }
            return Err(e.into());
        }
        let version_id = tx.last_insert_rowid();

        if let Some(diff) = diff {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO line_item_changes
                    (version_id, line_number, item_type, change_type, description,
                     previous_quantity, current_quantity, quantity_change,
                     previous_price, current_price, price_change,
                     previous_hours, current_hours, hours_change,
                     previous_extended, current_extended, extended_change)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
            )?;
            for row in diff.change_rows() {
                stmt.execute(params![
                    version_id,
                    row.line_number,
                    row.item_type.as_str(),
                    row.change_type.as_str(),
                    row.description,
                    dec_opt(row.previous_quantity),
                    dec_opt(row.current_quantity),
                    dec_opt(row.quantity_change),
                    dec_opt(row.previous_price),
                    dec_opt(row.current_price),
                    dec_opt(row.price_change),
                    dec_opt(row.previous_hours),
                    dec_opt(row.current_hours),
                    dec_opt(row.hours_change),
                    dec_opt(row.previous_extended),
                    dec_opt(row.current_extended),
                    dec_opt(row.extended_change),
                ])?;
            }
        }

        tx.commit()?;

        Ok(EstimateVersion {
            id: version_id,
            claim_id: claim_id.to_string(),
            job_id: job_id.map(|s| s.to_string()),
            version_number,
            revision_reason: reason,
            source_format: estimate.metadata.source_format,
            snapshot: estimate.clone(),
            snapshot_sha256,
            diff_summary,
            created_at,
        })
    }

    // ============================================
    // Version chain reads
    // ============================================

    /// Get the version with the highest version number for a claim
    pub fn latest_version(&self, claim_id: &str) -> Result<Option<EstimateVersion>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM estimate_versions WHERE claim_id = ?
             ORDER BY version_number DESC LIMIT 1",
            [claim_id],
            Self::row_to_version,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a version by its database ID
    pub fn get_version(&self, version_id: i64) -> Result<EstimateVersion> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM estimate_versions WHERE id = ?",
            [version_id],
            Self::row_to_version,
        )
        .optional()?
        .ok_or(Error::VersionNotFound(version_id))
    }

    /// Get a claim's full version chain, ascending by version number
    pub fn get_history(&self, claim_id: &str) -> Result<Vec<EstimateVersion>> {
        let conn = self.conn.lock().unwrap();
        let versions = conn
            .prepare(
                "SELECT * FROM estimate_versions WHERE claim_id = ?
                 ORDER BY version_number ASC",
            )?
            .query_map([claim_id], Self::row_to_version)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// Get the line-item changes recorded with a version, ordered by line
    /// number
    pub fn get_changes(&self, version_id: i64) -> Result<Vec<LineItemChange>> {
        let conn = self.conn.lock().unwrap();
        let changes = conn
            .prepare(
                "SELECT * FROM line_item_changes WHERE version_id = ?
                 ORDER BY line_number ASC, id ASC",
            )?
            .query_map([version_id], Self::row_to_change)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    // ============================================
    // Row mapping
    // ============================================

    fn row_to_version(row: &Row) -> rusqlite::Result<EstimateVersion> {
        let reason_str: String = row.get("revision_reason")?;
        let format_str: String = row.get("source_format")?;
        let snapshot_str: String = row.get("snapshot")?;
        let summary_str: Option<String> = row.get("diff_summary")?;
        let created_at_str: String = row.get("created_at")?;

        // The snapshot is the audit copy; decode failure is a hard error
        let snapshot: CanonicalEstimate = serde_json::from_str(&snapshot_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(EstimateVersion {
            id: row.get("id")?,
            claim_id: row.get("claim_id")?,
            job_id: row.get("job_id")?,
            version_number: row.get("version_number")?,
            revision_reason: reason_str.parse().unwrap_or(RevisionReason::Initial),
            source_format: format_str.parse().unwrap_or(SourceFormat::Ems),
            snapshot,
            snapshot_sha256: row.get("snapshot_sha256")?,
            diff_summary: summary_str.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_change(row: &Row) -> rusqlite::Result<LineItemChange> {
        let item_type_str: String = row.get("item_type")?;
        let change_type_str: String = row.get("change_type")?;

        Ok(LineItemChange {
            id: row.get("id")?,
            version_id: row.get("version_id")?,
            line_number: row.get("line_number")?,
            item_type: item_type_str.parse().unwrap_or(ItemType::Part),
            change_type: change_type_str.parse().unwrap_or(ChangeType::Modified),
            description: row.get("description")?,
            previous_quantity: sql_dec(row, "previous_quantity")?,
            current_quantity: sql_dec(row, "current_quantity")?,
            quantity_change: sql_dec(row, "quantity_change")?,
            previous_price: sql_dec(row, "previous_price")?,
            current_price: sql_dec(row, "current_price")?,
            price_change: sql_dec(row, "price_change")?,
            previous_hours: sql_dec(row, "previous_hours")?,
            current_hours: sql_dec(row, "current_hours")?,
            hours_change: sql_dec(row, "hours_change")?,
            previous_extended: sql_dec(row, "previous_extended")?,
            current_extended: sql_dec(row, "current_extended")?,
            extended_change: sql_dec(row, "extended_change")?,
        })
    }
}

/// Decimals are stored as TEXT for exact round-trips
fn dec_opt(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn sql_dec(row: &Row, column: &str) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(column)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
