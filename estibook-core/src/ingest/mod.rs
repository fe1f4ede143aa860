//! Import pipeline for estimate files
//!
//! This module orchestrates one estimate import end to end:
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ raw file     │ ──► │ ImportCoordinator │ ──► │    Database      │
//! │ content      │     │ parse → validate  │     │ (version chain,  │
//! └──────────────┘     │ → diff → save     │     │  line changes)   │
//!                      └───────────────────┘     └──────────────────┘
//!                              │
//!                              ▼
//!                    ┌──────────────────────┐
//!                    │  EstimateParser      │
//!                    │  └─ EmsParser        │
//!                    │  (BMS: external)     │
//!                    └──────────────────────┘
//! ```
//!
//! The diff for a supplement is always computed against the version with
//! the highest `version_number` at save time: the store's optimistic check
//! rejects a save whose diff was computed against a stale latest, and the
//! coordinator re-reads and recomputes before retrying. Two concurrent
//! imports for one claim therefore serialize, and the second one's diff is
//! against the first one's freshly created version.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use estibook_core::{Config, Database, ImportCoordinator};
//!
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//! let coordinator = ImportCoordinator::new(db);
//!
//! let outcome = coordinator.import("CLM-2024-00317", Some("RO-1182"), &content)?;
//! println!("saved version {}", outcome.version.version_number);
//! ```

mod parser;
pub mod parsers;
pub mod validate;

pub use parser::{detect_format, EstimateParser, ParseOutput};
pub use validate::{validate, ValidationReport};

use crate::config::ImportConfig;
use crate::db::Database;
use crate::diff::{self, EstimateDiff};
use crate::error::{Error, Result};
use crate::types::{CanonicalEstimate, EstimateVersion, RevisionReason};

/// Result of one estimate import.
///
/// The caller always receives the parsed estimate and its validation
/// report, even when validation found errors; only whole-file parse
/// failures and store failures withhold an outcome.
#[derive(Debug)]
pub struct ImportOutcome {
    /// The canonical estimate that was persisted
    pub estimate: CanonicalEstimate,
    /// Advisory validation findings
    pub validation: ValidationReport,
    /// Non-fatal parser warnings (unknown records, short records, ...)
    pub parse_warnings: Vec<String>,
    /// The newly created version
    pub version: EstimateVersion,
    /// Diff against the previous version; `None` for a first import
    pub diff: Option<EstimateDiff>,
}

/// Coordinates estimate imports against the version store.
pub struct ImportCoordinator {
    db: Database,
    version_retry_limit: usize,
}

impl ImportCoordinator {
    /// Create a coordinator with default import settings.
    pub fn new(db: Database) -> Self {
        Self::with_config(db, &ImportConfig::default())
    }

    /// Create a coordinator with explicit import settings.
    pub fn with_config(db: Database, config: &ImportConfig) -> Self {
        Self {
            db,
            // A save is attempted at least once regardless of config
            version_retry_limit: config.version_retry_limit.max(1),
        }
    }

    /// Borrow the underlying version store.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Import raw estimate file content for a claim.
    ///
    /// The format is sniffed from the content. BMS/XML content is not
    /// parsed by this crate; callers holding a BMS file parse it through
    /// the external service and hand the result to [`Self::import_parsed`].
    pub fn import(
        &self,
        claim_id: &str,
        job_id: Option<&str>,
        content: &str,
    ) -> Result<ImportOutcome> {
        let format = detect_format(content);
        let parser = parsers::parser_for(format).ok_or(Error::UnsupportedFormat(format))?;
        let output = parser.parse(content)?;
        self.save(claim_id, job_id, output.estimate, output.warnings)
    }

    /// Import an estimate that was already parsed into the canonical shape
    /// (e.g. by the external BMS parser).
    pub fn import_parsed(
        &self,
        claim_id: &str,
        job_id: Option<&str>,
        estimate: CanonicalEstimate,
    ) -> Result<ImportOutcome> {
        self.save(claim_id, job_id, estimate, Vec::new())
    }

    fn save(
        &self,
        claim_id: &str,
        job_id: Option<&str>,
        estimate: CanonicalEstimate,
        parse_warnings: Vec<String>,
    ) -> Result<ImportOutcome> {
        let validation = validate(&estimate);
        if !validation.is_valid() {
            tracing::warn!(
                claim_id,
                errors = ?validation.errors,
                "estimate failed validation; persisting for inspection"
            );
        }

        let mut attempts = 0;
        loop {
            attempts += 1;

            let previous = self.db.latest_version(claim_id)?;
            let (expected_parent, diff, reason) = match &previous {
                Some(prev) => (
                    prev.version_number,
                    Some(diff::diff(&prev.snapshot, &estimate)),
                    RevisionReason::Supplement,
                ),
                None => (0, None, RevisionReason::Initial),
            };

            match self
                .db
                .save_version(claim_id, job_id, &estimate, diff.as_ref(), reason, expected_parent)
            {
                Ok(version) => {
                    tracing::info!(
                        claim_id,
                        version = version.version_number,
                        reason = reason.as_str(),
                        changes = diff.as_ref().map(|d| d.summary.has_changes),
                        "estimate version saved"
                    );
                    return Ok(ImportOutcome {
                        estimate,
                        validation,
                        parse_warnings,
                        version,
                        diff,
                    });
                }
                Err(Error::VersionConflict { .. }) if attempts < self.version_retry_limit => {
                    tracing::warn!(
                        claim_id,
                        attempt = attempts,
                        "version conflict, recomputing diff against new latest"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
