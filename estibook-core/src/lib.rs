//! # estibook-core
//!
//! Core library for estibook - estimate import and version diffing for
//! collision repair shops.
//!
//! This library provides:
//! - A canonical, format-agnostic estimate model with decimal-exact money
//! - A resilient parser for the pipe-delimited EMS interchange format
//! - A pure diff engine comparing two estimate versions field by field
//! - An append-only, monotonically-versioned store per claim (SQLite)
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Raw:** estimate file content as uploaded (EMS text; BMS/XML is
//!   parsed by an external service into the same canonical shape)
//! - **Canonical:** the immutable [`CanonicalEstimate`]
//! - **Derived:** the [`diff::EstimateDiff`] against the claim's latest
//!   stored version, decomposed into a summary plus line-item change rows
//!
//! ## Example
//!
//! ```rust,no_run
//! use estibook_core::{Config, Database, ImportCoordinator};
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let coordinator = ImportCoordinator::new(db);
//! let content = std::fs::read_to_string("estimate.ems").expect("failed to read upload");
//! let outcome = coordinator
//!     .import("CLM-2024-00317", Some("RO-1182"), &content)
//!     .expect("import failed");
//! println!(
//!     "version {} saved, confidence {:.2}",
//!     outcome.version.version_number, outcome.validation.confidence
//! );
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use ingest::{ImportCoordinator, ImportOutcome, ValidationReport};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod money;
pub mod types;
