//! Integration tests for the estimate import and version-diff pipeline
//!
//! These tests use fixture files in `tests/fixtures/ems/` to verify the
//! end-to-end parse → validate → diff → persist flow.

use estibook_core::db::Database;
use estibook_core::diff;
use estibook_core::ingest::parsers::EmsParser;
use estibook_core::ingest::{EstimateParser, ImportCoordinator};
use estibook_core::types::{ChangeType, ItemType, LaborType, RevisionReason, SourceFormat};
use estibook_core::Error;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/ems")
        .join(name)
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("fixture should be readable")
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn temp_coordinator() -> (TempDir, ImportCoordinator) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(&temp_dir.path().join("estimates.db")).expect("database should open");
    db.migrate().expect("migrations should run");
    (temp_dir, ImportCoordinator::new(db))
}

// ============================================
// Parsing
// ============================================

#[test]
fn test_parse_initial_fixture() {
    let output = EmsParser::new()
        .parse(&fixture("initial.txt"))
        .expect("parse should succeed");
    assert!(output.warnings.is_empty());

    let estimate = &output.estimate;
    assert_eq!(estimate.customer.last_name.as_deref(), Some("Alvarez"));
    assert_eq!(estimate.customer.first_name.as_deref(), Some("Marisol"));
    assert_eq!(
        estimate.customer.insurance_carrier.as_deref(),
        Some("Pacific Mutual Insurance")
    );

    assert_eq!(estimate.vehicle.year, Some(2019));
    assert_eq!(estimate.vehicle.make.as_deref(), Some("Honda"));
    assert_eq!(estimate.vehicle.model.as_deref(), Some("Accord"));
    assert_eq!(estimate.vehicle.vin.as_deref(), Some("1HGCV1F34KA038021"));
    assert_eq!(estimate.vehicle.mileage, Some(42318));

    assert_eq!(estimate.claim.claim_number.as_deref(), Some("CLM-2024-00317"));
    assert_eq!(estimate.claim.policy_number.as_deref(), Some("PM-88120045"));
    assert_eq!(estimate.claim.deductible, dec("500.00"));

    assert_eq!(estimate.parts.len(), 2);
    assert_eq!(estimate.parts[0].part_number.as_deref(), Some("71101-TVA-A50"));
    assert_eq!(estimate.parts[0].unit_price, dec("412.50"));
    assert_eq!(estimate.parts[0].extended_price, dec("412.50"));

    assert_eq!(estimate.labor.len(), 2);
    assert_eq!(estimate.labor[0].labor_type, LaborType::Body);
    assert_eq!(estimate.labor[1].labor_type, LaborType::Paint);
    assert_eq!(estimate.labor[1].hours, dec("3.0"));

    assert_eq!(estimate.financial.parts_total, dec("702.49"));
    assert_eq!(estimate.financial.labor_total, dec("301.00"));
    assert_eq!(estimate.financial.materials_total, dec("96.00"));
    assert_eq!(estimate.financial.tax_total, dec("87.96"));
    assert_eq!(estimate.financial.grand_total, dec("1187.45"));

    assert_eq!(estimate.notes.len(), 1);
    assert_eq!(estimate.metadata.source_format, SourceFormat::Ems);
    assert_eq!(
        estimate.metadata.estimating_system.as_deref(),
        Some("Mitchell UltraMate")
    );
    assert_eq!(estimate.metadata.raw_line_count, 12);
}

#[test]
fn test_round_trip_financial_identity() {
    let output = EmsParser::new().parse(&fixture("initial.txt")).unwrap();
    let financial = &output.estimate.financial;
    let computed = financial.parts_total
        + financial.labor_total
        + financial.materials_total
        + financial.tax_total;
    assert!((computed - financial.grand_total).abs() <= dec("0.01"));
}

#[test]
fn test_unknown_record_tolerance() {
    let clean = EmsParser::new().parse(&fixture("initial.txt")).unwrap();
    let noisy = EmsParser::new()
        .parse(&fixture("with-unknown-records.txt"))
        .unwrap();

    // Two unrecognized vendor records were warned about
    assert_eq!(noisy.warnings.len(), 2);
    assert!(noisy.warnings.iter().any(|w| w.contains("ZZQ")));
    assert!(noisy.warnings.iter().any(|w| w.contains("RATES")));

    // The canonical content is identical to the clean file
    assert_eq!(noisy.estimate.customer, clean.estimate.customer);
    assert_eq!(noisy.estimate.vehicle, clean.estimate.vehicle);
    assert_eq!(noisy.estimate.claim, clean.estimate.claim);
    assert_eq!(noisy.estimate.parts, clean.estimate.parts);
    assert_eq!(noisy.estimate.labor, clean.estimate.labor);
    assert_eq!(noisy.estimate.financial, clean.estimate.financial);
    assert_eq!(noisy.estimate.notes, clean.estimate.notes);
}

#[test]
fn test_diff_of_estimate_with_itself_is_empty() {
    let output = EmsParser::new().parse(&fixture("initial.txt")).unwrap();
    let d = diff::diff(&output.estimate, &output.estimate);

    assert!(!d.summary.has_changes);
    assert_eq!(d.summary.total_change, Decimal::ZERO);
    assert!(d.parts.added.is_empty());
    assert!(d.parts.removed.is_empty());
    assert!(d.parts.modified.is_empty());
    assert!(d.labor.modified.is_empty());
}

// ============================================
// Full pipeline
// ============================================

#[test]
fn test_full_import_pipeline() {
    let (_tmp, coordinator) = temp_coordinator();

    // Initial import: version 1, no diff
    let first = coordinator
        .import("CLM-2024-00317", Some("RO-1182"), &fixture("initial.txt"))
        .expect("initial import should succeed");
    assert_eq!(first.version.version_number, 1);
    assert_eq!(first.version.revision_reason, RevisionReason::Initial);
    assert!(first.diff.is_none());
    assert!(first.version.diff_summary.is_none());
    assert!(first.validation.is_valid());

    // Supplement import: version 2 with a diff against version 1
    let second = coordinator
        .import("CLM-2024-00317", Some("RO-1182"), &fixture("supplement.txt"))
        .expect("supplement import should succeed");
    assert_eq!(second.version.version_number, 2);
    assert_eq!(second.version.revision_reason, RevisionReason::Supplement);

    let d = second.diff.as_ref().expect("supplement should carry a diff");
    assert!(d.summary.has_changes);
    assert_eq!(d.summary.items_added, 1);
    assert_eq!(d.summary.items_removed, 1);
    assert_eq!(d.summary.items_modified, 1);
    assert_eq!(d.summary.total_change, dec("-39.00"));
    assert_eq!(d.summary.percent_change, dec("-3.28"));

    // Bumper cover price went up
    assert_eq!(d.parts.modified.len(), 1);
    let price = d.parts.modified[0].unit_price.as_ref().unwrap();
    assert_eq!(price.from, dec("412.50"));
    assert_eq!(price.to, dec("455.00"));
    assert_eq!(price.change, dec("42.50"));

    // Absorber added, refinish labor dropped
    assert_eq!(d.parts.added.len(), 1);
    assert_eq!(d.parts.added[0].description, "Bumper absorber");
    assert_eq!(d.labor.removed.len(), 1);
    assert_eq!(d.labor.removed[0].operation, "REFINISH");
    assert_eq!(d.totals.labor_change, dec("-156.00"));
}

#[test]
fn test_history_and_changes_retrieval() {
    let (_tmp, coordinator) = temp_coordinator();
    coordinator
        .import("CLM-2024-00317", None, &fixture("initial.txt"))
        .unwrap();
    let second = coordinator
        .import("CLM-2024-00317", None, &fixture("supplement.txt"))
        .unwrap();

    let db = coordinator.database();
    let history = db.get_history("CLM-2024-00317").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version_number, 1);
    assert_eq!(history[1].version_number, 2);
    // The stored snapshot is the estimate verbatim
    assert_eq!(history[1].snapshot.parts, second.estimate.parts);
    assert_eq!(history[1].snapshot_sha256, second.version.snapshot_sha256);
    assert_eq!(history[1].snapshot_sha256.len(), 64);

    // Change rows come back ordered by line number
    let changes = db.get_changes(second.version.id).unwrap();
    assert_eq!(changes.len(), 3);

    assert_eq!(changes[0].line_number, 1);
    assert_eq!(changes[0].item_type, ItemType::Part);
    assert_eq!(changes[0].change_type, ChangeType::Modified);
    assert_eq!(changes[0].price_change, Some(dec("42.50")));

    assert_eq!(changes[1].line_number, 2);
    assert_eq!(changes[1].item_type, ItemType::Labor);
    assert_eq!(changes[1].change_type, ChangeType::Removed);
    assert_eq!(changes[1].extended_change, Some(dec("-156.00")));

    assert_eq!(changes[2].line_number, 3);
    assert_eq!(changes[2].item_type, ItemType::Part);
    assert_eq!(changes[2].change_type, ChangeType::Added);
    assert_eq!(changes[2].current_extended, Some(dec("74.50")));

    // Version 1 recorded no line changes
    let first_id = history[0].id;
    assert!(db.get_changes(first_id).unwrap().is_empty());
}

#[test]
fn test_monotonic_versioning_over_repeated_imports() {
    let (_tmp, coordinator) = temp_coordinator();

    for _ in 0..5 {
        coordinator
            .import("CLM-2024-00317", None, &fixture("initial.txt"))
            .expect("import should succeed");
    }

    let history = coordinator.database().get_history("CLM-2024-00317").unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    // Re-importing identical content is a supplement with no changes
    let last = &history[4];
    assert_eq!(last.revision_reason, RevisionReason::Supplement);
    let summary = last.diff_summary.as_ref().unwrap();
    assert!(!summary.has_changes);
    assert_eq!(summary.items_added, 0);
}

#[test]
fn test_concurrent_imports_serialize_version_numbers() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(&temp_dir.path().join("estimates.db")).unwrap();
    db.migrate().unwrap();
    // Enough headroom that no thread exhausts its retries
    let coordinator = ImportCoordinator::with_config(
        db,
        &estibook_core::config::ImportConfig {
            version_retry_limit: 16,
        },
    );

    let content = fixture("initial.txt");
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                coordinator
                    .import("CLM-2024-00317", None, &content)
                    .expect("concurrent import should settle after retries");
            });
        }
    });

    // After all retries settle the chain is gap-free and duplicate-free
    let history = coordinator.database().get_history("CLM-2024-00317").unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);

    // Whichever import landed first is the initial version; the losers
    // recomputed their diffs against the freshly created latest
    assert_eq!(history[0].revision_reason, RevisionReason::Initial);
    for version in &history[1..] {
        assert_eq!(version.revision_reason, RevisionReason::Supplement);
        assert!(version.diff_summary.is_some());
    }
}

#[test]
fn test_degraded_estimate_still_imports() {
    let (_tmp, coordinator) = temp_coordinator();

    // Parseable, but no customer, no vehicle, no totals
    let outcome = coordinator
        .import("CLM-X", None, "PRT|1|A1|Mystery part|1|50.00\n")
        .expect("degraded import should still succeed");

    assert!(!outcome.validation.is_valid());
    assert!(outcome.validation.confidence < 1.0);
    assert_eq!(outcome.version.version_number, 1);
    assert_eq!(outcome.estimate.parts.len(), 1);
}

#[test]
fn test_unparseable_input_is_a_typed_failure() {
    let (_tmp, coordinator) = temp_coordinator();
    let err = coordinator
        .import("CLM-X", None, "complete nonsense\nwithout any records\n")
        .unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));

    // Nothing was persisted
    assert!(coordinator.database().get_history("CLM-X").unwrap().is_empty());
}

// ============================================
// BMS boundary
// ============================================

#[test]
fn test_bms_content_is_not_parsed_here() {
    let (_tmp, coordinator) = temp_coordinator();
    let err = coordinator
        .import("CLM-X", None, "<?xml version=\"1.0\"?><Estimate/>")
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(SourceFormat::Bms)));
}

#[test]
fn test_externally_parsed_estimate_imports() {
    let (_tmp, coordinator) = temp_coordinator();

    // Stand in for the external BMS parser: same canonical shape,
    // different source format tag
    let mut estimate = EmsParser::new()
        .parse(&fixture("initial.txt"))
        .unwrap()
        .estimate;
    estimate.metadata.source_format = SourceFormat::Bms;

    let outcome = coordinator
        .import_parsed("CLM-2024-00317", None, estimate)
        .expect("import_parsed should succeed");
    assert_eq!(outcome.version.version_number, 1);
    assert_eq!(outcome.version.source_format, SourceFormat::Bms);

    // A later EMS supplement diffs against the BMS-sourced version
    let second = coordinator
        .import("CLM-2024-00317", None, &fixture("supplement.txt"))
        .unwrap();
    assert_eq!(second.version.version_number, 2);
    assert_eq!(second.diff.unwrap().summary.total_change, dec("-39.00"));
}
