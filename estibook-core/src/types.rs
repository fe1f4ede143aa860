//! Core domain types for estibook
//!
//! These types represent the canonical estimate model that normalizes
//! repair estimates from all supported interchange formats, plus the
//! persisted entities that make up a claim's version chain.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **EMS** | Pipe-delimited tabular interchange format exported by estimating systems |
//! | **BMS** | XML interchange format; parsed by an external service into the same canonical shape |
//! | **Canonical Estimate** | Format-agnostic, immutable in-memory representation of one estimate |
//! | **Supplement** | A revised estimate submitted for the same claim after the initial one |
//! | **Version chain** | The ordered, append-only sequence of [`EstimateVersion`] records for one claim |
//! | **Composite key** | Multi-field tuple used as a stand-in line identity when diffing two versions |
//!
//! The canonical shape is the contract boundary between parsers: whether
//! the EMS parser in this crate or the external BMS one produced it,
//! downstream diffing and persistence behave identically.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================
// Source format
// ============================================

/// Interchange format an estimate file arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Pipe-delimited tabular export
    Ems,
    /// XML export (parsed by an external collaborator)
    Bms,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Ems => "ems",
            SourceFormat::Bms => "bms",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ems" => Ok(SourceFormat::Ems),
            "bms" => Ok(SourceFormat::Bms),
            _ => Err(format!("unknown source format: {}", s)),
        }
    }
}

// ============================================
// Canonical estimate
// ============================================

/// Customer named on the estimate. Estimating systems routinely omit
/// fields, so everything is optional and resolved once here rather than
/// ad hoc at call sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Insurance carrier name as written on the estimate
    pub insurance_carrier: Option<String>,
}

impl CustomerInfo {
    /// True when neither name part is present
    pub fn is_anonymous(&self) -> bool {
        self.last_name.is_none() && self.first_name.is_none()
    }
}

/// Vehicle under repair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub vin: Option<String>,
    pub license_plate: Option<String>,
    pub mileage: Option<i64>,
    pub color: Option<String>,
}

/// Insurance claim details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimInfo {
    pub claim_number: Option<String>,
    pub policy_number: Option<String>,
    /// Date of loss as written in the source file (not normalized)
    pub loss_date: Option<String>,
    pub adjuster_name: Option<String>,
    pub adjuster_phone: Option<String>,
    pub deductible: Decimal,
    pub deductible_type: Option<String>,
}

/// One replacement-part line on an estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartLine {
    pub line_number: i32,
    pub description: String,
    /// OEM/aftermarket part number; frequently absent or reused across
    /// dissimilar lines, which is why it is never a line identity on its own
    pub part_number: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub extended_price: Decimal,
}

/// Category of labor on a labor line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaborType {
    Body,
    Paint,
    Frame,
    Mechanical,
    Glass,
    /// Unrecognized wire codes land here rather than failing the record
    Other,
}

impl LaborType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaborType::Body => "body",
            LaborType::Paint => "paint",
            LaborType::Frame => "frame",
            LaborType::Mechanical => "mechanical",
            LaborType::Glass => "glass",
            LaborType::Other => "other",
        }
    }

    /// Lenient mapping from a wire code (`BODY`, `paint`, `MECH`, ...)
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "BODY" => LaborType::Body,
            "PAINT" | "REFINISH" => LaborType::Paint,
            "FRAME" | "STRUCTURAL" => LaborType::Frame,
            "MECH" | "MECHANICAL" => LaborType::Mechanical,
            "GLASS" => LaborType::Glass,
            _ => LaborType::Other,
        }
    }
}

impl std::str::FromStr for LaborType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "body" => Ok(LaborType::Body),
            "paint" => Ok(LaborType::Paint),
            "frame" => Ok(LaborType::Frame),
            "mechanical" => Ok(LaborType::Mechanical),
            "glass" => Ok(LaborType::Glass),
            "other" => Ok(LaborType::Other),
            _ => Err(format!("unknown labor type: {}", s)),
        }
    }
}

/// One labor operation line on an estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborLine {
    pub line_number: i32,
    pub labor_type: LaborType,
    /// Operation code (`R&I`, `REFINISH`, `R&R Bumper`, ...)
    pub operation: String,
    pub description: String,
    pub hours: Decimal,
    pub rate: Decimal,
    pub extended_price: Decimal,
}

/// Estimate-level financial totals, exactly as supplied by the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub parts_total: Decimal,
    pub labor_total: Decimal,
    pub materials_total: Decimal,
    pub tax_total: Decimal,
    pub deductible: Decimal,
    pub grand_total: Decimal,
}

/// Provenance of a parsed estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateMetadata {
    pub source_format: SourceFormat,
    /// When this crate parsed the file
    pub parsed_at: DateTime<Utc>,
    /// Raw line count of the source file, including blank and skipped lines
    pub raw_line_count: usize,
    /// Estimating system named in the header record, if any
    pub estimating_system: Option<String>,
    /// Vendor-side estimate reference from the header record, if any
    pub estimate_ref: Option<String>,
}

/// The format-agnostic, normalized representation of one repair estimate.
///
/// Built once by a parser and immutable afterwards; diffing and persistence
/// only ever read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEstimate {
    pub customer: CustomerInfo,
    pub vehicle: VehicleInfo,
    pub claim: ClaimInfo,
    pub parts: Vec<PartLine>,
    pub labor: Vec<LaborLine>,
    pub financial: FinancialSummary,
    pub notes: Vec<String>,
    pub metadata: EstimateMetadata,
}

// ============================================
// Version chain (persisted)
// ============================================

/// Why a version exists in a claim's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionReason {
    /// First estimate imported for the claim
    Initial,
    /// Re-import of a revised estimate for the same claim
    Supplement,
}

impl RevisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionReason::Initial => "initial",
            RevisionReason::Supplement => "supplement",
        }
    }
}

impl std::str::FromStr for RevisionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(RevisionReason::Initial),
            "supplement" => Ok(RevisionReason::Supplement),
            _ => Err(format!("unknown revision reason: {}", s)),
        }
    }
}

/// Aggregate description of how one version differs from its predecessor.
///
/// Stored on the version row; the per-line detail lives in
/// [`LineItemChange`] rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub has_changes: bool,
    /// Grand-total delta, current minus previous
    pub total_change: Decimal,
    /// Grand-total delta as a percentage of the previous grand total;
    /// zero when the previous total was not positive
    pub percent_change: Decimal,
    pub items_added: usize,
    pub items_removed: usize,
    pub items_modified: usize,
}

/// One immutable entry in a claim's version chain.
///
/// Created exactly once at import time and never mutated or deleted by
/// normal operation. `version_number` is strictly increasing per claim,
/// starting at 1, assigned exactly once, never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateVersion {
    /// Database ID (auto-incremented)
    pub id: i64,
    /// Claim this version belongs to (owned by an external service)
    pub claim_id: String,
    /// Repair-order/job reference (owned by an external service)
    pub job_id: Option<String>,
    pub version_number: i32,
    pub revision_reason: RevisionReason,
    pub source_format: SourceFormat,
    /// Full canonical estimate, stored verbatim for audit/replay
    pub snapshot: CanonicalEstimate,
    /// SHA-256 of the stored snapshot JSON
    pub snapshot_sha256: String,
    /// `None` for version 1
    pub diff_summary: Option<DiffSummary>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Line item changes (persisted)
// ============================================

/// Which collection a changed line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Part,
    Labor,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Part => "part",
            ItemType::Labor => "labor",
        }
    }
}

impl std::str::FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "part" => Ok(ItemType::Part),
            "labor" => Ok(ItemType::Labor),
            _ => Err(format!("unknown item type: {}", s)),
        }
    }
}

/// How a line changed between two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ChangeType::Added),
            "removed" => Ok(ChangeType::Removed),
            "modified" => Ok(ChangeType::Modified),
            _ => Err(format!("unknown change type: {}", s)),
        }
    }
}

/// One persisted line-level change, written alongside a supplement version
/// and never updated afterward.
///
/// `previous_*`/`current_*` pairs are populated according to the change
/// type (added lines have no previous side, removed lines no current
/// side); each `*_change` delta is present only when that field actually
/// changed. `price` holds the unit price for parts and the hourly rate for
/// labor; `hours` applies to labor lines only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemChange {
    /// Database ID (auto-incremented; zero until stored)
    pub id: i64,
    /// Version this change row belongs to (zero until stored)
    pub version_id: i64,
    pub line_number: i32,
    pub item_type: ItemType,
    pub change_type: ChangeType,
    pub description: String,

    pub previous_quantity: Option<Decimal>,
    pub current_quantity: Option<Decimal>,
    pub quantity_change: Option<Decimal>,

    pub previous_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub price_change: Option<Decimal>,

    pub previous_hours: Option<Decimal>,
    pub current_hours: Option<Decimal>,
    pub hours_change: Option<Decimal>,

    pub previous_extended: Option<Decimal>,
    pub current_extended: Option<Decimal>,
    pub extended_change: Option<Decimal>,
}
