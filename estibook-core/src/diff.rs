//! Estimate version diffing
//!
//! Pure functions that compare two canonical estimates (previous vs.
//! current) and produce a structured, field-level [`EstimateDiff`]. No I/O
//! happens here; the inputs are immutable and the output is freshly
//! allocated, so diffing is safe to run on any thread without locking.
//!
//! ## Line matching
//!
//! The source systems carry no persistent per-line identity, so lines are
//! matched across versions by composite key:
//!
//! - parts: `(line_number, part_number, description)`; part number alone
//!   is frequently absent or reused across dissimilar lines
//! - labor: `(line_number, operation)`
//!
//! A line that kept its description and part number but moved to a new
//! line number therefore shows up as an added+removed pair, not a move;
//! callers can phrase that as "items may have been renumbered". When two
//! lines inside the *same* estimate collide on a key, the last one wins
//! while the lookup is built: deterministic and covered by tests, not an
//! accident of map insertion order.
//!
//! Extended amounts are recomputed from `quantity × unit price` (or
//! `hours × rate`) on both sides, so a vendor-supplied extended figure
//! cannot mask a change. All field comparisons use the one-cent epsilon
//! from [`crate::money`].

use crate::money::{within_cent, CENT};
use crate::types::{
    CanonicalEstimate, ChangeType, DiffSummary, FinancialSummary, ItemType, LaborLine,
    LineItemChange, PartLine,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================
// Diff structures
// ============================================

/// How a single numeric field moved between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub from: Decimal,
    pub to: Decimal,
    /// `to - from`
    pub change: Decimal,
}

impl FieldDelta {
    /// Delta between two amounts, or `None` when they agree within a cent
    fn between(from: Decimal, to: Decimal) -> Option<Self> {
        if within_cent(from, to) {
            None
        } else {
            Some(Self {
                from,
                to,
                change: to - from,
            })
        }
    }
}

/// A part line present in both versions with at least one changed field.
///
/// Only the fields that actually changed carry a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartModification {
    pub previous: PartLine,
    pub current: PartLine,
    pub quantity: Option<FieldDelta>,
    pub unit_price: Option<FieldDelta>,
    pub extended: Option<FieldDelta>,
}

impl PartModification {
    fn has_changes(&self) -> bool {
        self.quantity.is_some() || self.unit_price.is_some() || self.extended.is_some()
    }
}

/// A labor line present in both versions with at least one changed field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaborModification {
    pub previous: LaborLine,
    pub current: LaborLine,
    pub hours: Option<FieldDelta>,
    pub rate: Option<FieldDelta>,
    pub extended: Option<FieldDelta>,
}

impl LaborModification {
    fn has_changes(&self) -> bool {
        self.hours.is_some() || self.rate.is_some() || self.extended.is_some()
    }
}

/// Classification of the parts collection across two versions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartsDiff {
    pub added: Vec<PartLine>,
    pub removed: Vec<PartLine>,
    pub modified: Vec<PartModification>,
    pub unchanged: Vec<PartLine>,
}

/// Classification of the labor collection across two versions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaborDiff {
    pub added: Vec<LaborLine>,
    pub removed: Vec<LaborLine>,
    pub modified: Vec<LaborModification>,
    pub unchanged: Vec<LaborLine>,
}

/// Per-category total movement between two versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalsDiff {
    pub previous: FinancialSummary,
    pub current: FinancialSummary,
    pub parts_change: Decimal,
    pub labor_change: Decimal,
    pub materials_change: Decimal,
    pub tax_change: Decimal,
    pub grand_change: Decimal,
}

/// Structured difference between two canonical estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateDiff {
    pub summary: DiffSummary,
    pub parts: PartsDiff,
    pub labor: LaborDiff,
    pub totals: TotalsDiff,
}

// ============================================
// Composite keys
// ============================================

fn part_key(part: &PartLine) -> String {
    format!(
        "{}|{}|{}",
        part.line_number,
        part.part_number.as_deref().unwrap_or(""),
        part.description
    )
}

fn labor_key(labor: &LaborLine) -> String {
    format!("{}|{}", labor.line_number, labor.operation)
}

fn part_extended(part: &PartLine) -> Decimal {
    part.quantity * part.unit_price
}

fn labor_extended(labor: &LaborLine) -> Decimal {
    labor.hours * labor.rate
}

// ============================================
// Diffing
// ============================================

/// Compare two canonical estimates and describe every change.
///
/// `previous` is the older version. An empty previous collection makes
/// every current line `added`; an empty current collection makes every
/// previous line `removed`.
pub fn diff(previous: &CanonicalEstimate, current: &CanonicalEstimate) -> EstimateDiff {
    let totals = diff_totals(&previous.financial, &current.financial);
    let parts = diff_parts(&previous.parts, &current.parts);
    let labor = diff_labor(&previous.labor, &current.labor);

    let items_added = parts.added.len() + labor.added.len();
    let items_removed = parts.removed.len() + labor.removed.len();
    let items_modified = parts.modified.len() + labor.modified.len();

    let percent_change = if previous.financial.grand_total > Decimal::ZERO {
        (totals.grand_change / previous.financial.grand_total * Decimal::ONE_HUNDRED).round_dp(2)
    } else {
        Decimal::ZERO
    };

    let has_changes =
        items_added + items_removed + items_modified > 0 || totals.grand_change.abs() > CENT;

    EstimateDiff {
        summary: DiffSummary {
            has_changes,
            total_change: totals.grand_change,
            percent_change,
            items_added,
            items_removed,
            items_modified,
        },
        parts,
        labor,
        totals,
    }
}

fn diff_totals(previous: &FinancialSummary, current: &FinancialSummary) -> TotalsDiff {
    TotalsDiff {
        parts_change: current.parts_total - previous.parts_total,
        labor_change: current.labor_total - previous.labor_total,
        materials_change: current.materials_total - previous.materials_total,
        tax_change: current.tax_total - previous.tax_total,
        grand_change: current.grand_total - previous.grand_total,
        previous: previous.clone(),
        current: current.clone(),
    }
}

fn diff_parts(previous: &[PartLine], current: &[PartLine]) -> PartsDiff {
    // Last-one-wins on duplicate keys within one estimate
    let mut prev_by_key: HashMap<String, &PartLine> = HashMap::new();
    for part in previous {
        prev_by_key.insert(part_key(part), part);
    }

    let mut result = PartsDiff::default();
    let mut visited: HashSet<String> = HashSet::new();

    for cur in current {
        let key = part_key(cur);
        visited.insert(key.clone());

        match prev_by_key.get(&key) {
            None => result.added.push(cur.clone()),
            Some(prev) => {
                let modification = PartModification {
                    quantity: FieldDelta::between(prev.quantity, cur.quantity),
                    unit_price: FieldDelta::between(prev.unit_price, cur.unit_price),
                    extended: FieldDelta::between(part_extended(prev), part_extended(cur)),
                    previous: (*prev).clone(),
                    current: cur.clone(),
                };
                if modification.has_changes() {
                    result.modified.push(modification);
                } else {
                    result.unchanged.push(cur.clone());
                }
            }
        }
    }

    // Previous-side keys never visited are removals; iterate the collection
    // (not the map) so output order follows the source file
    let mut emitted: HashSet<String> = HashSet::new();
    for prev in previous {
        let key = part_key(prev);
        if visited.contains(&key) || !emitted.insert(key.clone()) {
            continue;
        }
        result.removed.push((*prev_by_key[&key]).clone());
    }

    result
}

fn diff_labor(previous: &[LaborLine], current: &[LaborLine]) -> LaborDiff {
    let mut prev_by_key: HashMap<String, &LaborLine> = HashMap::new();
    for labor in previous {
        prev_by_key.insert(labor_key(labor), labor);
    }

    let mut result = LaborDiff::default();
    let mut visited: HashSet<String> = HashSet::new();

    for cur in current {
        let key = labor_key(cur);
        visited.insert(key.clone());

        match prev_by_key.get(&key) {
            None => result.added.push(cur.clone()),
            Some(prev) => {
                let modification = LaborModification {
                    hours: FieldDelta::between(prev.hours, cur.hours),
                    rate: FieldDelta::between(prev.rate, cur.rate),
                    extended: FieldDelta::between(labor_extended(prev), labor_extended(cur)),
                    previous: (*prev).clone(),
                    current: cur.clone(),
                };
                if modification.has_changes() {
                    result.modified.push(modification);
                } else {
                    result.unchanged.push(cur.clone());
                }
            }
        }
    }

    let mut emitted: HashSet<String> = HashSet::new();
    for prev in previous {
        let key = labor_key(prev);
        if visited.contains(&key) || !emitted.insert(key.clone()) {
            continue;
        }
        result.removed.push((*prev_by_key[&key]).clone());
    }

    result
}

// ============================================
// Change-row decomposition
// ============================================

impl EstimateDiff {
    /// Decompose this diff into persistable [`LineItemChange`] rows, one
    /// per added/removed/modified part and labor line. `id` and
    /// `version_id` are zero until the store assigns them.
    pub fn change_rows(&self) -> Vec<LineItemChange> {
        let mut rows = Vec::new();

        for part in &self.parts.added {
            rows.push(part_row(part, ChangeType::Added, None, Some(part)));
        }
        for part in &self.parts.removed {
            rows.push(part_row(part, ChangeType::Removed, Some(part), None));
        }
        for m in &self.parts.modified {
            let mut row = part_row(
                &m.current,
                ChangeType::Modified,
                Some(&m.previous),
                Some(&m.current),
            );
            row.quantity_change = m.quantity.as_ref().map(|d| d.change);
            row.price_change = m.unit_price.as_ref().map(|d| d.change);
            row.extended_change = m.extended.as_ref().map(|d| d.change);
            rows.push(row);
        }

        for labor in &self.labor.added {
            rows.push(labor_row(labor, ChangeType::Added, None, Some(labor)));
        }
        for labor in &self.labor.removed {
            rows.push(labor_row(labor, ChangeType::Removed, Some(labor), None));
        }
        for m in &self.labor.modified {
            let mut row = labor_row(
                &m.current,
                ChangeType::Modified,
                Some(&m.previous),
                Some(&m.current),
            );
            row.hours_change = m.hours.as_ref().map(|d| d.change);
            row.price_change = m.rate.as_ref().map(|d| d.change);
            row.extended_change = m.extended.as_ref().map(|d| d.change);
            rows.push(row);
        }

        rows
    }
}

fn empty_row(line_number: i32, item_type: ItemType, change_type: ChangeType, description: &str) -> LineItemChange {
    LineItemChange {
        id: 0,
        version_id: 0,
        line_number,
        item_type,
        change_type,
        description: description.to_string(),
        previous_quantity: None,
        current_quantity: None,
        quantity_change: None,
        previous_price: None,
        current_price: None,
        price_change: None,
        previous_hours: None,
        current_hours: None,
        hours_change: None,
        previous_extended: None,
        current_extended: None,
        extended_change: None,
    }
}

fn part_row(
    subject: &PartLine,
    change_type: ChangeType,
    previous: Option<&PartLine>,
    current: Option<&PartLine>,
) -> LineItemChange {
    let mut row = empty_row(
        subject.line_number,
        ItemType::Part,
        change_type,
        &subject.description,
    );
    if let Some(prev) = previous {
        row.previous_quantity = Some(prev.quantity);
        row.previous_price = Some(prev.unit_price);
        row.previous_extended = Some(part_extended(prev));
    }
    if let Some(cur) = current {
        row.current_quantity = Some(cur.quantity);
        row.current_price = Some(cur.unit_price);
        row.current_extended = Some(part_extended(cur));
    }
    match change_type {
        ChangeType::Added => {
            row.quantity_change = row.current_quantity;
            row.price_change = row.current_price;
            row.extended_change = row.current_extended;
        }
        ChangeType::Removed => {
            row.quantity_change = row.previous_quantity.map(|q| -q);
            row.price_change = row.previous_price.map(|p| -p);
            row.extended_change = row.previous_extended.map(|e| -e);
        }
        ChangeType::Modified => {}
    }
    row
}

fn labor_row(
    subject: &LaborLine,
    change_type: ChangeType,
    previous: Option<&LaborLine>,
    current: Option<&LaborLine>,
) -> LineItemChange {
    let mut row = empty_row(
        subject.line_number,
        ItemType::Labor,
        change_type,
        &subject.description,
    );
    if let Some(prev) = previous {
        row.previous_hours = Some(prev.hours);
        row.previous_price = Some(prev.rate);
        row.previous_extended = Some(labor_extended(prev));
    }
    if let Some(cur) = current {
        row.current_hours = Some(cur.hours);
        row.current_price = Some(cur.rate);
        row.current_extended = Some(labor_extended(cur));
    }
    match change_type {
        ChangeType::Added => {
            row.hours_change = row.current_hours;
            row.price_change = row.current_price;
            row.extended_change = row.current_extended;
        }
        ChangeType::Removed => {
            row.hours_change = row.previous_hours.map(|h| -h);
            row.price_change = row.previous_price.map(|r| -r);
            row.extended_change = row.previous_extended.map(|e| -e);
        }
        ChangeType::Modified => {}
    }
    row
}
