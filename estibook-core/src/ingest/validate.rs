//! Post-parse validation of canonical estimates
//!
//! Validation is advisory: errors mark an import invalid but never hide
//! the parsed data from the caller. Findings accumulate into a
//! [`ValidationReport`] with a confidence score the upstream import
//! service can surface to reviewers.

use crate::money::within_cent;
use crate::types::CanonicalEstimate;
use rust_decimal::Decimal;

/// Accumulated validation findings for one parsed estimate.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Findings that mark the import invalid
    pub errors: Vec<String>,
    /// Advisory findings
    pub warnings: Vec<String>,
    /// 1.0 for a clean estimate; each warning costs 0.1 and each error
    /// 0.25, floored at zero
    pub confidence: f64,
}

impl ValidationReport {
    /// True when no errors were found. Warnings alone never invalidate an
    /// import.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Inspect a parsed estimate for missing or suspicious data.
pub fn validate(estimate: &CanonicalEstimate) -> ValidationReport {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    if estimate.customer.is_anonymous() {
        warnings.push("customer name missing".to_string());
    }

    let vehicle = &estimate.vehicle;
    if vehicle.year.is_none() || vehicle.make.is_none() || vehicle.model.is_none() {
        warnings.push("vehicle year/make/model incomplete".to_string());
    }

    if estimate.parts.is_empty() && estimate.labor.is_empty() {
        warnings.push("no part or labor lines found".to_string());
    }

    let financial = &estimate.financial;
    if financial.grand_total <= Decimal::ZERO {
        errors.push(format!(
            "grand total is not positive: {}",
            financial.grand_total
        ));
    } else {
        let computed = financial.parts_total
            + financial.labor_total
            + financial.materials_total
            + financial.tax_total;
        if !within_cent(computed, financial.grand_total) {
            warnings.push(format!(
                "totals do not reconcile: categories sum to {} but grand total is {}",
                computed, financial.grand_total
            ));
        }
    }

    let confidence =
        (1.0 - 0.1 * warnings.len() as f64 - 0.25 * errors.len() as f64).max(0.0);

    ValidationReport {
        errors,
        warnings,
        confidence,
    }
}
