//! Decimal helpers for money and quantity fields.
//!
//! Every financial amount in the canonical model is a [`Decimal`]; binary
//! floating point never touches money. Comparisons use [`CENT`] as the
//! tolerance so sub-cent noise from upstream systems never registers as a
//! change.

use rust_decimal::Decimal;

/// Comparison tolerance for money fields: one cent (0.01).
pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Parse a lenient monetary/quantity field.
///
/// Strips every character except digits, `.` and `-` before parsing, so
/// `"$1,234.50"` becomes `1234.50`. Empty or unparseable input yields zero;
/// this function never fails. Estimating systems disagree on currency
/// formatting, and a single bad amount must not abort an import.
pub fn parse_decimal(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    cleaned.parse().unwrap_or(Decimal::ZERO)
}

/// True when two amounts differ by at most one cent.
pub fn within_cent(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= CENT
}
