//! EMS (pipe-delimited) estimate parser
//!
//! The EMS interchange format is line-oriented: one record per line, fields
//! separated by `|`, with `\` escaping the next character so descriptions
//! can contain literal pipes. The first field of each record is a
//! case-insensitive record-type code:
//!
//! | Code | Record |
//! |------|--------|
//! | `HDR` | Header / estimating-system info |
//! | `VEH` | Vehicle |
//! | `CUS` | Customer |
//! | `INS` | Insurance carrier |
//! | `CLM` | Claim |
//! | `LIN` | Generic line item (routes on a PART/LABOR sub-field) |
//! | `PRT` | Parts line |
//! | `LAB` | Labor line |
//! | `TOT` | Totals (label/amount pairs) |
//! | `TAX` | Tax |
//! | `DED` | Deductible |
//! | `NTE` | Note |
//!
//! # Error Handling
//!
//! The parser is designed to be resilient and recover from errors:
//!
//! - **Unknown record codes**: logged as a warning, line skipped, parsing
//!   continues. The warning is recorded in [`ParseOutput::warnings`].
//!
//! - **Short records**: a record with fewer fields than expected populates
//!   fewer attributes; positional access is length-guarded and never
//!   indexes out of bounds.
//!
//! - **Bad numeric text**: monetary and quantity fields go through the
//!   lenient decimal parser, which defaults to zero instead of failing.
//!
//! - **Dangling escape at end of line**: the escape flag simply dies with
//!   the line; no error is raised.
//!
//! Only whole-input failure (no recognizable estimate record anywhere)
//! surfaces as [`Error::Parse`](crate::error::Error::Parse).

use crate::error::{Error, Result};
use crate::ingest::parser::{EstimateParser, ParseOutput};
use crate::money::parse_decimal;
use crate::types::{
    CanonicalEstimate, ClaimInfo, CustomerInfo, EstimateMetadata, FinancialSummary, LaborLine,
    LaborType, PartLine, SourceFormat, VehicleInfo,
};
use chrono::Utc;
use rust_decimal::Decimal;

const FIELD_DELIMITER: char = '|';
const ESCAPE: char = '\\';

/// Parser for EMS pipe-delimited estimate exports.
pub struct EmsParser;

impl EmsParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimateParser for EmsParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Ems
    }

    fn parse(&self, content: &str) -> Result<ParseOutput> {
        parse_ems(content)
    }
}

// ============================================
// Tokenizer
// ============================================

/// Split one record line into trimmed fields.
///
/// `\` escapes the following character (`\|` is a literal pipe, `\\` a
/// literal backslash). The field after the final delimiter is always
/// appended, even when empty. Never fails; a trailing unmatched escape is
/// dropped.
pub(crate) fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == ESCAPE {
            escaped = true;
        } else if ch == FIELD_DELIMITER {
            fields.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    fields.push(current.trim().to_string());

    fields
}

// ============================================
// Record dispatch
// ============================================

/// Known record-type codes. Anything else is warned about and skipped;
/// parsing is total over well-formed-but-unrecognized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Header,
    Vehicle,
    Customer,
    Insurance,
    Claim,
    LineItem,
    Part,
    Labor,
    Totals,
    Tax,
    Deductible,
    Note,
}

impl RecordKind {
    fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "HDR" => Some(RecordKind::Header),
            "VEH" => Some(RecordKind::Vehicle),
            "CUS" => Some(RecordKind::Customer),
            "INS" => Some(RecordKind::Insurance),
            "CLM" => Some(RecordKind::Claim),
            "LIN" => Some(RecordKind::LineItem),
            "PRT" => Some(RecordKind::Part),
            "LAB" => Some(RecordKind::Labor),
            "TOT" => Some(RecordKind::Totals),
            "TAX" => Some(RecordKind::Tax),
            "DED" => Some(RecordKind::Deductible),
            "NTE" => Some(RecordKind::Note),
            _ => None,
        }
    }
}

// ============================================
// Field helpers
// ============================================

/// Positional field access: present and non-empty, or `None`.
fn field(fields: &[String], idx: usize) -> Option<String> {
    fields.get(idx).filter(|s| !s.is_empty()).cloned()
}

fn decimal_field(fields: &[String], idx: usize) -> Option<Decimal> {
    field(fields, idx).map(|s| parse_decimal(&s))
}

fn int_field(fields: &[String], idx: usize) -> Option<i64> {
    field(fields, idx).and_then(|s| {
        let cleaned: String = s
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        cleaned.parse().ok()
    })
}

// ============================================
// Builder
// ============================================

/// Parse-time accumulator. Local to one `parse` call and threaded through
/// the dispatch loop; frozen into an immutable [`CanonicalEstimate`] at the
/// end.
#[derive(Default)]
struct EstimateBuilder {
    customer: CustomerInfo,
    vehicle: VehicleInfo,
    claim: ClaimInfo,
    parts: Vec<PartLine>,
    labor: Vec<LaborLine>,
    financial: FinancialSummary,
    notes: Vec<String>,
    estimating_system: Option<String>,
    estimate_ref: Option<String>,
    warnings: Vec<String>,
}

impl EstimateBuilder {
    fn apply(&mut self, kind: RecordKind, fields: &[String], line_number: usize) {
        match kind {
            RecordKind::Header => self.handle_header(fields),
            RecordKind::Vehicle => self.handle_vehicle(fields),
            RecordKind::Customer => self.handle_customer(fields),
            RecordKind::Insurance => self.handle_insurance(fields),
            RecordKind::Claim => self.handle_claim(fields),
            RecordKind::LineItem => self.handle_line_item(fields, line_number),
            RecordKind::Part => self.handle_part(&fields[1..]),
            RecordKind::Labor => self.handle_labor(&fields[1..]),
            RecordKind::Totals => self.handle_totals(fields),
            RecordKind::Tax => self.handle_tax(fields),
            RecordKind::Deductible => self.handle_deductible(fields),
            RecordKind::Note => self.handle_note(fields),
        }
    }

    /// `HDR|<estimating system>|<estimate ref>|...`
    fn handle_header(&mut self, fields: &[String]) {
        self.estimating_system = field(fields, 1);
        self.estimate_ref = field(fields, 2);
    }

    /// `VEH|<year>|<make>|<model>|<vin>|<license>|<mileage>|<color>`
    fn handle_vehicle(&mut self, fields: &[String]) {
        self.vehicle.year = int_field(fields, 1).map(|y| y as i32);
        self.vehicle.make = field(fields, 2);
        self.vehicle.model = field(fields, 3);
        self.vehicle.vin = field(fields, 4);
        self.vehicle.license_plate = field(fields, 5);
        self.vehicle.mileage = int_field(fields, 6);
        self.vehicle.color = field(fields, 7);
    }

    /// `CUS|<last name>|<first name>|<phone>|<email>`
    fn handle_customer(&mut self, fields: &[String]) {
        self.customer.last_name = field(fields, 1);
        self.customer.first_name = field(fields, 2);
        self.customer.phone = field(fields, 3);
        self.customer.email = field(fields, 4);
    }

    /// `INS|<carrier name>|<policy number>`
    fn handle_insurance(&mut self, fields: &[String]) {
        self.customer.insurance_carrier = field(fields, 1);
        if self.claim.policy_number.is_none() {
            self.claim.policy_number = field(fields, 2);
        }
    }

    /// `CLM|<claim #>|<policy #>|<loss date>|<adjuster>|<adjuster phone>|<deductible>|<deductible type>`
    fn handle_claim(&mut self, fields: &[String]) {
        self.claim.claim_number = field(fields, 1);
        if let Some(policy) = field(fields, 2) {
            self.claim.policy_number = Some(policy);
        }
        self.claim.loss_date = field(fields, 3);
        self.claim.adjuster_name = field(fields, 4);
        self.claim.adjuster_phone = field(fields, 5);
        if let Some(deductible) = decimal_field(fields, 6) {
            self.claim.deductible = deductible;
            self.financial.deductible = deductible;
        }
        self.claim.deductible_type = field(fields, 7);
    }

    /// `LIN|<line #>|<PART or LABOR>|...`: generic line item for vendors
    /// that emit a single record type; the remainder follows the `PRT` or
    /// `LAB` layout shifted by one.
    fn handle_line_item(&mut self, fields: &[String], line_number: usize) {
        match field(fields, 2).map(|k| k.to_ascii_uppercase()) {
            Some(kind) if kind == "PART" => {
                let mut shifted: Vec<String> = vec![fields[1].clone()];
                shifted.extend_from_slice(&fields[3..]);
                self.handle_part(&shifted);
            }
            Some(kind) if kind == "LABOR" => {
                let mut shifted: Vec<String> = vec![fields[1].clone()];
                shifted.extend_from_slice(&fields[3..]);
                self.handle_labor(&shifted);
            }
            Some(kind) => {
                tracing::warn!(line = line_number, kind = %kind, "unknown line item kind, skipping");
                self.warnings
                    .push(format!("line {}: unknown line item kind '{}'", line_number, kind));
            }
            None => {
                self.warnings
                    .push(format!("line {}: line item record without a kind", line_number));
            }
        }
    }

    /// Fields (after the code): `<line #>|<part number>|<description>|<quantity>|<unit price>[|<extended>]`
    fn handle_part(&mut self, fields: &[String]) {
        let quantity = decimal_field(fields, 3).unwrap_or(Decimal::ZERO);
        let unit_price = decimal_field(fields, 4).unwrap_or(Decimal::ZERO);
        let extended_price =
            decimal_field(fields, 5).unwrap_or_else(|| quantity * unit_price);

        self.parts.push(PartLine {
            line_number: int_field(fields, 0).unwrap_or(0) as i32,
            part_number: field(fields, 1),
            description: field(fields, 2).unwrap_or_default(),
            quantity,
            unit_price,
            extended_price,
        });
    }

    /// Fields (after the code): `<line #>|<labor type>|<operation>|<description>|<hours>|<rate>[|<extended>]`
    fn handle_labor(&mut self, fields: &[String]) {
        let hours = decimal_field(fields, 4).unwrap_or(Decimal::ZERO);
        let rate = decimal_field(fields, 5).unwrap_or(Decimal::ZERO);
        let extended_price = decimal_field(fields, 6).unwrap_or_else(|| hours * rate);

        self.labor.push(LaborLine {
            line_number: int_field(fields, 0).unwrap_or(0) as i32,
            labor_type: field(fields, 1)
                .map(|t| LaborType::from_code(&t))
                .unwrap_or(LaborType::Other),
            operation: field(fields, 2).unwrap_or_default(),
            description: field(fields, 3).unwrap_or_default(),
            hours,
            rate,
            extended_price,
        });
    }

    /// `TOT|<label>|<amount>|<label>|<amount>|...`: label/value pairs in
    /// any order; unrecognized labels are ignored. Tolerates vendors that
    /// split totals across several records or add extra categories.
    fn handle_totals(&mut self, fields: &[String]) {
        let mut idx = 1;
        while idx + 1 < fields.len() {
            let label = fields[idx].to_ascii_lowercase();
            let amount = parse_decimal(&fields[idx + 1]);
            match label.as_str() {
                "parts" => self.financial.parts_total = amount,
                "labor" => self.financial.labor_total = amount,
                "materials" => self.financial.materials_total = amount,
                "tax" => self.financial.tax_total = amount,
                "total" => self.financial.grand_total = amount,
                _ => {}
            }
            idx += 2;
        }
    }

    /// `TAX|<amount>`
    fn handle_tax(&mut self, fields: &[String]) {
        if let Some(amount) = decimal_field(fields, 1) {
            self.financial.tax_total = amount;
        }
    }

    /// `DED|<amount>|<type>`
    fn handle_deductible(&mut self, fields: &[String]) {
        if let Some(amount) = decimal_field(fields, 1) {
            self.claim.deductible = amount;
            self.financial.deductible = amount;
        }
        if let Some(kind) = field(fields, 2) {
            self.claim.deductible_type = Some(kind);
        }
    }

    /// `NTE|<text>`: extra fields are joined back; escaped pipes survive
    /// inside a single field.
    fn handle_note(&mut self, fields: &[String]) {
        let text = fields[1..]
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            self.notes.push(text);
        }
    }

    fn finish(self, raw_line_count: usize) -> ParseOutput {
        ParseOutput {
            estimate: CanonicalEstimate {
                customer: self.customer,
                vehicle: self.vehicle,
                claim: self.claim,
                parts: self.parts,
                labor: self.labor,
                financial: self.financial,
                notes: self.notes,
                metadata: EstimateMetadata {
                    source_format: SourceFormat::Ems,
                    parsed_at: Utc::now(),
                    raw_line_count,
                    estimating_system: self.estimating_system,
                    estimate_ref: self.estimate_ref,
                },
            },
            warnings: self.warnings,
        }
    }
}

// ============================================
// Parse loop
// ============================================

fn parse_ems(content: &str) -> Result<ParseOutput> {
    let mut builder = EstimateBuilder::default();
    let mut raw_line_count = 0usize;
    let mut recognized = 0usize;

    for (idx, raw_line) in content.lines().enumerate() {
        raw_line_count += 1;
        let line_number = idx + 1;

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let fields = split_fields(line);
        let code = match fields.first() {
            Some(c) if !c.is_empty() => c.clone(),
            _ => continue,
        };

        match RecordKind::from_code(&code) {
            Some(kind) => {
                recognized += 1;
                builder.apply(kind, &fields, line_number);
            }
            None => {
                tracing::warn!(line = line_number, code = %code, "unknown record type, skipping");
                builder
                    .warnings
                    .push(format!("line {}: unknown record type '{}'", line_number, code));
            }
        }
    }

    if recognized == 0 {
        return Err(Error::Parse {
            format: SourceFormat::Ems.to_string(),
            message: format!(
                "no recognizable estimate records in {} line(s) of input",
                raw_line_count
            ),
        });
    }

    Ok(builder.finish(raw_line_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    // ---- tokenizer ----

    #[test]
    fn test_split_plain_fields() {
        assert_eq!(split_fields("PRT|1|A1|Bumper"), vec!["PRT", "1", "A1", "Bumper"]);
    }

    #[test]
    fn test_split_trims_fields() {
        assert_eq!(split_fields(" PRT | 1 |  A1 "), vec!["PRT", "1", "A1"]);
    }

    #[test]
    fn test_split_escaped_delimiter() {
        assert_eq!(
            split_fields(r"NTE|left \| right"),
            vec!["NTE", "left | right"]
        );
    }

    #[test]
    fn test_split_escaped_backslash() {
        assert_eq!(split_fields(r"NTE|a\\b"), vec!["NTE", r"a\b"]);
    }

    #[test]
    fn test_split_trailing_empty_field() {
        assert_eq!(split_fields("TOT|PARTS|"), vec!["TOT", "PARTS", ""]);
    }

    #[test]
    fn test_split_dangling_escape_is_dropped() {
        assert_eq!(split_fields("NTE|oops\\"), vec!["NTE", "oops"]);
    }

    // ---- dispatch ----

    #[test]
    fn test_record_codes_case_insensitive() {
        assert_eq!(RecordKind::from_code("prt"), Some(RecordKind::Part));
        assert_eq!(RecordKind::from_code("Tot"), Some(RecordKind::Totals));
        assert_eq!(RecordKind::from_code("XYZ"), None);
    }

    #[test]
    fn test_unknown_record_warns_and_continues() {
        let output = parse_ems("XYZ|whatever|data\nPRT|1|A1|Bumper cover|1|100.00\n").unwrap();
        assert_eq!(output.estimate.parts.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("XYZ"));
    }

    #[test]
    fn test_unrecognizable_input_is_a_parse_error() {
        let err = parse_ems("this is not an estimate\nnot even close\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_short_record_populates_fewer_fields() {
        let output = parse_ems("VEH|2019|Honda\nPRT|1|A1|Bumper cover|1|100.00\n").unwrap();
        let vehicle = &output.estimate.vehicle;
        assert_eq!(vehicle.year, Some(2019));
        assert_eq!(vehicle.make.as_deref(), Some("Honda"));
        assert!(vehicle.model.is_none());
        assert!(vehicle.vin.is_none());
    }

    // ---- handlers ----

    #[test]
    fn test_part_line_extended_computed_when_missing() {
        let output = parse_ems("PRT|1|A1|Bumper cover|2|50.00\n").unwrap();
        assert_eq!(output.estimate.parts[0].extended_price, dec("100.00"));
    }

    #[test]
    fn test_part_line_extended_taken_when_supplied() {
        let output = parse_ems("PRT|1|A1|Bumper cover|2|50.00|99.95\n").unwrap();
        assert_eq!(output.estimate.parts[0].extended_price, dec("99.95"));
    }

    #[test]
    fn test_part_line_missing_part_number() {
        let output = parse_ems("PRT|1||Shop supplies|1|12.00\n").unwrap();
        assert!(output.estimate.parts[0].part_number.is_none());
    }

    #[test]
    fn test_labor_line_fields() {
        let output = parse_ems("LAB|2|PAINT|REFINISH|Refinish bumper|3.0|52.00\n").unwrap();
        let labor = &output.estimate.labor[0];
        assert_eq!(labor.line_number, 2);
        assert_eq!(labor.labor_type, LaborType::Paint);
        assert_eq!(labor.operation, "REFINISH");
        assert_eq!(labor.hours, dec("3.0"));
        assert_eq!(labor.rate, dec("52.00"));
        assert_eq!(labor.extended_price, dec("156.00"));
    }

    #[test]
    fn test_generic_line_item_routes_part_and_labor() {
        let content = "\
LIN|1|PART|A1|Bumper cover|1|100.00
LIN|2|LABOR|BODY|R&I|R&I bumper|2.0|58.00
LIN|3|SUBLET|Alignment
";
        let output = parse_ems(content).unwrap();
        assert_eq!(output.estimate.parts.len(), 1);
        assert_eq!(output.estimate.parts[0].description, "Bumper cover");
        assert_eq!(output.estimate.labor.len(), 1);
        assert_eq!(output.estimate.labor[0].operation, "R&I");
        // Unknown kind is warned, not fatal
        assert_eq!(output.warnings.len(), 1);
    }

    #[test]
    fn test_totals_pairs_in_any_order() {
        let a = parse_ems("TOT|PARTS|702.49|LABOR|301.00|TAX|87.96\nPRT|1|A1|x|1|1\n").unwrap();
        let b = parse_ems("TOT|TAX|87.96|LABOR|301.00|PARTS|702.49\nPRT|1|A1|x|1|1\n").unwrap();
        assert_eq!(a.estimate.financial, b.estimate.financial);
        assert_eq!(a.estimate.financial.parts_total, dec("702.49"));
        assert_eq!(a.estimate.financial.tax_total, dec("87.96"));
    }

    #[test]
    fn test_totals_unknown_labels_ignored() {
        let output =
            parse_ems("TOT|PARTS|100.00|BETTERMENT|50.00|TOTAL|100.00\nPRT|1|A1|x|1|1\n").unwrap();
        assert_eq!(output.estimate.financial.parts_total, dec("100.00"));
        assert_eq!(output.estimate.financial.grand_total, dec("100.00"));
    }

    #[test]
    fn test_deductible_record() {
        let output = parse_ems("DED|500.00|collision\nPRT|1|A1|x|1|1\n").unwrap();
        assert_eq!(output.estimate.claim.deductible, dec("500.00"));
        assert_eq!(output.estimate.financial.deductible, dec("500.00"));
        assert_eq!(output.estimate.claim.deductible_type.as_deref(), Some("collision"));
    }

    #[test]
    fn test_note_with_escaped_pipe() {
        let output = parse_ems(r"NTE|pull to the right \| steering wheel off-center").unwrap();
        assert_eq!(
            output.estimate.notes,
            vec!["pull to the right | steering wheel off-center"]
        );
    }

    #[test]
    fn test_blank_lines_skipped_and_counted() {
        let output = parse_ems("\nPRT|1|A1|x|1|1\n\n   \n").unwrap();
        assert_eq!(output.estimate.parts.len(), 1);
        assert_eq!(output.estimate.metadata.raw_line_count, 4);
    }

    #[test]
    fn test_currency_noise_in_amounts() {
        let output = parse_ems("PRT|1|A1|Bumper cover|1|$1,234.50\n").unwrap();
        assert_eq!(output.estimate.parts[0].unit_price, dec("1234.50"));
    }

    #[test]
    fn test_header_metadata() {
        let output = parse_ems("HDR|Mitchell UltraMate|EST-20418\nPRT|1|A1|x|1|1\n").unwrap();
        let metadata = &output.estimate.metadata;
        assert_eq!(metadata.estimating_system.as_deref(), Some("Mitchell UltraMate"));
        assert_eq!(metadata.estimate_ref.as_deref(), Some("EST-20418"));
        assert_eq!(metadata.source_format, SourceFormat::Ems);
    }
}
