//! Parser trait abstraction
//!
//! All estimate-format parsers implement the [`EstimateParser`] trait. The
//! canonical estimate is the contract boundary: whatever format a file
//! arrived in, the parser's output has the identical shape, so diffing and
//! persistence never know which parser ran. The BMS/XML parser lives in an
//! external service and hands its canonical estimates to
//! [`ImportCoordinator::import_parsed`](crate::ingest::ImportCoordinator::import_parsed).
//!
//! ## Design Principles
//!
//! 1. **Resilience**: individual bad records produce warnings and are
//!    skipped; only whole-input failure returns an error
//! 2. **One shape out**: every parser produces [`CanonicalEstimate`]
//! 3. **Pure**: parsers read the content string and nothing else

use crate::error::Result;
use crate::types::{CanonicalEstimate, SourceFormat};

/// Result of parsing one estimate file.
#[derive(Debug)]
pub struct ParseOutput {
    /// The finished, immutable canonical estimate
    pub estimate: CanonicalEstimate,
    /// Non-fatal problems encountered while parsing (unknown record codes,
    /// short records, ...)
    pub warnings: Vec<String>,
}

/// Trait implemented by all estimate-format parsers.
pub trait EstimateParser: Send + Sync {
    /// Which interchange format this parser handles
    fn format(&self) -> SourceFormat;

    /// Parse raw file content into the canonical estimate.
    ///
    /// ## Error Handling
    ///
    /// - Individual record problems are logged as warnings and added to
    ///   [`ParseOutput::warnings`], not returned as errors
    /// - Only input with no recognizable estimate content at all returns
    ///   `Err`
    fn parse(&self, content: &str) -> Result<ParseOutput>;
}

/// Best-effort sniff of the interchange format from raw content.
///
/// BMS files are XML documents; anything starting with an XML prolog or
/// element is BMS, everything else is treated as the tabular EMS format
/// (whose own parser decides whether the content is usable).
pub fn detect_format(content: &str) -> SourceFormat {
    if content.trim_start().starts_with('<') {
        SourceFormat::Bms
    } else {
        SourceFormat::Ems
    }
}
