//! Format-specific parsers
//!
//! Each supported interchange format has a parser module that implements
//! the [`EstimateParser`](super::EstimateParser) trait.
//!
//! | Format | Module | Status |
//! |--------|--------|--------|
//! | EMS (pipe-delimited) | [`ems`] | implemented here |
//! | BMS (XML) | n/a | external service, produces the same canonical shape |

mod ems;

pub use ems::EmsParser;

use super::EstimateParser;
use crate::types::SourceFormat;

/// Get a parser for a specific format.
///
/// Returns `None` for formats parsed outside this crate.
pub fn parser_for(format: SourceFormat) -> Option<Box<dyn EstimateParser>> {
    match format {
        SourceFormat::Ems => Some(Box::new(EmsParser::new())),
        SourceFormat::Bms => None,
    }
}
