//! Validator/rewriter core: prompts, lenient parsing, the report contract,
//! and the two-stage pipeline that ties them to a chat backend.

pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod schema;

pub use parse::{parse_json_loose, ParseError};
pub use pipeline::{Compiler, FixOutcome, ValidationOutcome};
pub use schema::{
    validate_report, ConsistencyIssue, Diagnostic, ExpectedSlot, Level, SchemaError, SchemaIssue,
    Span, Summary, ValidatorReport,
};

use crate::error::CompilerError;

/// Loose parse followed by strict validation of raw validator output.
pub fn parse_report(text: &str) -> Result<ValidatorReport, CompilerError> {
    let value = parse_json_loose(text)?;
    Ok(validate_report(&value)?)
}
