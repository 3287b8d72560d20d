//! Dovetail Ruleset Compiler
//!
//! This crate reads ruleset XML and builds a [`dt_core::RuleSet`] from it.

pub mod builder;
pub mod lint;
pub mod parser;

use std::path::Path;

use dt_core::{RuleSet, SyntaxError};
use thiserror::Error;

pub use builder::{build_action, build_ruleset};
pub use lint::{lint_ruleset, LintReport};
pub use parser::{parse_xml, XmlElement};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse and build a ruleset. `source` names it in errors and log entries.
pub fn compile_ruleset(xml: &str, source: &str) -> Result<RuleSet, CompileError> {
    let root = parse_xml(xml)?;
    Ok(build_ruleset(&root, source)?)
}

pub fn compile_ruleset_file(path: impl AsRef<Path>) -> Result<RuleSet, CompileError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path)?;
    compile_ruleset(&xml, &path.display().to_string())
}
