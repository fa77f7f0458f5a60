//! Parse Module
//!
//! Turns input text into a [`SourceUnit`]: the oxc program, its source text and
//! the semantic scoping used to resolve identifiers to their declarations.
//! Everything lives in one arena that is dropped when the callback returns.

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::SourceType;

use crate::validate::{format_diagnostics, line_column, OptimizerError, ERR_PARSE};

/// One parsed input. Read-only for every pass.
pub struct SourceUnit<'a> {
    pub text: &'a str,
    pub program: &'a Program<'a>,
    pub scoping: &'a Scoping,
}

impl<'a> SourceUnit<'a> {
    pub fn slice(&self, start: u32, end: u32) -> &'a str {
        self.text.get(start as usize..end as usize).unwrap_or("")
    }
}

/// Parses `source` and hands the resulting unit to `f`.
///
/// Any syntax error aborts with `BO-PARSE` carrying the formatted diagnostics.
pub fn with_source_unit<R>(
    source: &str,
    file: &str,
    f: impl FnOnce(&SourceUnit<'_>) -> R,
) -> Result<R, OptimizerError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::unambiguous()).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let diagnostics = format_diagnostics(source, &ret);
        let (line, column) = ret
            .errors
            .first()
            .and_then(|d| d.labels.as_ref())
            .and_then(|labels| labels.first())
            .map(|label| line_column(source, label.offset()))
            .unwrap_or((0, 0));
        return Err(OptimizerError::with_diagnostics(
            ERR_PARSE,
            "Failed to parse input",
            file,
            line,
            column,
            diagnostics,
        ));
    }

    let program: &Program<'_> = allocator.alloc(ret.program);
    let semantic = SemanticBuilder::new().build(program).semantic;
    let unit = SourceUnit {
        text: source,
        program,
        scoping: semantic.scoping(),
    };
    Ok(f(&unit))
}
