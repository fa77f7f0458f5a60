#[cfg(feature = "napi")]
use napi_derive::napi;
use oxc_allocator::Allocator;
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "BO-PARSE";
pub const ERR_EMIT: &str = "BO-EMIT";
pub const ERR_IO: &str = "BO-IO";
pub const ERR_SOURCE_MAP: &str = "BO-MAP";
pub const ERR_INPUT: &str = "BO-INPUT";

fn describe(code: &str) -> &'static str {
    match code {
        ERR_PARSE => "The input could not be parsed as JavaScript.",
        ERR_EMIT => "The transformed output failed validation.",
        ERR_IO => "A file could not be read or written.",
        ERR_SOURCE_MAP => "A source map could not be decoded.",
        ERR_INPUT => "The input was rejected before processing.",
        _ => "Unknown error.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIMIZER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct OptimizerError {
    pub code: String,
    pub summary: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Formatted parser diagnostics, one per entry.
    pub diagnostics: Vec<String>,
}

impl OptimizerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_diagnostics(code, message, file, line, column, vec![])
    }

    pub fn with_diagnostics(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        diagnostics: Vec<String>,
    ) -> Self {
        OptimizerError {
            code: code.to_string(),
            summary: describe(code).to_string(),
            message: message.to_string(),
            file: file.to_string(),
            line,
            column,
            diagnostics,
        }
    }

    pub fn io(file: &str, err: &std::io::Error) -> Self {
        Self::new(ERR_IO, &err.to_string(), file, 0, 0)
    }

    pub fn input(message: &str, file: &str) -> Self {
        Self::new(ERR_INPUT, message, file, 0, 0)
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = if self.file.is_empty() {
            "<content>"
        } else {
            self.file.as_str()
        };
        write!(
            f,
            "[{}] {} ({}:{}:{})",
            self.code, self.message, file, self.line, self.column
        )?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for OptimizerError {}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// 1-based line and column for a byte offset.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before.len() - nl,
        None => before.len() + 1,
    };
    (line, column as u32)
}

/// Renders parser diagnostics as `line:column message` strings.
pub fn format_diagnostics(source: &str, ret: &ParserReturn<'_>) -> Vec<String> {
    ret.errors
        .iter()
        .map(|d| {
            let offset = d
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map(|label| label.offset());
            match offset {
                Some(offset) => {
                    let (line, column) = line_column(source, offset);
                    format!("{}:{} {}", line, column, d.message)
                }
                None => d.message.to_string(),
            }
        })
        .collect()
}

/// Parses emitted text and turns any syntax error into a `BO-EMIT` error.
pub fn validate_output(output: &str, file: &str) -> Result<(), OptimizerError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, output, SourceType::unambiguous()).parse();
    if ret.errors.is_empty() && !ret.panicked {
        return Ok(());
    }
    let diagnostics = format_diagnostics(output, &ret);
    Err(OptimizerError::with_diagnostics(
        ERR_EMIT,
        "Transformed output is not valid JavaScript",
        file,
        0,
        0,
        diagnostics,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let src = "a\nbc\ndef";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 3), (2, 2));
        assert_eq!(line_column(src, 5), (3, 1));
    }

    #[test]
    fn test_validate_output_accepts_valid_js() {
        assert!(validate_output("var a = 1;", "a.js").is_ok());
    }

    #[test]
    fn test_validate_output_rejects_broken_js() {
        let err = validate_output("var a = ;", "a.js").unwrap_err();
        assert_eq!(err.code, ERR_EMIT);
        assert!(!err.diagnostics.is_empty());
        assert!(err.to_string().contains("BO-EMIT"));
    }
}
