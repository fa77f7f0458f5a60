//! Transform Pipeline
//!
//! `transform` parses the input once, lets every selected pass record its
//! edits against the original text, renders the result in a single emit and
//! validates it. Passes run in a fixed order:
//!
//! 1. helper-import rewrite (when inlined helpers are present)
//! 2. pure annotation, then metadata scrub, then class fold (when metadata
//!    markers are present)
//!
//! A failed run never yields partially transformed text: it either returns
//! the input untouched or, in strict mode, the error.

use lazy_static::lazy_static;
use oxc_span::Span;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::class_fold::fold;
use crate::classify::classify;
use crate::edits::{Rendered, Rewrite};
use crate::import_tslib::import_tslib;
use crate::parse::{with_source_unit, SourceUnit};
use crate::prefix_functions::prefix_functions;
use crate::scrub::scrub;
use crate::source_map::{identity_map, map_chunks, SourceMap};
use crate::validate::{validate_output, OptimizerError};

lazy_static! {
    static ref HAS_DECORATORS: Regex = Regex::new(r"decorators").unwrap();
    static ref HAS_CTOR_PARAMETERS: Regex = Regex::new(r"ctorParameters").unwrap();
    static ref HAS_TS_HELPERS: Regex =
        Regex::new(r"var (__extends|__decorate|__metadata|__param) = ").unwrap();
    static ref SOURCE_MAPPING_URL: Regex =
        Regex::new(r"(?m)^//# sourceMappingURL=[^\r\n]*(\r?\n)?").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS AND OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    /// Recorded as the map's source.
    pub input_file_path: Option<String>,
    /// Its basename becomes the map's `file` and the `sourceMappingURL` target.
    pub output_file_path: Option<String>,
    pub emit_source_map: bool,
    /// Fail instead of falling back to the input when the run fails.
    pub strict: bool,
}

impl TransformOptions {
    fn label(&self) -> &str {
        self.input_file_path.as_deref().unwrap_or("<input>")
    }

    /// `(file, source)` names recorded in emitted maps.
    fn map_names(&self) -> (String, String) {
        let file = self
            .output_file_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = match (&self.input_file_path, &self.output_file_path) {
            (Some(input), Some(_)) => input.clone(),
            _ => String::new(),
        };
        (file, source)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutput {
    pub content: String,
    pub source_map: Option<SourceMap>,
}

/// Which passes the raw text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSelection {
    pub import_tslib: bool,
    pub optimize: bool,
}

impl PassSelection {
    pub fn for_content(content: &str) -> Self {
        Self {
            import_tslib: HAS_TS_HELPERS.is_match(content),
            optimize: HAS_DECORATORS.is_match(content) || HAS_CTOR_PARAMETERS.is_match(content),
        }
    }

    pub fn any(&self) -> bool {
        self.import_tslib || self.optimize
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn transform(content: &str, options: &TransformOptions) -> Result<TransformOutput, OptimizerError> {
    let passes = PassSelection::for_content(content);
    if !passes.any() {
        debug!(file = options.label(), "no optimizable markers, emitting unchanged");
        return Ok(unchanged(content, options));
    }

    match run_passes(content, passes, options) {
        Ok(output) => Ok(output),
        Err(err) if options.strict => Err(err),
        Err(err) => {
            warn!(
                file = options.label(),
                code = %err.code,
                "optimization skipped: {}",
                err.message
            );
            Ok(unchanged(content, options))
        }
    }
}

fn unchanged(content: &str, options: &TransformOptions) -> TransformOutput {
    let source_map = options.emit_source_map.then(|| {
        let (file, source) = options.map_names();
        identity_map(content, &file, &source)
    });
    TransformOutput {
        content: content.to_string(),
        source_map,
    }
}

/// Records the edits of every selected pass against `unit`.
fn record_edits(unit: &SourceUnit<'_>, passes: PassSelection, rewrite: &mut Rewrite) {
    let helper_positions = if passes.import_tslib {
        import_tslib(unit, rewrite)
    } else {
        Vec::new()
    };
    if passes.optimize {
        prefix_functions(unit, &helper_positions, rewrite);
        let symbols = classify(unit);
        debug!(symbols = symbols.len(), "classified framework symbols");
        scrub(unit, &symbols, rewrite);
        fold(unit, rewrite);
    }
}

/// Drops `//# sourceMappingURL=` lines from emitted text.
pub fn strip_source_mapping_comments(text: &str) -> String {
    SOURCE_MAPPING_URL.replace_all(text, "").into_owned()
}

fn strip_source_mapping_urls(content: &str, rewrite: &mut Rewrite) {
    for found in SOURCE_MAPPING_URL.find_iter(content) {
        rewrite.remove(Span::new(found.start() as u32, found.end() as u32));
    }
}

fn run_passes(
    content: &str,
    passes: PassSelection,
    options: &TransformOptions,
) -> Result<TransformOutput, OptimizerError> {
    let label = options.label();
    let Rendered { text, chunks } = with_source_unit(content, label, |unit| {
        let mut rewrite = Rewrite::new();
        record_edits(unit, passes, &mut rewrite);
        if options.emit_source_map {
            strip_source_mapping_urls(content, &mut rewrite);
        }
        debug!(file = label, edits = rewrite.len(), "rendering edits");
        rewrite.render(content)
    })?;

    validate_output(&text, label)?;

    let mut output = text;
    let mut source_map = None;
    if options.emit_source_map {
        let (file, source) = options.map_names();
        source_map = Some(map_chunks(content, &chunks, &file, &source));
        if !file.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("//# sourceMappingURL={}.map", file));
        }
    }

    Ok(TransformOutput {
        content: output,
        source_map,
    })
}
