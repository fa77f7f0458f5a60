//! Pure Annotator
//!
//! Marks every call and `new` expression reachable from the top level without
//! entering a function body with a `/*@__PURE__*/` comment, and records the
//! modules imported with bindings in a `PURE_IMPORTS_START ... PURE_IMPORTS_END`
//! manifest comment that the bundle purifier reads back later.

use oxc_ast::ast::{
    ArrowFunctionExpression, CallExpression, Expression, Function, NewExpression,
    ParenthesizedExpression, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use oxc_syntax::scope::ScopeFlags;
use tracing::debug;

use crate::edits::Rewrite;
use crate::parse::SourceUnit;

pub const PURE_MARKER: &str = "/*@__PURE__*/";
const PURE_MARKER_ALT: &str = "/*#__PURE__*/";
const MANIFEST_START: &str = "PURE_IMPORTS_START";

/// Module name the helper-import rewrite imports from.
pub const HELPER_MODULE: &str = "tslib";

#[derive(Default)]
struct TopLevelCalls {
    positions: Vec<u32>,
}

impl TopLevelCalls {
    /// `(function () {...}())`: the marker belongs before the outer paren.
    fn wrapped_iife<'e, 'a>(paren: &'e ParenthesizedExpression<'a>) -> Option<&'e CallExpression<'a>> {
        let Expression::CallExpression(call) = &paren.expression else {
            return None;
        };
        match call.callee.without_parentheses() {
            Expression::FunctionExpression(_) => Some(call),
            _ => None,
        }
    }
}

impl<'a> Visit<'a> for TopLevelCalls {
    fn visit_function(&mut self, _it: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _it: &ArrowFunctionExpression<'a>) {}

    fn visit_parenthesized_expression(&mut self, it: &ParenthesizedExpression<'a>) {
        match Self::wrapped_iife(it) {
            Some(call) => {
                self.positions.push(it.span.start);
                walk::walk_call_expression(self, call);
            }
            None => walk::walk_parenthesized_expression(self, it),
        }
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        self.positions.push(it.span.start);
        walk::walk_call_expression(self, it);
    }

    fn visit_new_expression(&mut self, it: &NewExpression<'a>) {
        self.positions.push(it.span.start);
        walk::walk_new_expression(self, it);
    }
}

/// Sorted, deduplicated marker positions.
pub fn find_top_level_functions(unit: &SourceUnit<'_>) -> Vec<u32> {
    let mut calls = TopLevelCalls::default();
    calls.visit_program(unit.program);
    let mut positions = calls.positions;
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// `@angular/core` -> `_angular_core`.
pub fn manifest_token(specifier: &str) -> String {
    specifier
        .chars()
        .map(|c| match c {
            '/' | '@' | '-' => '_',
            c => c,
        })
        .collect()
}

/// Tokens of imports with an import clause, in source order, each listed
/// once. `helper_positions` are statements the helper-import rewrite turned
/// into imports from [`HELPER_MODULE`].
pub fn find_pure_imports(unit: &SourceUnit<'_>, helper_positions: &[u32]) -> Vec<String> {
    let mut found: Vec<(u32, String)> = unit
        .program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(import) if import.specifiers.is_some() => {
                Some((import.span.start, manifest_token(&import.source.value)))
            }
            _ => None,
        })
        .collect();
    found.extend(
        helper_positions
            .iter()
            .map(|pos| (*pos, manifest_token(HELPER_MODULE))),
    );
    found.sort_by_key(|(pos, _)| *pos);

    let mut tokens: Vec<String> = Vec::with_capacity(found.len());
    for (_, token) in found {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

pub fn manifest_comment(tokens: &[String]) -> String {
    format!("/** {} {} PURE_IMPORTS_END */", MANIFEST_START, tokens.join(","))
}

/// True when a manifest comment already precedes the first statement.
fn has_manifest(unit: &SourceUnit<'_>) -> bool {
    let body_start = unit
        .program
        .body
        .first()
        .map_or(unit.text.len() as u32, |stmt| stmt.span().start);
    unit.program
        .comments
        .iter()
        .take_while(|comment| comment.span.end <= body_start)
        .any(|comment| {
            unit.slice(comment.span.start, comment.span.end)
                .trim_start_matches("/*")
                .trim_start_matches('*')
                .trim_start()
                .starts_with(MANIFEST_START)
        })
}

fn already_marked(text: &str, pos: u32) -> bool {
    let before = text.get(..pos as usize).unwrap_or("").trim_end();
    before.ends_with(PURE_MARKER) || before.ends_with(PURE_MARKER_ALT)
}

/// Records the pure markers and the manifest comment. Returns the number of
/// markers added.
pub fn prefix_functions(
    unit: &SourceUnit<'_>,
    helper_positions: &[u32],
    rewrite: &mut Rewrite,
) -> usize {
    let mut added = 0;
    for pos in find_top_level_functions(unit) {
        if already_marked(unit.text, pos) {
            continue;
        }
        rewrite.insert(pos, format!("{} ", PURE_MARKER));
        added += 1;
    }

    let tokens = find_pure_imports(unit, helper_positions);
    if !has_manifest(unit) {
        let comment = manifest_comment(&tokens);
        match &unit.program.hashbang {
            Some(hashbang) => rewrite.insert(hashbang.span.end, format!("\n{}", comment)),
            None => rewrite.insert_front(0, format!("{}\n", comment)),
        }
    }

    debug!(markers = added, imports = tokens.len(), "prefixed top-level calls");
    added
}
