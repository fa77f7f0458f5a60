//! Helper-Import Rewrite
//!
//! Replaces inlined down-level helper declarations such as
//! `var __extends = (this && this.__extends) || function (d, b) {...};`
//! with `import { __extends } from "tslib";`.

use oxc_ast::ast::{BindingPattern, Statement};
use oxc_span::Span;
use tracing::debug;

use crate::edits::Rewrite;
use crate::parse::SourceUnit;
use crate::prefix_functions::HELPER_MODULE;

pub const TS_HELPERS: [&str; 4] = ["__extends", "__decorate", "__metadata", "__param"];

/// Helper name declared by a top-level single-declarator variable statement,
/// with the statement span.
fn helper_declaration(stmt: &Statement<'_>) -> Option<(String, Span)> {
    let Statement::VariableDeclaration(decl) = stmt else {
        return None;
    };
    if decl.declarations.len() != 1 {
        return None;
    }
    let BindingPattern::BindingIdentifier(id) = &decl.declarations[0].id else {
        return None;
    };
    let name = match id.name.as_str().strip_prefix("___") {
        Some(rest) => format!("__{}", rest),
        None => id.name.to_string(),
    };
    TS_HELPERS
        .contains(&name.as_str())
        .then_some((name, decl.span))
}

/// Records the replacements and returns the start of every rewritten
/// statement, in source order.
pub fn import_tslib(unit: &SourceUnit<'_>, rewrite: &mut Rewrite) -> Vec<u32> {
    let mut positions = Vec::new();
    for stmt in &unit.program.body {
        let Some((name, span)) = helper_declaration(stmt) else {
            continue;
        };
        rewrite.remove(span);
        rewrite.insert(
            span.start,
            format!("import {{ {} }} from \"{}\";", name, HELPER_MODULE),
        );
        positions.push(span.start);
    }
    debug!(helpers = positions.len(), "rewrote helper declarations");
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::with_source_unit;
    use pretty_assertions::assert_eq;

    fn rewritten(source: &str) -> String {
        with_source_unit(source, "t.js", |unit| {
            let mut rewrite = Rewrite::new();
            import_tslib(unit, &mut rewrite);
            rewrite.render(source).text
        })
        .unwrap()
    }

    #[test]
    fn test_replaces_extends() {
        let source = "var __extends = (this && this.__extends) || function (d, b) {\n    function __() { this.constructor = d; }\n};\nvar x = 1;\n";
        assert_eq!(
            rewritten(source),
            "import { __extends } from \"tslib\";\nvar x = 1;\n"
        );
    }

    #[test]
    fn test_replaces_each_helper() {
        for helper in TS_HELPERS {
            let source = format!("var {0} = (this && this.{0}) || function () {{}};", helper);
            assert_eq!(
                rewritten(&source),
                format!("import {{ {} }} from \"tslib\";", helper)
            );
        }
    }

    #[test]
    fn test_normalizes_triple_underscore() {
        assert_eq!(
            rewritten("var ___decorate = function () {};"),
            "import { __decorate } from \"tslib\";"
        );
    }

    #[test]
    fn test_leaves_other_declarations() {
        let source = "var __extends = 1, y = 2;\nvar __assign = 3;\nfunction f() { var __param = 4; }\n";
        assert_eq!(rewritten(source), source);
    }

    #[test]
    fn test_reports_positions() {
        let source = "var a = 1;\nvar __param = function () {};\n";
        let positions = with_source_unit(source, "t.js", |unit| {
            let mut rewrite = Rewrite::new();
            import_tslib(unit, &mut rewrite)
        })
        .unwrap();
        assert_eq!(positions, vec![11]);
    }
}
