//! Class Folder
//!
//! Down-level class output assigns static members after the class closure:
//!
//! ```text
//! var C = (function () { function C() {} return C; }());
//! C.p = 1;
//! ```
//!
//! Folding moves each such assignment in front of the closure's `return`, so
//! the whole class is one side-effect-free initializer.

use oxc_ast::ast::{
    AssignmentOperator, AssignmentTarget, BindingPattern, Expression, FunctionBody, Statement,
};
use oxc_semantic::SymbolId;
use oxc_span::{GetSpan, Span};
use tracing::debug;

use crate::classify::Resolver;
use crate::edits::{statement_cut, Rewrite};
use crate::parse::SourceUnit;

/// A recognized class-shaped variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    pub symbol: SymbolId,
    /// End of the declaring statement; only later assignments fold.
    pub declaration_end: u32,
    /// Span of the closure's final `return` statement.
    pub return_span: Span,
}

/// The function body of `(function () {...}())` or `(function () {...})()`.
fn closure_body<'e, 'a>(init: &'e Expression<'a>) -> Option<&'e FunctionBody<'a>> {
    let Expression::ParenthesizedExpression(_) = init else {
        if let Expression::CallExpression(call) = init {
            if let Expression::ParenthesizedExpression(paren) = &call.callee {
                if let Expression::FunctionExpression(function) = &paren.expression {
                    return function.body.as_deref();
                }
            }
        }
        return None;
    };
    let Expression::CallExpression(call) = init.without_parentheses() else {
        return None;
    };
    let Expression::FunctionExpression(function) = &call.callee else {
        return None;
    };
    function.body.as_deref()
}

/// Scans the top level for `var X = (function () { function X() {} ... return X; }());`.
pub fn find_classes(unit: &SourceUnit<'_>) -> Vec<ClassDescriptor> {
    let mut classes = Vec::new();
    for stmt in &unit.program.body {
        let Statement::VariableDeclaration(decl) = stmt else {
            continue;
        };
        if decl.declarations.len() != 1 {
            continue;
        }
        let declarator = &decl.declarations[0];
        let BindingPattern::BindingIdentifier(id) = &declarator.id else {
            continue;
        };
        let Some(symbol) = id.symbol_id.get() else {
            continue;
        };
        let Some(body) = declarator.init.as_ref().and_then(closure_body) else {
            continue;
        };
        let statements = &body.statements;
        if statements.len() < 2 {
            continue;
        }
        let Statement::FunctionDeclaration(inner) = &statements[0] else {
            continue;
        };
        if inner.id.as_ref().map_or(true, |inner_id| inner_id.name != id.name) {
            continue;
        }
        let Some(Statement::ReturnStatement(ret)) = statements.last() else {
            continue;
        };
        classes.push(ClassDescriptor {
            name: id.name.to_string(),
            symbol,
            declaration_end: decl.span.end,
            return_span: ret.span,
        });
    }
    classes
}

/// Text that follows a moved statement: a line break plus the `return`
/// indentation when the `return` opens its own line.
fn relocation_suffix(source: &str, return_start: u32) -> String {
    let before = source.get(..return_start as usize).unwrap_or("");
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let indent = &before[line_start..];
    if line_start > 0 && indent.chars().all(|c| c == ' ' || c == '\t') {
        format!(";\n{}", indent)
    } else {
        ";".to_string()
    }
}

/// Records a relocation for every top-level `X.prop = ...;` that follows a
/// class declaration and resolves to it. Returns the number of statements
/// moved.
pub fn fold(unit: &SourceUnit<'_>, rewrite: &mut Rewrite) -> usize {
    let classes = find_classes(unit);
    if classes.is_empty() {
        return 0;
    }
    let resolver = Resolver::new(unit.scoping);
    let mut moved = 0;

    for stmt in &unit.program.body {
        let Statement::ExpressionStatement(expr_stmt) = stmt else {
            continue;
        };
        let Expression::AssignmentExpression(assign) = &expr_stmt.expression else {
            continue;
        };
        if assign.operator != AssignmentOperator::Assign {
            continue;
        }
        let AssignmentTarget::StaticMemberExpression(member) = &assign.left else {
            continue;
        };
        let Expression::Identifier(object) = &member.object else {
            continue;
        };
        let Some(symbol) = resolver.unique(object) else {
            continue;
        };
        let Some(class) = classes.iter().find(|c| c.symbol == symbol) else {
            continue;
        };
        if expr_stmt.span.start < class.declaration_end || rewrite.is_removed(expr_stmt.span) {
            continue;
        }

        let suffix = relocation_suffix(unit.text, class.return_span.start);
        rewrite.relocate(
            expr_stmt.expression.span(),
            statement_cut(unit.text, expr_stmt.span),
            class.return_span.start,
            &suffix,
        );
        moved += 1;
    }

    debug!(classes = classes.len(), moved, "folded static members");
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::with_source_unit;

    fn folded(source: &str) -> String {
        with_source_unit(source, "t.js", |unit| {
            let mut rewrite = Rewrite::new();
            fold(unit, &mut rewrite);
            rewrite.render(source).text
        })
        .unwrap()
    }

    #[test]
    fn test_finds_class_shape() {
        let source = "var C = (function(){ function C(){} return C; }());";
        let classes = with_source_unit(source, "t.js", find_classes).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "C");
        assert_eq!(classes[0].return_span.start, 36);
    }

    #[test]
    fn test_folds_static_property() {
        assert_eq!(
            folded("var C = (function(){ function C(){} return C; }()); C.p = 1;"),
            "var C = (function(){ function C(){} C.p = 1;return C; }());"
        );
    }

    #[test]
    fn test_folds_with_outer_call_parens() {
        assert_eq!(
            folded("var C = (function(){ function C(){} return C; })(); C.p = 1;"),
            "var C = (function(){ function C(){} C.p = 1;return C; })();"
        );
    }

    #[test]
    fn test_keeps_source_order_of_several_assignments() {
        let source = "\
var C = (function () {
    function C() {
    }
    return C;
}());
C.a = 1;
C.b = 2;
";
        let expected = "\
var C = (function () {
    function C() {
    }
    C.a = 1;
    C.b = 2;
    return C;
}());
";
        assert_eq!(folded(source), expected);
    }

    #[test]
    fn test_inner_function_must_share_name() {
        let source = "var C = (function(){ function D(){} return D; }()); C.p = 1;";
        assert_eq!(folded(source), source);
    }

    #[test]
    fn test_single_statement_body_is_not_a_class() {
        let source = "var C = (function(){ return 1; }()); C.p = 1;";
        assert_eq!(folded(source), source);
    }

    #[test]
    fn test_redeclared_name_is_not_folded() {
        let source = "var C = (function(){ function C(){} return C; }()); var C; C.p = 1;";
        assert_eq!(folded(source), source);
    }

    #[test]
    fn test_nested_assignment_is_not_folded() {
        let source = "var C = (function(){ function C(){} return C; }()); if (x) { C.p = 1; }";
        assert_eq!(folded(source), source);
    }

    #[test]
    fn test_compound_assignment_is_not_folded() {
        let source = "var C = (function(){ function C(){} return C; }()); C.p += 1;";
        assert_eq!(folded(source), source);
    }

    #[test]
    fn test_removed_statement_is_skipped() {
        let source = "var C = (function(){ function C(){} return C; }()); C.p = 1;";
        with_source_unit(source, "t.js", |unit| {
            let mut rewrite = Rewrite::new();
            rewrite.remove(Span::new(52, 60));
            assert_eq!(fold(unit, &mut rewrite), 0);
        })
        .unwrap();
    }
}
