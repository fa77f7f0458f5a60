//! Metadata Scrubber
//!
//! Drops framework reflection metadata that down-level compilers attach to
//! classes after their declaration:
//!
//! ```text
//! Clazz.decorators = [{ type: Injectable }];
//! Clazz.propDecorators = { 'input': [{ type: Input }] };
//! Clazz.ctorParameters = function () { return [{ type: Injector }]; };
//! Clazz = __decorate([Component({...}), __metadata(...)], Clazz);
//! ```
//!
//! Statements that only partly match a shape are left untouched.

use lazy_static::lazy_static;
use oxc_ast::ast::{
    ArrayExpression, ArrayExpressionElement, AssignmentOperator, AssignmentTarget, BindingPattern,
    Expression, ExpressionStatement, IdentifierReference, ImportDeclarationSpecifier,
    ObjectExpression, ObjectPropertyKind, PropertyKey, StaticMemberExpression, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::SymbolId;
use oxc_span::{GetSpan, Span};
use tracing::debug;

use crate::classify::{FrameworkSymbolSet, Resolver};
use crate::edits::{statement_cut, Rewrite};
use crate::parse::SourceUnit;
use crate::prefix_functions::HELPER_MODULE;

lazy_static! {
    /// Classes whose constructor metadata must survive for platform bootstrap.
    pub static ref PLATFORM_WHITELIST: Vec<&'static str> = vec![
        "PlatformRef_",
        "TestabilityRegistry",
        "Console",
        "BrowserPlatformLocation",
    ];
}

const DECORATE_HELPERS: [&str; 2] = ["__decorate", "___decorate"];

// ═══════════════════════════════════════════════════════════════════════════════
// SHAPES
// ═══════════════════════════════════════════════════════════════════════════════

/// `<Identifier>.<property> = <right>` as a plain `=` assignment.
fn metadata_assignment<'s, 'a>(
    stmt: &'s ExpressionStatement<'a>,
) -> Option<(&'s IdentifierReference<'a>, &'s str, &'s Expression<'a>)> {
    let Expression::AssignmentExpression(assign) = &stmt.expression else {
        return None;
    };
    if assign.operator != AssignmentOperator::Assign {
        return None;
    }
    let AssignmentTarget::StaticMemberExpression(member) = &assign.left else {
        return None;
    };
    let Expression::Identifier(class_id) = &member.object else {
        return None;
    };
    Some((class_id, member.property.name.as_str(), &assign.right))
}

/// Spans to cut so the kept items stay a valid comma separated list.
///
/// A run of removed items is cut up to the next kept item, or from the end of
/// the previous kept item when the run is last. Removing everything empties
/// the brackets.
pub fn excise(items: &[Span], removed: &[bool], inner: Span) -> Vec<Span> {
    let mut cuts = Vec::new();
    if !removed.is_empty() && removed.iter().all(|r| *r) {
        cuts.push(inner);
        return cuts;
    }
    let mut i = 0;
    while i < items.len() {
        if !removed[i] {
            i += 1;
            continue;
        }
        let mut j = i;
        while j + 1 < items.len() && removed[j + 1] {
            j += 1;
        }
        if j + 1 < items.len() {
            cuts.push(Span::new(items[i].start, items[j + 1].start));
        } else {
            cuts.push(Span::new(items[i - 1].end, items[j].end));
        }
        i = j + 1;
    }
    cuts
}

fn inner_span(span: Span) -> Span {
    Span::new(span.start + 1, span.end.saturating_sub(1).max(span.start + 1))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRUBBER
// ═══════════════════════════════════════════════════════════════════════════════

struct Scrubber<'u, 's> {
    unit: &'u SourceUnit<'u>,
    symbols: &'s FrameworkSymbolSet,
    resolver: Resolver<'u>,
    /// Whole statements.
    cuts: Vec<Span>,
    /// Elements of arrays and object literals.
    excisions: Vec<Span>,
}

impl<'u, 's> Scrubber<'u, 's> {
    /// `{ type: X, ... }` with exactly one `type` property whose value is a
    /// recognized identifier.
    fn is_framework_decorator(&self, object: &ObjectExpression<'_>) -> bool {
        let mut types = object.properties.iter().filter_map(|prop| match prop {
            ObjectPropertyKind::ObjectProperty(p)
                if !p.computed && matches!(&p.key, PropertyKey::StaticIdentifier(k) if k.name == "type") =>
            {
                Some(&p.value)
            }
            _ => None,
        });
        let (Some(value), None) = (types.next(), types.next()) else {
            return false;
        };
        match value {
            Expression::Identifier(ident) => self.symbols.recognizes(&self.resolver, ident),
            _ => false,
        }
    }

    /// Elements of an array made only of object literals.
    fn descriptor_objects<'e, 'a>(
        array: &'e ArrayExpression<'a>,
    ) -> Option<Vec<&'e ObjectExpression<'a>>> {
        array
            .elements
            .iter()
            .map(|element| match element {
                ArrayExpressionElement::ObjectExpression(object) => Some(&**object),
                _ => None,
            })
            .collect()
    }

    fn scrub_decorators(&mut self, stmt: &ExpressionStatement<'_>, right: &Expression<'_>) {
        let Expression::ArrayExpression(array) = right else {
            return;
        };
        let Some(objects) = Self::descriptor_objects(array) else {
            return;
        };
        let recognized: Vec<bool> = objects
            .iter()
            .map(|object| self.is_framework_decorator(object))
            .collect();
        if recognized.iter().all(|r| *r) {
            self.cuts.push(statement_cut(self.unit.text, stmt.span));
            return;
        }
        let items: Vec<Span> = objects.iter().map(|o| o.span).collect();
        self.excisions
            .extend(excise(&items, &recognized, inner_span(array.span)));
    }

    fn scrub_prop_decorators(&mut self, stmt: &ExpressionStatement<'_>, right: &Expression<'_>) {
        let Expression::ObjectExpression(map) = right else {
            return;
        };
        let mut members = Vec::with_capacity(map.properties.len());
        for prop in &map.properties {
            let ObjectPropertyKind::ObjectProperty(p) = prop else {
                return;
            };
            let Expression::ArrayExpression(array) = &p.value else {
                return;
            };
            members.push((p.span, &**array));
        }

        let mut member_removed = Vec::with_capacity(members.len());
        let mut partial_cuts = Vec::new();
        for (_, array) in &members {
            let Some(objects) = Self::descriptor_objects(array) else {
                member_removed.push(false);
                continue;
            };
            let recognized: Vec<bool> = objects
                .iter()
                .map(|object| self.is_framework_decorator(object))
                .collect();
            if recognized.iter().all(|r| *r) {
                member_removed.push(true);
            } else {
                member_removed.push(false);
                let items: Vec<Span> = objects.iter().map(|o| o.span).collect();
                partial_cuts.extend(excise(&items, &recognized, inner_span(array.span)));
            }
        }

        if member_removed.iter().all(|r| *r) {
            self.cuts.push(statement_cut(self.unit.text, stmt.span));
            return;
        }
        let items: Vec<Span> = members.iter().map(|(span, _)| *span).collect();
        self.excisions
            .extend(excise(&items, &member_removed, inner_span(map.span)));
        self.excisions.extend(partial_cuts);
    }

    fn scrub_ctor_parameters(
        &mut self,
        stmt: &ExpressionStatement<'_>,
        class_id: &IdentifierReference<'_>,
        right: &Expression<'_>,
    ) {
        if !matches!(right, Expression::FunctionExpression(_)) {
            return;
        }
        if PLATFORM_WHITELIST.contains(&class_id.name.as_str()) {
            return;
        }
        self.cuts.push(statement_cut(self.unit.text, stmt.span));
    }

    fn scrub_top_level(&mut self) {
        for stmt in &self.unit.program.body {
            let Statement::ExpressionStatement(stmt) = stmt else {
                continue;
            };
            let Some((class_id, property, right)) = metadata_assignment(stmt) else {
                continue;
            };
            match property {
                "decorators" => self.scrub_decorators(stmt, right),
                "propDecorators" => self.scrub_prop_decorators(stmt, right),
                "ctorParameters" => self.scrub_ctor_parameters(stmt, class_id, right),
                _ => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECORATE HELPER FORM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct ReflectDecorateFinder {
    found: bool,
}

impl<'a> Visit<'a> for ReflectDecorateFinder {
    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if matches!(&it.object, Expression::Identifier(id) if id.name == "Reflect")
            && it.property.name == "decorate"
        {
            self.found = true;
        }
        walk::walk_static_member_expression(self, it);
    }
}

/// The top-level `var __decorate = ...` whose body calls `Reflect.decorate`,
/// or `__decorate` imported from the helper module.
fn find_decorate_helper(unit: &SourceUnit<'_>) -> Option<SymbolId> {
    for stmt in &unit.program.body {
        if let Statement::ImportDeclaration(import) = stmt {
            if import.source.value != HELPER_MODULE {
                continue;
            }
            let imported = import.specifiers.iter().flatten().find_map(|spec| match spec {
                ImportDeclarationSpecifier::ImportSpecifier(spec)
                    if DECORATE_HELPERS.contains(&spec.imported.name().as_str()) =>
                {
                    spec.local.symbol_id.get()
                }
                _ => None,
            });
            if imported.is_some() {
                return imported;
            }
            continue;
        }
        let Statement::VariableDeclaration(decl) = stmt else {
            continue;
        };
        for declarator in &decl.declarations {
            let BindingPattern::BindingIdentifier(id) = &declarator.id else {
                continue;
            };
            if !DECORATE_HELPERS.contains(&id.name.as_str()) {
                continue;
            }
            let Some(init) = &declarator.init else {
                continue;
            };
            let mut finder = ReflectDecorateFinder::default();
            finder.visit_expression(init);
            if finder.found {
                return id.symbol_id.get();
            }
        }
    }
    None
}

struct DecorateCallScrubber<'r, 'u> {
    symbols: &'r FrameworkSymbolSet,
    resolver: &'r Resolver<'u>,
    helper: SymbolId,
    excisions: Vec<Span>,
}

impl<'r, 'u> DecorateCallScrubber<'r, 'u> {
    /// `target = helper([calls...], target)`; returns the decorator array.
    fn decorator_array<'e, 'a>(
        &self,
        stmt: &'e ExpressionStatement<'a>,
    ) -> Option<&'e ArrayExpression<'a>> {
        let Expression::AssignmentExpression(assign) = &stmt.expression else {
            return None;
        };
        if assign.operator != AssignmentOperator::Assign {
            return None;
        }
        let Expression::CallExpression(call) = &assign.right else {
            return None;
        };
        if call.arguments.len() != 2 {
            return None;
        }
        let Expression::Identifier(callee) = &call.callee else {
            return None;
        };
        if self.resolver.unique(callee) != Some(self.helper) {
            return None;
        }
        match call.arguments[0].as_expression() {
            Some(Expression::ArrayExpression(array)) => Some(array),
            _ => None,
        }
    }
}

impl<'a, 'r, 'u> Visit<'a> for DecorateCallScrubber<'r, 'u> {
    fn visit_expression_statement(&mut self, it: &ExpressionStatement<'a>) {
        let Some(array) = self.decorator_array(it) else {
            walk::walk_expression_statement(self, it);
            return;
        };
        let mut items = Vec::with_capacity(array.elements.len());
        let mut recognized = Vec::with_capacity(array.elements.len());
        for element in &array.elements {
            let is_framework = match element.as_expression() {
                Some(Expression::CallExpression(call)) => match &call.callee {
                    Expression::Identifier(callee) => self.symbols.recognizes(self.resolver, callee),
                    _ => false,
                },
                _ => false,
            };
            items.push(element.span());
            recognized.push(is_framework);
        }
        if recognized.iter().any(|r| *r) {
            let cuts = excise(&items, &recognized, inner_span(array.span));
            self.excisions.extend(cuts);
        }
    }
}

/// Records removals for every recognized metadata statement or entry.
/// Returns the number of ranges cut.
pub fn scrub(unit: &SourceUnit<'_>, symbols: &FrameworkSymbolSet, rewrite: &mut Rewrite) -> usize {
    let mut scrubber = Scrubber {
        unit,
        symbols,
        resolver: Resolver::new(unit.scoping),
        cuts: Vec::new(),
        excisions: Vec::new(),
    };
    scrubber.scrub_top_level();

    if let Some(helper) = find_decorate_helper(unit) {
        let mut decorate = DecorateCallScrubber {
            symbols,
            resolver: &scrubber.resolver,
            helper,
            excisions: Vec::new(),
        };
        decorate.visit_program(unit.program);
        scrubber.excisions.extend(decorate.excisions);
    }

    let Scrubber {
        cuts, excisions, ..
    } = scrubber;
    debug!(
        statements = cuts.len(),
        elements = excisions.len(),
        "scrubbed framework metadata"
    );
    for cut in &cuts {
        rewrite.remove(*cut);
    }
    // Markers on removed elements go with them.
    for cut in &excisions {
        rewrite.excise(*cut);
    }
    cuts.len() + excisions.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excise_leading_run() {
        let items = [Span::new(1, 5), Span::new(7, 11), Span::new(13, 17)];
        let cuts = excise(&items, &[true, true, false], Span::new(1, 17));
        assert_eq!(cuts, vec![Span::new(1, 13)]);
    }

    #[test]
    fn test_excise_trailing_run() {
        let items = [Span::new(1, 5), Span::new(7, 11), Span::new(13, 17)];
        let cuts = excise(&items, &[false, true, true], Span::new(1, 17));
        assert_eq!(cuts, vec![Span::new(5, 17)]);
    }

    #[test]
    fn test_excise_everything_empties_brackets() {
        let items = [Span::new(1, 5), Span::new(7, 11)];
        let cuts = excise(&items, &[true, true], Span::new(1, 12));
        assert_eq!(cuts, vec![Span::new(1, 12)]);
    }

    #[test]
    fn test_excise_nothing() {
        let items = [Span::new(1, 5)];
        assert!(excise(&items, &[false], Span::new(1, 5)).is_empty());
    }
}
