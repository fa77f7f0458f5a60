//! Symbol Classifier
//!
//! Decides whether an identifier denotes a recognized framework construct by
//! resolving it to its declaring symbol and testing set membership. Names are
//! never compared at use sites: a local `Injectable` that shadows the import,
//! or an `Injectable` imported from another module, is not recognized.

use lazy_static::lazy_static;
use oxc_ast::ast::{BindingPattern, IdentifierReference, ImportDeclarationSpecifier, Statement};
use oxc_semantic::{Scoping, SymbolId};
use std::collections::HashSet;

use crate::parse::SourceUnit;

pub const FRAMEWORK_MODULE: &str = "@angular/core";

lazy_static! {
    /// Decorator factories and property decorators whose metadata is dropped.
    pub static ref FRAMEWORK_SPECIFIERS: Vec<&'static str> = vec![
        // Class level decorators.
        "Component",
        "Directive",
        "Injectable",
        "NgModule",
        "Pipe",
        // Property level decorators.
        "ContentChild",
        "ContentChildren",
        "HostBinding",
        "HostListener",
        "Input",
        "Output",
        "ViewChild",
        "ViewChildren",
    ];
}

/// Outcome of resolving one identifier reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Global or otherwise undeclared.
    Unresolved,
    Unique(SymbolId),
    /// Declared more than once, so no single declaration can be trusted.
    Ambiguous(SymbolId),
}

/// Identifier -> declaring symbol, backed by oxc scoping.
pub struct Resolver<'s> {
    scoping: &'s Scoping,
}

impl<'s> Resolver<'s> {
    pub fn new(scoping: &'s Scoping) -> Self {
        Self { scoping }
    }

    pub fn resolve(&self, ident: &IdentifierReference<'_>) -> Resolution {
        let Some(reference_id) = ident.reference_id.get() else {
            return Resolution::Unresolved;
        };
        match self.scoping.get_reference(reference_id).symbol_id() {
            None => Resolution::Unresolved,
            Some(symbol) if !self.scoping.symbol_redeclarations(symbol).is_empty() => {
                Resolution::Ambiguous(symbol)
            }
            Some(symbol) => Resolution::Unique(symbol),
        }
    }

    /// The symbol only when it has exactly one declaration.
    pub fn unique(&self, ident: &IdentifierReference<'_>) -> Option<SymbolId> {
        match self.resolve(ident) {
            Resolution::Unique(symbol) => Some(symbol),
            _ => None,
        }
    }
}

/// Declarations that denote recognized decorator or metadata names in one unit.
#[derive(Debug, Default, Clone)]
pub struct FrameworkSymbolSet {
    symbols: HashSet<SymbolId>,
}

impl FrameworkSymbolSet {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        self.symbols.contains(&symbol)
    }

    /// True when `ident` resolves to exactly one declaration in the set.
    pub fn recognizes(&self, resolver: &Resolver<'_>, ident: &IdentifierReference<'_>) -> bool {
        resolver
            .unique(ident)
            .map_or(false, |symbol| self.contains(symbol))
    }
}

/// Builds the framework symbol set for `unit`.
///
/// Imports from the framework module win. Without any such import, a local
/// declaration set is accepted only if every allow-listed name is declared at
/// the top level.
pub fn classify(unit: &SourceUnit<'_>) -> FrameworkSymbolSet {
    let mut symbols = HashSet::new();
    let mut saw_framework_import = false;

    for stmt in &unit.program.body {
        let Statement::ImportDeclaration(import) = stmt else {
            continue;
        };
        if import.source.value != FRAMEWORK_MODULE {
            continue;
        }
        saw_framework_import = true;
        let Some(specifiers) = &import.specifiers else {
            continue;
        };
        for specifier in specifiers {
            let ImportDeclarationSpecifier::ImportSpecifier(spec) = specifier else {
                continue;
            };
            let imported = spec.imported.name();
            if FRAMEWORK_SPECIFIERS.contains(&imported.as_str()) {
                if let Some(symbol) = spec.local.symbol_id.get() {
                    symbols.insert(symbol);
                }
            }
        }
    }

    if !saw_framework_import {
        symbols = local_framework_declarations(unit).unwrap_or_default();
    }

    FrameworkSymbolSet { symbols }
}

/// All-or-nothing: `None` unless every allow-listed name is declared.
fn local_framework_declarations(unit: &SourceUnit<'_>) -> Option<HashSet<SymbolId>> {
    let mut found: Vec<(&str, SymbolId)> = Vec::new();
    for stmt in &unit.program.body {
        let Statement::VariableDeclaration(decl) = stmt else {
            continue;
        };
        for declarator in &decl.declarations {
            let BindingPattern::BindingIdentifier(id) = &declarator.id else {
                continue;
            };
            if let Some(name) = FRAMEWORK_SPECIFIERS.iter().find(|n| **n == id.name.as_str()) {
                if let Some(symbol) = id.symbol_id.get() {
                    found.push((*name, symbol));
                }
            }
        }
    }

    let all_declared = FRAMEWORK_SPECIFIERS
        .iter()
        .all(|name| found.iter().any(|(n, _)| n == name));
    all_declared.then(|| found.into_iter().map(|(_, symbol)| symbol).collect())
}
