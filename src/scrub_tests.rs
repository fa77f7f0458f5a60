//! Metadata scrub scenarios run through classification and the scrubber only,
//! so the expected text shows exactly what the scrub removes.

#[cfg(test)]
mod tests {
    use crate::classify::classify;
    use crate::edits::Rewrite;
    use crate::parse::with_source_unit;
    use crate::scrub::scrub;
    use pretty_assertions::assert_eq;

    fn scrubbed(source: &str) -> String {
        with_source_unit(source, "t.js", |unit| {
            let symbols = classify(unit);
            let mut rewrite = Rewrite::new();
            scrub(unit, &symbols, &mut rewrite);
            rewrite.render(source).text
        })
        .unwrap()
    }

    const DECORATE_HELPER: &str = "var __decorate = (this && this.__decorate) || function (decorators, target) { return Reflect.decorate(decorators, target); };\n";

    // ═══════════════════════════════════════════════════════════════════════════════
    // ASSIGNMENT FORM
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_removes_all_metadata_statements() {
        let source = "import { Component, Input, Injector } from '@angular/core';
var Clazz = (function () { function Clazz() { } return Clazz; }());
Clazz.decorators = [{ type: Component, args: [{ selector: 'app' }] }];
Clazz.propDecorators = { 'value': [{ type: Input }] };
Clazz.ctorParameters = function () { return [{ type: Injector }]; };
";
        assert_eq!(
            scrubbed(source),
            "import { Component, Input, Injector } from '@angular/core';
var Clazz = (function () { function Clazz() { } return Clazz; }());
"
        );
    }

    #[test]
    fn test_unrelated_module_is_untouched() {
        let source = "import { Component } from 'other-lib';
var Clazz = (function () { function Clazz() { } return Clazz; }());
Clazz.decorators = [{ type: Component }];
";
        assert_eq!(scrubbed(source), source);
    }

    #[test]
    fn test_mixed_decorator_array_keeps_unrecognized() {
        let source = "import { Injectable } from '@angular/core';
Clazz.decorators = [{ type: Injectable }, { type: NotInjectable }];
";
        assert_eq!(
            scrubbed(source),
            "import { Injectable } from '@angular/core';
Clazz.decorators = [{ type: NotInjectable }];
"
        );
    }

    #[test]
    fn test_non_object_element_is_a_mismatch() {
        let source = "import { Injectable } from '@angular/core';
Clazz.decorators = [{ type: Injectable }, extra];
";
        assert_eq!(scrubbed(source), source);
    }

    #[test]
    fn test_descriptor_with_two_type_keys_is_kept() {
        let source = "import { Injectable } from '@angular/core';
Clazz.decorators = [{ type: Injectable, type: Injectable }];
";
        assert_eq!(scrubbed(source), source);
    }

    #[test]
    fn test_prop_decorators_partial_removal() {
        let source = "import { Input } from '@angular/core';
Clazz.propDecorators = { 'value': [{ type: Input }], 'other': [{ type: Custom }] };
";
        assert_eq!(
            scrubbed(source),
            "import { Input } from '@angular/core';
Clazz.propDecorators = { 'other': [{ type: Custom }] };
"
        );
    }

    #[test]
    fn test_prop_decorators_mixed_member() {
        let source = "import { Input } from '@angular/core';
Clazz.propDecorators = { 'value': [{ type: Input }, { type: Custom }] };
";
        assert_eq!(
            scrubbed(source),
            "import { Input } from '@angular/core';
Clazz.propDecorators = { 'value': [{ type: Custom }] };
"
        );
    }

    #[test]
    fn test_prop_decorators_with_non_array_member_is_kept() {
        let source = "import { Input } from '@angular/core';
Clazz.propDecorators = { 'value': [{ type: Input }], 'other': meta };
";
        assert_eq!(scrubbed(source), source);
    }

    #[test]
    fn test_ctor_parameters_whitelist() {
        let source = "var PlatformRef_ = (function () { function PlatformRef_() { } return PlatformRef_; }());
PlatformRef_.ctorParameters = function () { return []; };
var Other = (function () { function Other() { } return Other; }());
Other.ctorParameters = function () { return []; };
";
        assert_eq!(
            scrubbed(source),
            "var PlatformRef_ = (function () { function PlatformRef_() { } return PlatformRef_; }());
PlatformRef_.ctorParameters = function () { return []; };
var Other = (function () { function Other() { } return Other; }());
"
        );
    }

    #[test]
    fn test_ctor_parameters_must_be_a_function() {
        let source = "Clazz.ctorParameters = [{ type: Injector }];\n";
        assert_eq!(scrubbed(source), source);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // DECORATE HELPER FORM
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_decorate_call_drops_framework_entries() {
        let source = format!(
            "import {{ Component }} from '@angular/core';
{}var Clazz = (function () {{
    function Clazz() {{ }}
    Clazz = __decorate([
        Component({{ selector: 'app' }}),
        Other()
    ], Clazz);
    return Clazz;
}}());
",
            DECORATE_HELPER
        );
        let expected = format!(
            "import {{ Component }} from '@angular/core';
{}var Clazz = (function () {{
    function Clazz() {{ }}
    Clazz = __decorate([
        Other()
    ], Clazz);
    return Clazz;
}}());
",
            DECORATE_HELPER
        );
        assert_eq!(scrubbed(&source), expected);
    }

    #[test]
    fn test_decorate_helper_imported_from_tslib() {
        let source = "import { Component } from '@angular/core';
import { __decorate } from 'tslib';
var Clazz = (function () {
    function Clazz() { }
    Clazz = __decorate([Component({}), Other()], Clazz);
    return Clazz;
}());
";
        assert!(scrubbed(source).contains("Clazz = __decorate([Other()], Clazz);"));
    }

    #[test]
    fn test_shadowed_decorator_is_kept() {
        let source = format!(
            "import {{ Component }} from '@angular/core';
{}var Clazz = (function (Component) {{
    function Clazz() {{ }}
    Clazz = __decorate([Component({{}})], Clazz);
    return Clazz;
}}(Local));
",
            DECORATE_HELPER
        );
        assert_eq!(scrubbed(&source), source);
    }

    #[test]
    fn test_redeclared_helper_is_ambiguous() {
        let source = format!(
            "import {{ Component }} from '@angular/core';
{0}{0}var Clazz = (function () {{
    function Clazz() {{ }}
    Clazz = __decorate([Component({{}})], Clazz);
    return Clazz;
}}());
",
            DECORATE_HELPER
        );
        assert_eq!(scrubbed(&source), source);
    }
}
