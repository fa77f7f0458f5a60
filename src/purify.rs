//! Bundle Purifier
//!
//! A text-only pass over bundler output. No tree is available here, so every
//! rule is a regex substitution from the [`SUBSTITUTIONS`] table. Each rule
//! leaves already annotated text alone, so purifying twice equals purifying
//! once.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::prefix_functions::PURE_MARKER;

/// One named text rewrite. `tokens` are the import tokens recovered from the
/// bundle's manifests.
pub struct Substitution {
    pub name: &'static str,
    pub apply: fn(content: &str, tokens: &[String]) -> String,
}

lazy_static! {
    static ref MANIFEST: Regex =
        Regex::new(r"/\*\* PURE_IMPORTS_START (\S+) PURE_IMPORTS_END \*/").unwrap();
    static ref MANIFEST_TOKEN: Regex = Regex::new(r"\A[\w$.]+\z").unwrap();

    static ref LICENSE: Regex =
        Regex::new(r"/\*\*(?:[^*]|\*+[^*/])*\**@license(?:[^*]|\*+[^*/])*\*+/(?:\r?\n)?").unwrap();

    static ref TS22_ENUM_HEAD: Regex = Regex::new(r"var (\S+) = \{\};\r?\n").unwrap();
    static ref TS23_ENUM_HEAD: Regex =
        Regex::new(r"var (\S+);(?:/\*@__PURE__\*/)*\r?\n\(function \((\S+)\) \{").unwrap();

    static ref CLASS_CLOSURE: Regex = Regex::new(
        r"(?m)^(var (\S+) = )(\(function \(\) \{\r?\n(?:    (?:/\*\*| \*|\*/|//)[^\r\n]*\r?\n)*    function (\S+?)\([^)]*\) \{\r?\n)"
    )
    .unwrap();
    static ref EXTENDS_CLOSURE: Regex = Regex::new(
        r"(?m)^(var (\S+) = )(\(function \(_super\) \{\r?\n    \w*__extends\(\w+, _super\);\r?\n)"
    )
    .unwrap();

    static ref FACTORY_CALL: Regex = Regex::new(
        r#"\w*__WEBPACK_IMPORTED_MODULE_\d+__angular_core__\["\w+" /\* (ɵccf|ɵcmf) \*/\]\("#
    )
    .unwrap();
    static ref MODULE_FACTORY: Regex = Regex::new(
        r#"new \w*__WEBPACK_IMPORTED_MODULE_\d+__angular_core__\["\w+" /\* NgModuleFactory \*/\]"#
    )
    .unwrap();

    /// Applied in order.
    pub static ref SUBSTITUTIONS: Vec<Substitution> = vec![
        Substitution { name: "strip-licenses", apply: strip_licenses },
        Substitution { name: "ts22-enums", apply: wrap_ts22_enums },
        Substitution { name: "ts23-enums", apply: wrap_ts23_enums },
        Substitution { name: "class-closures", apply: prefix_class_closures },
        Substitution { name: "extends-closures", apply: prefix_extends_closures },
        Substitution { name: "webpack-imports", apply: prefix_webpack_imports },
        Substitution { name: "webpack-default-imports", apply: prefix_webpack_default_imports },
        Substitution { name: "factory-calls", apply: prefix_factory_calls },
        Substitution { name: "module-factories", apply: prefix_module_factories },
    ];
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANIFEST
// ═══════════════════════════════════════════════════════════════════════════════

/// Union of the tokens of every manifest comment in `content`, first
/// occurrence order. Malformed tokens are dropped.
pub fn manifest_tokens(content: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for caps in MANIFEST.captures_iter(content) {
        for token in caps[1].split(',') {
            if MANIFEST_TOKEN.is_match(token) && !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
    }
    tokens
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════════

fn preceded_by_marker(content: &str, at: usize) -> bool {
    content[..at].ends_with(PURE_MARKER)
}

/// Prefixes every match of `re` with a pure marker unless one is already there.
fn prefix_matches(re: &Regex, content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for found in re.find_iter(content) {
        if preceded_by_marker(content, found.start()) {
            continue;
        }
        out.push_str(&content[last..found.start()]);
        out.push_str(PURE_MARKER);
        last = found.start();
    }
    out.push_str(&content[last..]);
    out
}

fn strip_licenses(content: &str, _tokens: &[String]) -> String {
    LICENSE.replace_all(content, "").into_owned()
}

/// End offset of a TS 2.2 enum body starting at `start`:
/// `X.A = 0;` lines, then `X[X.A] = "A";`, then more reverse lookups.
fn ts22_enum_end(content: &str, start: usize, name: &str) -> Option<usize> {
    let n = regex::escape(name);
    let assignment = Regex::new(&format!(r"\A{n}\.(\S+) = \d+;\r?\n")).ok()?;
    let first_lookup = Regex::new(&format!(r#"\A{n}\[{n}\.(\S+)\] = "(\S+)";\r?\n"#)).ok()?;
    let lookup = Regex::new(&format!(r#"\A{n}\[{n}\.(\S+)\] = "\S+";\r?\n*"#)).ok()?;

    let mut pos = start;
    let mut assignments = 0;
    while let Some(found) = assignment.find(&content[pos..]) {
        pos += found.end();
        assignments += 1;
    }
    if assignments == 0 {
        return None;
    }

    let caps = first_lookup.captures(&content[pos..])?;
    if caps[1] != caps[2] {
        return None;
    }
    pos += caps[0].len();

    let mut lookups = 0;
    while let Some(found) = lookup.find(&content[pos..]) {
        pos += found.end();
        lookups += 1;
    }
    (lookups > 0).then_some(pos)
}

fn wrap_ts22_enums(content: &str, _tokens: &[String]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    let mut search = 0;
    while let Some(caps) = TS22_ENUM_HEAD.captures_at(content, search) {
        let (Some(head), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let name = name.as_str();
        search = head.end();

        let prefix = format!("var {} = {}(function() {{\n", name, PURE_MARKER);
        if content[..head.start()].ends_with(&prefix) {
            continue;
        }
        let Some(end) = ts22_enum_end(content, head.end(), name) else {
            continue;
        };
        out.push_str(&content[last..head.start()]);
        out.push_str(&prefix);
        out.push_str(&content[head.start()..end]);
        out.push_str(&format!("; return {};}})();\n", name));
        last = end;
        search = end;
    }
    out.push_str(&content[last..]);
    out
}

fn wrap_ts23_enums(content: &str, _tokens: &[String]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    let mut search = 0;
    while let Some(caps) = TS23_ENUM_HEAD.captures_at(content, search) {
        let Some(head) = caps.get(0) else {
            break;
        };
        search = head.end();
        if caps[1] != caps[2] {
            continue;
        }
        let name = &caps[1];
        let n = regex::escape(name);
        let Ok(body) = Regex::new(&format!(
            r#"\A\s+({n}\[{n}\["(\S+)"\] = 0\] = "(\S+)";(?:\s+{n}\[{n}\["\S+"\] = \d+\] = "\S+";)*\r?\n)\}}\)\({n} \|\| \({n} = \{{\}}\)\);"#
        )) else {
            continue;
        };
        let Some(body_caps) = body.captures(&content[head.end()..]) else {
            continue;
        };
        if body_caps[2] != body_caps[3] {
            continue;
        }
        let end = head.end() + body_caps[0].len();
        out.push_str(&content[last..head.start()]);
        out.push_str(&format!(
            "var {name} = {marker}(function() {{\n    var {name} = {{}};\n    {members}    return {name};\n}})();",
            name = name,
            marker = PURE_MARKER,
            members = &body_caps[1],
        ));
        last = end;
        search = end;
    }
    out.push_str(&content[last..]);
    out
}

/// `$1/*@__PURE__*/$3` when the variable and inner function names agree.
fn prefix_class_closures(content: &str, _tokens: &[String]) -> String {
    CLASS_CLOSURE
        .replace_all(content, |caps: &Captures| {
            if caps[2] == caps[4] {
                format!("{}{}{}", &caps[1], PURE_MARKER, &caps[3])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn prefix_extends_closures(content: &str, _tokens: &[String]) -> String {
    EXTENDS_CLOSURE
        .replace_all(content, |caps: &Captures| {
            format!("{}{}{}", &caps[1], PURE_MARKER, &caps[3])
        })
        .into_owned()
}

fn prefix_import_assignments(content: &str, tokens: &[String], suffix: &str, call: &str) -> String {
    if tokens.is_empty() {
        return content.to_string();
    }
    let alternatives: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
    let pattern = format!(r"(_({}){} = )({})", alternatives.join("|"), suffix, call);
    let Ok(re) = Regex::new(&pattern) else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &Captures| {
        format!("{}{}{}", &caps[1], PURE_MARKER, &caps[3])
    })
    .into_owned()
}

fn prefix_webpack_imports(content: &str, tokens: &[String]) -> String {
    prefix_import_assignments(content, tokens, "__", r"__webpack_require__\(\S+\);")
}

fn prefix_webpack_default_imports(content: &str, tokens: &[String]) -> String {
    prefix_import_assignments(content, tokens, "___default", r"__webpack_require__\.\w\(\S+\);")
}

fn prefix_factory_calls(content: &str, _tokens: &[String]) -> String {
    prefix_matches(&FACTORY_CALL, content)
}

fn prefix_module_factories(content: &str, _tokens: &[String]) -> String {
    prefix_matches(&MODULE_FACTORY, content)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

pub fn purify(content: &str) -> String {
    let tokens = manifest_tokens(content);
    let mut current = content.to_string();
    for substitution in SUBSTITUTIONS.iter() {
        let next = (substitution.apply)(&current, &tokens);
        if next != current {
            debug!(rule = substitution.name, "purify rule applied");
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_tokens_are_unioned() {
        let content = "/** PURE_IMPORTS_START a,b PURE_IMPORTS_END */\n/** PURE_IMPORTS_START b,c PURE_IMPORTS_END */";
        assert_eq!(manifest_tokens(content), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_malformed_manifest_contributes_nothing() {
        assert!(manifest_tokens("/** PURE_IMPORTS_START  PURE_IMPORTS_END */").is_empty());
        assert!(manifest_tokens("/** PURE_IMPORTS_START a,(b PURE_IMPORTS_END */") == vec!["a"]);
    }

    #[test]
    fn test_prefix_matches_skips_marked() {
        let content = "x = /*@__PURE__*/new a__WEBPACK_IMPORTED_MODULE_1__angular_core__[\"b\" /* NgModuleFactory */];";
        assert_eq!(prefix_module_factories(content, &[]), content);
    }

    #[test]
    fn test_ts22_needs_matching_first_lookup() {
        let content = "var E = {};\nE.A = 0;\nE.B = 1;\nE[E.A] = \"B\";\nE[E.B] = \"B\";\n";
        assert_eq!(wrap_ts22_enums(content, &[]), content);
    }

    #[test]
    fn test_class_closure_names_must_agree() {
        let content = "var A = (function () {\n    function B() {\n    }\n    return B;\n}());\n";
        assert_eq!(prefix_class_closures(content, &[]), content);
    }

    #[test]
    fn test_import_rules_need_tokens() {
        let content = "var __WEBPACK_IMPORTED_MODULE_0_a__ = __webpack_require__(1);";
        assert_eq!(prefix_webpack_imports(content, &[]), content);
    }
}
