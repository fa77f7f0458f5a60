//! Bundler adapter and the native bindings.
//!
//! A bundler hands each module's text to [`load`] together with the map of
//! the loaders that ran before it. The returned map is chained onto that one
//! so positions still lead back to the first source.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::source_map::{compose, SourceMap};
use crate::transform::{strip_source_mapping_comments, transform, TransformOptions, TransformOutput};
use crate::validate::OptimizerError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderOptions {
    pub source_map: bool,
}

pub fn load(
    content: &str,
    previous_map: Option<&SourceMap>,
    options: &LoaderOptions,
) -> Result<TransformOutput, OptimizerError> {
    let transform_options = TransformOptions {
        emit_source_map: options.source_map,
        ..Default::default()
    };
    let TransformOutput {
        content,
        source_map,
    } = transform(content, &transform_options)?;
    // Maps travel out of band.
    let content = strip_source_mapping_comments(&content);

    let source_map = match (source_map, previous_map) {
        (Some(mut intermediate), Some(previous)) => {
            intermediate.sources = vec![previous.file.clone()];
            intermediate.file = previous.file.clone();
            Some(compose(&intermediate, previous)?)
        }
        (source_map, _) => source_map,
    };

    Ok(TransformOutput {
        content,
        source_map,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs the pipeline. `options_json` is a camelCase `TransformOptions`; the
/// result is a JSON `{ content, sourceMap }`.
#[cfg(feature = "napi")]
#[napi]
pub fn transform_native(content: String, options_json: Option<String>) -> napi::Result<String> {
    let options: TransformOptions = match options_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| napi::Error::from_reason(format!("Options parse error: {}", e)))?,
        None => TransformOptions::default(),
    };
    let output = transform(&content, &options).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&output)
        .map_err(|e| napi::Error::from_reason(format!("Serialize error: {}", e)))
}

#[cfg(feature = "napi")]
#[napi]
pub fn purify_native(content: String) -> String {
    crate::purify::purify(&content)
}

#[cfg(feature = "napi")]
#[napi]
pub fn load_native(
    content: String,
    previous_map_json: Option<String>,
    source_map: bool,
) -> napi::Result<String> {
    let previous = previous_map_json
        .map(|json| SourceMap::from_json(&json))
        .transpose()
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let output = load(&content, previous.as_ref(), &LoaderOptions { source_map })
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&output)
        .map_err(|e| napi::Error::from_reason(format!("Serialize error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::SourceMapBuilder;

    const TRANSFORMABLE: &str = "import { Injectable } from '@angular/core';\nvar Clazz = (function () { function Clazz() { } return Clazz; }());\nClazz.decorators = [{ type: Injectable }];\n";

    #[test]
    fn test_without_maps() {
        let output = load(TRANSFORMABLE, None, &LoaderOptions::default()).unwrap();
        assert!(output.source_map.is_none());
        assert!(!output.content.contains("decorators"));
    }

    #[test]
    fn test_first_loader_returns_pipeline_map() {
        let output = load(TRANSFORMABLE, None, &LoaderOptions { source_map: true }).unwrap();
        let map = output.source_map.unwrap();
        assert_eq!(map.sources, vec![String::new()]);
        assert!(!output.content.contains("sourceMappingURL"));
    }

    #[test]
    fn test_chains_previous_map() {
        let mut builder = SourceMapBuilder::new("module.js", "module.ts");
        for line in 0..4 {
            builder.add_mapping(line, 0, line, 0);
        }
        let previous = builder.build();

        let output = load(
            TRANSFORMABLE,
            Some(&previous),
            &LoaderOptions { source_map: true },
        )
        .unwrap();
        let map = output.source_map.unwrap();
        assert!(map.sources.contains(&"module.ts".to_string()));
        // Line 0 of the output is the manifest comment.
        let origin = map.lookup(1, 0).unwrap().unwrap();
        assert_eq!(map.sources[origin.source as usize], "module.ts");
        assert_eq!(origin.line, 0);
    }

    #[test]
    fn test_malformed_previous_map_is_an_error() {
        let mut previous = SourceMapBuilder::new("module.js", "module.ts").build();
        previous.mappings = "gggggggggggggggA".to_string();
        let err = load(
            TRANSFORMABLE,
            Some(&previous),
            &LoaderOptions { source_map: true },
        )
        .unwrap_err();
        assert_eq!(err.code, crate::validate::ERR_SOURCE_MAP);
    }

    #[test]
    fn test_strips_embedded_map_comment() {
        let content = format!("{}//# sourceMappingURL=module.js.map\n", TRANSFORMABLE);
        let output = load(&content, None, &LoaderOptions::default()).unwrap();
        assert!(!output.content.contains("sourceMappingURL"));
    }
}
