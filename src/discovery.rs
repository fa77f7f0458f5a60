//! File discovery and batch processing for the command line tools.
//!
//! Single files go through [`optimize_file`] / [`purify_file`]; directories
//! are walked and their files processed in parallel, one pipeline run per
//! file with nothing shared but the read-only rule tables.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::ResultCache;
use crate::purify::purify;
use crate::transform::{transform, TransformOptions, TransformOutput};
use crate::validate::{OptimizerError, ERR_SOURCE_MAP};

lazy_static! {
    static ref TS_OR_JS: Regex = Regex::new(r"\.(j|t)s$").unwrap();
}

pub const OPTIMIZED_SUFFIX: &str = ".ngo";
pub const PURIFIED_SUFFIX: &str = ".purify";
const BUNDLE_SUFFIX: &str = ".bundle.js";

// ═══════════════════════════════════════════════════════════════════════════════
// PATHS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn check_input_path(input: &str) -> Result<(), OptimizerError> {
    if TS_OR_JS.is_match(input) {
        Ok(())
    } else {
        Err(OptimizerError::input("Input file must be .js or .ts.", input))
    }
}

/// `main.js` + `.ngo` -> `main.ngo.js`.
pub fn default_output_path(input: &str, suffix: &str) -> Result<String, OptimizerError> {
    check_input_path(input)?;
    Ok(TS_OR_JS
        .replace(input, |caps: &regex::Captures| format!("{}{}", suffix, &caps[0]))
        .into_owned())
}

/// `.js` files below `dir`, skipping earlier optimizer output.
pub fn find_script_files(dir: &Path) -> Vec<PathBuf> {
    let marker = format!("{}.js", OPTIMIZED_SUFFIX);
    find_files(dir, |name| name.ends_with(".js") && !name.ends_with(&marker))
}

pub fn find_bundle_files(dir: &Path) -> Vec<PathBuf> {
    find_files(dir, |name| name.ends_with(BUNDLE_SUFFIX))
}

fn find_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().map_or(false, &keep))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE FILES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub emit_source_map: bool,
    pub strict: bool,
}

fn read(path: &Path) -> Result<String, OptimizerError> {
    fs::read_to_string(path).map_err(|e| OptimizerError::io(&path.to_string_lossy(), &e))
}

fn write(path: &Path, contents: &str) -> Result<(), OptimizerError> {
    fs::write(path, contents).map_err(|e| OptimizerError::io(&path.to_string_lossy(), &e))
}

/// Optimizes `input` into `output`, writing `<output>.map` when maps are on.
/// Returns true when the result came from `cache`.
pub fn optimize_file(
    input: &Path,
    output: &Path,
    options: BatchOptions,
    cache: Option<&ResultCache>,
) -> Result<bool, OptimizerError> {
    let content = read(input)?;
    let transform_options = TransformOptions {
        input_file_path: Some(input.to_string_lossy().into_owned()),
        output_file_path: Some(output.to_string_lossy().into_owned()),
        emit_source_map: options.emit_source_map,
        strict: options.strict,
    };
    let key = input.to_string_lossy();

    let cached = cache.and_then(|c| c.get(&key, &content, &transform_options));
    let from_cache = cached.is_some();
    let result: TransformOutput = match cached {
        Some(hit) => hit,
        None => {
            let result = transform(&content, &transform_options)?;
            if let Some(cache) = cache {
                cache.set(&key, &content, &transform_options, &result);
            }
            result
        }
    };

    write(output, &result.content)?;
    if let Some(map) = &result.source_map {
        let json = map.to_json().map_err(|e| {
            OptimizerError::new(ERR_SOURCE_MAP, &e.to_string(), &output.to_string_lossy(), 0, 0)
        })?;
        let mut map_path = output.as_os_str().to_owned();
        map_path.push(".map");
        write(Path::new(&map_path), &json)?;
    }
    debug!(input = %input.display(), output = %output.display(), from_cache, "optimized");
    Ok(from_cache)
}

pub fn purify_file(input: &Path, output: &Path) -> Result<(), OptimizerError> {
    let content = read(input)?;
    write(output, &purify(&content))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTORIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub cached: usize,
    pub failed: Vec<(PathBuf, OptimizerError)>,
}

impl BatchReport {
    fn from_results(results: Vec<(PathBuf, Result<bool, OptimizerError>)>) -> Self {
        let mut report = BatchReport::default();
        for (path, result) in results {
            match result {
                Ok(from_cache) => {
                    report.processed += 1;
                    if from_cache {
                        report.cached += 1;
                    }
                }
                Err(err) => {
                    warn!(file = %path.display(), "{}", err);
                    report.failed.push((path, err));
                }
            }
        }
        report
    }
}

/// Optimizes every script below `dir` next to its input as `<name>.ngo.js`.
pub fn optimize_directory(dir: &Path, options: BatchOptions, cache: Option<&ResultCache>) -> BatchReport {
    let files = find_script_files(dir);
    info!(dir = %dir.display(), files = files.len(), "optimizing directory");
    let results: Vec<_> = files
        .into_par_iter()
        .map(|input| {
            let result = default_output_path(&input.to_string_lossy(), OPTIMIZED_SUFFIX)
                .and_then(|output| optimize_file(&input, Path::new(&output), options, cache));
            (input, result)
        })
        .collect();
    BatchReport::from_results(results)
}

/// Purifies every `*.bundle.js` below `dir` in place.
pub fn purify_directory(dir: &Path) -> BatchReport {
    let files = find_bundle_files(dir);
    info!(dir = %dir.display(), files = files.len(), "purifying bundles");
    let results: Vec<_> = files
        .into_par_iter()
        .map(|path| {
            let result = purify_file(&path, &path).map(|_| false);
            (path, result)
        })
        .collect();
    BatchReport::from_results(results)
}
