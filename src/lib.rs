//! # Build Optimizer
//!
//! Source-to-source optimizer for down-leveled, class-based framework output.
//!
//! ## Passes
//!
//! 1. **Helper-import rewrite**: inlined `__extends`/`__decorate`/`__metadata`/
//!    `__param` declarations become imports from `tslib`.
//! 2. **Pure annotation**: top-level calls and `new` expressions get a
//!    `/*@__PURE__*/` marker and the unit gets a `PURE_IMPORTS_START ...
//!    PURE_IMPORTS_END` manifest comment.
//! 3. **Metadata scrub**: `decorators`, `propDecorators`, `ctorParameters` and
//!    `__decorate(...)` entries that resolve to framework symbols are removed.
//! 4. **Class fold**: static member assignments move into the class closure.
//!
//! All passes record edits against the original text and the result is
//! rendered and validated once. The [`purify`] pass runs separately over
//! concatenated bundles and reads back the manifests.
//!
//! ## Invariants
//!
//! - Output is either fully transformed and valid, or the input unchanged.
//! - Framework identity is decided by declaring symbol, never by name alone.
//! - Statements that only partly match a recognized shape are left alone.

pub mod cache;
pub mod class_fold;
pub mod classify;
pub mod discovery;
pub mod edits;
pub mod import_tslib;
pub mod loader;
pub mod parse;
pub mod prefix_functions;
pub mod purify;
pub mod scrub;
pub mod source_map;
pub mod transform;
pub mod validate;

#[cfg(test)]
mod scrub_tests;

#[cfg(feature = "napi")]
pub use loader::{load_native, purify_native, transform_native};

pub use loader::{load, LoaderOptions};
pub use purify::purify;
pub use source_map::SourceMap;
pub use transform::{transform, TransformOptions, TransformOutput};
pub use validate::*;
