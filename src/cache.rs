use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::transform::{TransformOptions, TransformOutput};

pub const DEFAULT_CACHE_DIR: &str = ".build-optimizer/cache";

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub output: TransformOutput,
}

/// Pipeline results keyed by input path, valid while the input text and the
/// options that shape the output are unchanged.
pub struct ResultCache {
    cache_dir: PathBuf,
}

impl ResultCache {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).ok();
        }
        Self { cache_dir }
    }

    pub fn compute_hash(source: &str, options: &TransformOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([options.emit_source_map as u8, options.strict as u8]);
        for path in [&options.input_file_path, &options.output_file_path] {
            hasher.update(path.as_deref().unwrap_or("").as_bytes());
            hasher.update([0]);
        }
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, file_path: &str) -> PathBuf {
        let safe_name = file_path
            .replace('/', "_")
            .replace('\\', "_")
            .replace(':', "_");
        self.cache_dir.join(format!("{}.json", safe_name))
    }

    pub fn get(&self, file_path: &str, source: &str, options: &TransformOptions) -> Option<TransformOutput> {
        let entry_path = self.entry_path(file_path);
        let data = fs::read_to_string(&entry_path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(file = file_path, error = %e, "discarding unreadable cache entry");
                fs::remove_file(entry_path).ok();
                return None;
            }
        };

        (entry.hash == Self::compute_hash(source, options)).then_some(entry.output)
    }

    pub fn set(&self, file_path: &str, source: &str, options: &TransformOptions, output: &TransformOutput) {
        let entry = CacheEntry {
            hash: Self::compute_hash(source, options),
            output: output.clone(),
        };
        if let Ok(data) = serde_json::to_string(&entry) {
            fs::write(self.entry_path(file_path), data).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(content: &str) -> TransformOutput {
        TransformOutput {
            content: content.to_string(),
            source_map: None,
        }
    }

    #[test]
    fn test_hit_after_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let options = TransformOptions::default();
        cache.set("src/a.js", "var a;", &options, &output("var a;"));
        let hit = cache.get("src/a.js", "var a;", &options).unwrap();
        assert_eq!(hit.content, "var a;");
    }

    #[test]
    fn test_miss_when_source_or_options_change() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let options = TransformOptions::default();
        cache.set("a.js", "var a;", &options, &output("var a;"));
        assert!(cache.get("a.js", "var b;", &options).is_none());
        let strict = TransformOptions {
            strict: true,
            ..Default::default()
        };
        assert!(cache.get("a.js", "var a;", &strict).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let path = dir.path().join("a.js.json");
        fs::write(&path, "{not json").unwrap();
        assert!(cache.get("a.js", "var a;", &TransformOptions::default()).is_none());
        assert!(!path.exists());
    }
}
