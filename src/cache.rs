//! # Module Cache
//!
//! Content-timestamped persistence of compiled bitcode, one file per module
//! (spec §4.E). Ported from `DefaultModuleCache` (`lib/core/include/chi/
//! DefaultModuleCache.hpp`, see `SPEC_FULL.md` §3): freshness is a strict
//! modification-time comparison, not a content hash.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{ChiError, Result};

/// Persists and retrieves compiled bitcode for a module, keyed by the
/// module's full name.
pub trait ModuleCache {
    /// Stores `bitcode` as the cached compilation of `module_full_name`.
    fn store(&self, module_full_name: &str, bitcode: &[u8]) -> Result<()>;

    /// Returns the cached bitcode for `module_full_name` iff its on-disk
    /// modification time is strictly newer than `must_be_newer_than`.
    /// Returns `Ok(None)` — not an error — on any staleness or absence.
    fn retrieve(&self, module_full_name: &str, must_be_newer_than: SystemTime) -> Result<Option<Vec<u8>>>;

    /// Deletes the cached entry for `module_full_name`, if any.
    fn invalidate(&self, module_full_name: &str) -> Result<()>;

    /// The modification time of the cached entry, if present. Used by
    /// dependents to derive their own freshness timestamp transitively.
    fn freshness_timestamp(&self, module_full_name: &str) -> Result<Option<SystemTime>>;
}

/// Escapes a module full name the same way [`crate::mangle::mangle`] escapes
/// it, minus the `_m` delimiter (spec §6 "Cache layout").
fn escape_for_cache_filename(module_full_name: &str) -> String {
    module_full_name
        .replace('_', "__")
        .replace('/', "_s")
        .replace('.', "_d")
}

/// File-backed [`ModuleCache`] rooted at `<workspace>/.chigraphcache/`.
/// Not safe for concurrent writers — the cache is process-local (spec §4.E).
pub struct DefaultModuleCache {
    cache_dir: PathBuf,
}

impl DefaultModuleCache {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: workspace_root.as_ref().join(".chigraphcache"),
        }
    }

    /// `<workspace>/.chigraphcache/<escaped-name>.bc`.
    pub fn path_for(&self, module_full_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.bc", escape_for_cache_filename(module_full_name)))
    }

    fn io_err(&self, module_full_name: &str, source: std::io::Error) -> ChiError {
        ChiError::Cache {
            module: module_full_name.to_string(),
            source,
        }
    }
}

impl ModuleCache for DefaultModuleCache {
    fn store(&self, module_full_name: &str, bitcode: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| self.io_err(module_full_name, e))?;
        let path = self.path_for(module_full_name);
        std::fs::write(&path, bitcode).map_err(|e| self.io_err(module_full_name, e))?;
        tracing::debug!("[CACHE] stored {} bytes for {}", bitcode.len(), module_full_name);
        Ok(())
    }

    fn retrieve(&self, module_full_name: &str, must_be_newer_than: SystemTime) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(module_full_name);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[CACHE] miss (no file) for {}", module_full_name);
                return Ok(None);
            }
            Err(e) => return Err(self.io_err(module_full_name, e)),
        };

        let mtime = metadata.modified().map_err(|e| self.io_err(module_full_name, e))?;
        if mtime <= must_be_newer_than {
            tracing::debug!("[CACHE] stale entry for {}", module_full_name);
            return Ok(None);
        }

        let bytes = std::fs::read(&path).map_err(|e| self.io_err(module_full_name, e))?;
        tracing::debug!("[CACHE] hit for {}", module_full_name);
        Ok(Some(bytes))
    }

    fn invalidate(&self, module_full_name: &str) -> Result<()> {
        let path = self.path_for(module_full_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(module_full_name, e)),
        }
    }

    fn freshness_timestamp(&self, module_full_name: &str) -> Result<Option<SystemTime>> {
        let path = self.path_for(module_full_name);
        match std::fs::metadata(&path) {
            Ok(m) => Ok(Some(m.modified().map_err(|e| self.io_err(module_full_name, e))?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(module_full_name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn store_then_retrieve_with_an_old_enough_timestamp_hits() {
        let root = tempdir().unwrap();
        let cache = DefaultModuleCache::new(root.path());
        cache.store("a/b", b"bitcode").unwrap();

        let before_store = SystemTime::now() - Duration::from_secs(60);
        let hit = cache.retrieve("a/b", before_store).unwrap();
        assert_eq!(hit, Some(b"bitcode".to_vec()));
    }

    #[test]
    fn retrieve_with_a_newer_required_timestamp_misses() {
        let root = tempdir().unwrap();
        let cache = DefaultModuleCache::new(root.path());
        cache.store("a/b", b"bitcode").unwrap();

        let after_store = SystemTime::now() + Duration::from_secs(60);
        let hit = cache.retrieve("a/b", after_store).unwrap();
        assert_eq!(hit, None);
    }

    #[test]
    fn retrieve_of_missing_entry_is_ok_none() {
        let root = tempdir().unwrap();
        let cache = DefaultModuleCache::new(root.path());
        assert_eq!(cache.retrieve("never/stored", SystemTime::UNIX_EPOCH).unwrap(), None);
    }

    #[test]
    fn invalidate_removes_the_cache_file() {
        let root = tempdir().unwrap();
        let cache = DefaultModuleCache::new(root.path());
        cache.store("a/b", b"bitcode").unwrap();
        cache.invalidate("a/b").unwrap();
        assert!(cache.freshness_timestamp("a/b").unwrap().is_none());
    }

    #[test]
    fn cache_path_uses_the_same_escaping_as_mangling() {
        let root = tempdir().unwrap();
        let cache = DefaultModuleCache::new(root.path());
        let path = cache.path_for("a/b.c_d");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "a_sb_dc__d.bc");
    }
}
