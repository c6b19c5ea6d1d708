//! The read/write pipeline and its parse cache.
//!
//! [`Store`] is the process-wide context object: it owns the in-memory parse
//! cache, the hit/miss counters and the cache-namespace setting. Construct
//! one explicitly and share it (`Store` is `Send + Sync`); tests get isolated
//! instances instead of needing a global reset.
//!
//! Reads flow resolve → fingerprint → cache lookup → read bytes → parse →
//! duplicate-key check → cache store. Writes serialize by the literal
//! extension and never populate the cache, so the next read re-validates from
//! disk.

use crate::error::{ParseError, StoreError, StoreResult};
use crate::format::Format;
use crate::resolve;
use crate::value::Value;
use crate::writer;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;
use tracing::{debug, trace};

const LOCK_POISONED: &str = "parse cache lock poisoned";

/// Options for a single read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// When true (the default), the last occurrence of a repeated map key
    /// wins. When false, a repeated key is a located parse error, and the
    /// read bypasses the parse cache entirely so a permissively-cached value
    /// can never mask the error.
    pub allow_duplicate_keys: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            allow_duplicate_keys: true,
        }
    }
}

/// Parse-cache counters. Only cached-format reads move them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Cheap proxy for "have this file's bytes changed since we parsed them".
///
/// Size plus mtime. Equality is trusted without re-reading bytes; a mismatch
/// always re-parses. Sub-second mtime granularity can in theory mask an
/// equal-size rewrite, which the lazy-revalidation design accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: SystemTime,
}

impl Fingerprint {
    fn of(meta: &fs::Metadata) -> Fingerprint {
        Fingerprint {
            len: meta.len(),
            // Platforms without mtime degrade to a size-only fingerprint.
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

/// Owned exclusively by the cache; replaced wholesale, never mutated.
#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: Fingerprint,
    value: Value,
}

/// Entries are namespaced by the configured cache directory so distinct
/// directories never share a parse result.
type CacheKey = (Option<PathBuf>, PathBuf);

/// The object-file store: path resolution, parsing, and the parse cache.
#[derive(Debug, Default)]
pub struct Store {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    cache_dir: RwLock<Option<PathBuf>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    /// Select the cache namespace. `None` is the single global namespace.
    /// The directory is an opaque key prefix; nothing is written there and
    /// the cache stays in-memory.
    pub fn set_cache_dir(&self, dir: Option<PathBuf>) {
        *self.cache_dir.write().expect(LOCK_POISONED) = dir;
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters without evicting any entry.
    pub fn reset_cache_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Drop every cache entry and zero the counters. Test-isolation hook;
    /// the engine never calls this itself.
    pub fn reset(&self) {
        self.entries.write().expect(LOCK_POISONED).clear();
        self.reset_cache_stats();
    }

    /// Read and parse an object file, blocking. Extension-less paths are
    /// resolved against the registered extensions; blank files read as
    /// [`Value::Null`].
    pub fn read_file_sync<P: AsRef<Path>>(&self, path: P) -> StoreResult<Value> {
        self.read_file_sync_with(path, &ReadOptions::default())
    }

    pub fn read_file_sync_with<P: AsRef<Path>>(
        &self,
        path: P,
        options: &ReadOptions,
    ) -> StoreResult<Value> {
        let (file, format, fingerprint) = self.prepare_read(path.as_ref(), options)?;
        if let Some(fp) = &fingerprint {
            if let Some(value) = self.cache_lookup(&file, fp) {
                return Ok(value);
            }
        }
        let text = fs::read_to_string(&file).map_err(|e| io_error(&file, e))?;
        self.finish_read(&file, format, fingerprint, &text, options)
    }

    /// Async form of [`Store::read_file_sync`]. Suspends only at the
    /// filesystem boundary; parsing is synchronous CPU work. Resolves exactly
    /// once with either the value or the error.
    pub async fn read_file<P: AsRef<Path>>(&self, path: P) -> StoreResult<Value> {
        self.read_file_with(path, &ReadOptions::default()).await
    }

    pub async fn read_file_with<P: AsRef<Path>>(
        &self,
        path: P,
        options: &ReadOptions,
    ) -> StoreResult<Value> {
        let (file, format, fingerprint) = self.prepare_read(path.as_ref(), options)?;
        if let Some(fp) = &fingerprint {
            if let Some(value) = self.cache_lookup(&file, fp) {
                return Ok(value);
            }
        }
        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| io_error(&file, e))?;
        self.finish_read(&file, format, fingerprint, &text, options)
    }

    /// Serialize and write, blocking. The literal extension decides the
    /// format; `.json` writes JSON, anything else writes CSON. Writes never
    /// populate the cache.
    pub fn write_file_sync<P: AsRef<Path>>(&self, path: P, value: &Value) -> StoreResult<()> {
        let path = path.as_ref();
        fs::write(path, serialize_for(path, value)).map_err(|e| io_error(path, e))
    }

    /// Async form of [`Store::write_file_sync`].
    pub async fn write_file<P: AsRef<Path>>(&self, path: P, value: &Value) -> StoreResult<()> {
        let path = path.as_ref();
        tokio::fs::write(path, serialize_for(path, value))
            .await
            .map_err(|e| io_error(path, e))
    }

    /// Resolve, classify and (for cached reads) fingerprint the target file.
    /// The resolve step stats synchronously in both call shapes; only the
    /// byte read suspends.
    fn prepare_read(
        &self,
        requested: &Path,
        options: &ReadOptions,
    ) -> StoreResult<(PathBuf, Format, Option<Fingerprint>)> {
        let Some(file) = resolve::resolve(requested) else {
            trace!(path = %requested.display(), "object path did not resolve");
            return Err(StoreError::NotFound {
                path: requested.to_path_buf(),
            });
        };
        let format = Format::from_path(&file).unwrap_or(Format::Cson);
        // Strict reads bypass the cache in both directions; see ReadOptions.
        let fingerprint = if format.cached() && options.allow_duplicate_keys {
            let meta = fs::metadata(&file).map_err(|e| io_error(&file, e))?;
            Some(Fingerprint::of(&meta))
        } else {
            None
        };
        Ok((file, format, fingerprint))
    }

    /// Parse the bytes and (for cached reads) store the result under the
    /// fingerprint observed before the read.
    fn finish_read(
        &self,
        file: &Path,
        format: Format,
        fingerprint: Option<Fingerprint>,
        text: &str,
        options: &ReadOptions,
    ) -> StoreResult<Value> {
        let value = if format.is_blank(text) {
            Value::Null
        } else {
            format
                .parse(text, options.allow_duplicate_keys)
                .map_err(|diagnostic| StoreError::Parse(ParseError::new(file, diagnostic)))?
        };
        if let Some(fingerprint) = fingerprint {
            self.cache_store(file, fingerprint, value.clone());
        }
        Ok(value)
    }

    fn cache_key(&self, file: &Path) -> CacheKey {
        (
            self.cache_dir.read().expect(LOCK_POISONED).clone(),
            file.to_path_buf(),
        )
    }

    fn cache_lookup(&self, file: &Path, fingerprint: &Fingerprint) -> Option<Value> {
        let key = self.cache_key(file);
        let (hit, stale) = {
            let entries = self.entries.read().expect(LOCK_POISONED);
            match entries.get(&key) {
                Some(entry) if entry.fingerprint == *fingerprint => {
                    (Some(entry.value.clone()), false)
                }
                Some(_) => (None, true),
                None => (None, false),
            }
        };
        if let Some(value) = hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(path = %file.display(), "parse cache hit");
            Some(value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(path = %file.display(), stale, "parse cache miss");
            None
        }
    }

    fn cache_store(&self, file: &Path, fingerprint: Fingerprint, value: Value) {
        let key = self.cache_key(file);
        let entry = CacheEntry { fingerprint, value };
        self.entries.write().expect(LOCK_POISONED).insert(key, entry);
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The caller's extension is authoritative on write; anything that is not
/// JSON serializes through the CSON writer.
fn serialize_for(path: &Path, value: &Value) -> String {
    match Format::from_path(path) {
        Some(Format::Json) => Format::Json.stringify(value),
        _ => writer::stringify(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn blank_files_read_as_null_for_every_extension() {
        let dir = TempDir::new().unwrap();
        for name in ["empty.cson", "empty.json", "empty.yml", "empty.yaml"] {
            let path = write_fixture(&dir, name, "");
            assert_eq!(Store::new().read_file_sync(&path).unwrap(), Value::Null);
        }
        for name in ["line.cson", "line.json", "line.yml"] {
            let path = write_fixture(&dir, name, "  \n\n");
            assert_eq!(Store::new().read_file_sync(&path).unwrap(), Value::Null);
        }
    }

    #[test]
    fn comment_only_files_read_as_null() {
        let dir = TempDir::new().unwrap();
        let single = write_fixture(&dir, "single.cson", "# just a comment\n");
        let multi = write_fixture(&dir, "multi.cson", "###\na: 1\nnothing real\n###\n");
        let store = Store::new();
        assert_eq!(store.read_file_sync(&single).unwrap(), Value::Null);
        assert_eq!(store.read_file_sync(&multi).unwrap(), Value::Null);
    }

    #[test]
    fn missing_files_are_not_found_with_the_requested_path() {
        let dir = TempDir::new().unwrap();
        let requested = dir.path().join("does-not-exist.cson");
        let err = Store::new().read_file_sync(&requested).unwrap_err();
        match err {
            StoreError::NotFound { path } => assert_eq!(path, requested),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn extension_less_paths_resolve_before_reading() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "settings.cson", "theme: dark\n");
        let value = Store::new()
            .read_file_sync(dir.path().join("settings"))
            .unwrap();
        assert_eq!(value.get("theme"), Some(&Value::from("dark")));
    }

    #[test]
    fn json_reads_never_touch_the_cache_counters() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.json", r#"{"a": 1}"#);
        let store = Store::new();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 0 });
        store.read_file_sync(&path).unwrap();
        store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 0 });
    }

    #[test]
    fn yaml_reads_never_touch_the_cache_counters() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.yml", "a: 1\n");
        let store = Store::new();
        store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 0 });
    }

    #[test]
    fn cson_reads_count_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\nb:\n  c: true\n");
        let store = Store::new();
        let first = store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 1 });
        let second = store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(first, second);
    }

    #[test]
    fn stale_fingerprints_reparse() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = Store::new();
        assert_eq!(
            store.read_file_sync(&path).unwrap().get("a"),
            Some(&Value::from(1i64))
        );
        // Different length guarantees a fingerprint change even on
        // coarse-mtime filesystems.
        fs::write(&path, "a: 22\n").unwrap();
        assert_eq!(
            store.read_file_sync(&path).unwrap().get("a"),
            Some(&Value::from(22i64))
        );
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[test]
    fn reset_stats_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = Store::new();
        store.read_file_sync(&path).unwrap();
        store.reset_cache_stats();
        store.read_file_sync(&path).unwrap();
        // A hit right after the reset proves the entry survived.
        assert_eq!(store.cache_stats(), CacheStats { hits: 1, misses: 0 });
    }

    #[test]
    fn full_reset_clears_entries_and_counters() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = Store::new();
        store.read_file_sync(&path).unwrap();
        store.reset();
        store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[test]
    fn cache_directories_namespace_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = Store::new();
        store.set_cache_dir(Some(PathBuf::from("/ns/one")));
        store.read_file_sync(&path).unwrap();
        store.set_cache_dir(Some(PathBuf::from("/ns/two")));
        store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 2 });
        // Back to the first namespace: still warm.
        store.set_cache_dir(Some(PathBuf::from("/ns/one")));
        store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[test]
    fn strict_duplicate_keys_error_with_exact_message() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "duplicate-keys.cson", "foo: 1\nbar: 2\nfoo: 3\n");
        let store = Store::new();
        let strict = ReadOptions {
            allow_duplicate_keys: false,
        };
        let err = store.read_file_sync_with(&path, &strict).unwrap_err();
        let StoreError::Parse(parse) = err else {
            panic!("expected a parse error");
        };
        assert_eq!(
            parse.message,
            "Map keys must be unique at line 3, column 1:\n\nbar: 2\nfoo: 3\n^\n"
        );
        assert_eq!(parse.code, Some(ErrorCode::DuplicateKey));
        assert_eq!(parse.path, path);
        assert_eq!(parse.filename, path);

        // The permissive default keeps the last occurrence and the other key.
        let value = store.read_file_sync(&path).unwrap();
        assert_eq!(value.get("foo"), Some(&Value::from(3i64)));
        assert_eq!(value.get("bar"), Some(&Value::from(2i64)));
    }

    #[test]
    fn strict_reads_accept_unique_files_and_skip_the_cache() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\nb:\n  c: true\n");
        let store = Store::new();
        let strict = ReadOptions {
            allow_duplicate_keys: false,
        };
        let value = store.read_file_sync_with(&path, &strict).unwrap();
        assert_eq!(value.get("a"), Some(&Value::from(1i64)));
        assert_eq!(
            value.get("b").and_then(|b| b.get("c")),
            Some(&Value::Bool(true))
        );
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 0 });
    }

    #[test]
    fn cson_syntax_errors_carry_path_and_code() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "syntax-error.cson", "a: [1, 2\nb: 3\n");
        let err = Store::new().read_file_sync(&path).unwrap_err();
        let StoreError::Parse(parse) = err else {
            panic!("expected a parse error");
        };
        assert_eq!(parse.path, path);
        assert_eq!(parse.filename, path);
        assert_eq!(parse.code, Some(ErrorCode::UnexpectedToken));
        assert!(parse.to_string().contains("syntax-error.cson"));
    }

    #[test]
    fn json_syntax_errors_carry_path() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "syntax-error.json", "{\"a\": }");
        let err = Store::new().read_file_sync(&path).unwrap_err();
        let StoreError::Parse(parse) = err else {
            panic!("expected a parse error");
        };
        assert_eq!(parse.path, path);
        assert_eq!(parse.filename, path);
        assert!(parse.code.is_none());
        assert!(parse.line.is_some());
    }

    #[test]
    fn cached_values_are_isolated_copies() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = Store::new();
        let mut first = store.read_file_sync(&path).unwrap();
        if let Value::Object(entries) = &mut first {
            entries.insert("mutated".to_string(), Value::Bool(true));
        }
        let second = store.read_file_sync(&path).unwrap();
        assert_eq!(second.get("mutated"), None);
    }

    #[test]
    fn write_file_sync_round_trips_every_extension() {
        let dir = TempDir::new().unwrap();
        let store = Store::new();
        let value = crate::parse("a: 1\nb:\n  c: true\n").unwrap();
        for name in ["out.json", "out.cson", "out.yml", "out.yaml"] {
            let path = dir.path().join(name);
            store.write_file_sync(&path, &value).unwrap();
            assert_eq!(store.read_file_sync(&path).unwrap(), value, "{name}");
        }
    }

    #[test]
    fn writes_do_not_populate_the_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.cson");
        let store = Store::new();
        store
            .write_file_sync(&path, &Value::from("hello"))
            .unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 0 });
        store.read_file_sync(&path).unwrap();
        assert_eq!(store.cache_stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[test]
    fn write_into_missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("out.cson");
        let err = Store::new()
            .write_file_sync(&path, &Value::Null)
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn async_read_matches_sync_read() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\nb:\n  c: true\n");
        let store = Store::new();
        let from_async = store.read_file(&path).await.unwrap();
        let from_sync = store.read_file_sync(&path).unwrap();
        assert_eq!(from_async, from_sync);
        // First (async) read missed, second (sync) hit the same cache.
        assert_eq!(store.cache_stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn async_read_surfaces_not_found_as_err() {
        let dir = TempDir::new().unwrap();
        let store = Store::new();
        for name in ["missing.cson", "missing.json"] {
            let err = store.read_file(dir.path().join(name)).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound { .. }));
        }
    }

    #[tokio::test]
    async fn async_read_of_blank_files_is_null() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "empty.cson", "\n  \n");
        assert_eq!(Store::new().read_file(&path).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn async_strict_duplicate_keys_error() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "duplicate-keys.cson", "foo: 1\nbar: 2\nfoo: 3\n");
        let store = Store::new();
        let strict = ReadOptions {
            allow_duplicate_keys: false,
        };
        let err = store.read_file_with(&path, &strict).await.unwrap_err();
        let StoreError::Parse(parse) = err else {
            panic!("expected a parse error");
        };
        assert!(parse.message.contains("Map keys must be unique at line"));
    }

    #[tokio::test]
    async fn async_write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = Store::new();
        let value = crate::parse("a: 1\nb: 2\n").unwrap();
        for name in ["file1.json", "file1.yml", "file1.cson"] {
            let path = dir.path().join(name);
            store.write_file(&path, &value).await.unwrap();
            assert_eq!(store.read_file(&path).await.unwrap(), value, "{name}");
        }
    }

    #[tokio::test]
    async fn caller_panic_after_read_is_observed_once_and_store_survives() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = std::sync::Arc::new(Store::new());

        let task_store = store.clone();
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            let value = task_store.read_file(&task_path).await.unwrap();
            assert!(!value.is_null());
            panic!("caller exploded after receiving the value");
        });

        // The panic surfaces exactly once, through the join error.
        let join_err = handle.await.unwrap_err();
        assert!(join_err.is_panic());

        // The pipeline's own bookkeeping is unaffected: the read completed,
        // the entry is cached, and the store keeps working.
        assert_eq!(store.cache_stats().misses, 1);
        let value = store.read_file(&path).await.unwrap();
        assert_eq!(value.get("a"), Some(&Value::from(1i64)));
        assert_eq!(store.cache_stats().hits, 1);
    }

    #[test]
    fn concurrent_sync_reads_stay_consistent() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sample.cson", "a: 1\n");
        let store = std::sync::Arc::new(Store::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                store.read_file_sync(&path).unwrap()
            }));
        }
        for handle in handles {
            let value = handle.join().unwrap();
            assert_eq!(value.get("a"), Some(&Value::from(1i64)));
        }
        let stats = store.cache_stats();
        assert_eq!(stats.hits + stats.misses, 8);
        assert!(stats.misses >= 1);
    }
}
