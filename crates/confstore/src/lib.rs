//! # confstore
//!
//! Object files — structured values stored as CSON, JSON or YAML — behind one
//! uniform read/write API with an in-memory parse cache.
//!
//! The [`Store`] is the entry point: it resolves a possibly extension-less
//! path to a concrete file (probing `.json`, `.cson`, `.yml`, `.yaml` in that
//! order), decides whether a cached parse is still valid by a size+mtime
//! fingerprint, parses on miss, optionally enforces key uniqueness, and
//! reports location-aware errors. Both blocking and async call shapes share
//! the same cache and semantics.
//!
//! ```no_run
//! use confstore::{Store, Value};
//!
//! let store = Store::new();
//! let value = store.read_file_sync("config")?; // resolves config.json, .cson, ...
//! if let Some(theme) = value.get("theme") {
//!     println!("theme = {theme}");
//! }
//! store.write_file_sync("out.cson", &value)?;
//! # Ok::<(), confstore::StoreError>(())
//! ```
//!
//! Blank files (whitespace, or whitespace plus comments where the format has
//! comments) read as [`Value::Null`]. Only CSON reads are cached; JSON and
//! YAML re-parse on every read and never move the cache counters.

pub mod cson;
pub mod error;
pub mod format;
pub mod resolve;
pub mod store;
pub mod value;
pub mod writer;

mod keys;
mod regex_util;

pub use error::{Diagnostic, ErrorCode, ParseError, StoreError, StoreResult};
pub use format::Format;
pub use resolve::{is_object_path, resolve};
pub use store::{CacheStats, ReadOptions, Store};
pub use value::Value;

/// Parse CSON text with the permissive default options. Blank text parses to
/// [`Value::Null`].
pub fn parse(text: &str) -> Result<Value, Diagnostic> {
    parse_with(text, &ReadOptions::default())
}

/// Parse CSON text with explicit options.
pub fn parse_with(text: &str, options: &ReadOptions) -> Result<Value, Diagnostic> {
    if Format::Cson.is_blank(text) {
        return Ok(Value::Null);
    }
    Format::Cson.parse(text, options.allow_duplicate_keys)
}

/// Serialize a value as CSON text. The output is also valid YAML and always
/// ends with a newline.
pub fn stringify(value: &Value) -> String {
    writer::stringify(value)
}
