//! The closed registry of supported object-file formats.
//!
//! Three formats, one capability table: parse, stringify, blank detection and
//! cacheability are all dispatched off this enum. The set is closed by
//! design; there is no plugin registration.

use crate::cson;
use crate::error::Diagnostic;
use crate::keys;
use crate::value::Value;
use crate::writer;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    /// The human-friendly notation; parsed as YAML after translation.
    Cson,
    Yaml,
}

impl Format {
    /// Extension probe order used by the resolver. First match wins.
    pub const RESOLUTION_ORDER: [&'static str; 4] = ["json", "cson", "yml", "yaml"];

    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext {
            "json" => Some(Format::Json),
            "cson" => Some(Format::Cson),
            "yml" | "yaml" => Some(Format::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Format> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }

    /// Only CSON parses are cached. JSON and raw YAML are treated as cheap
    /// enough to re-parse on every read and never touch the cache or its
    /// counters.
    pub fn cached(self) -> bool {
        matches!(self, Format::Cson)
    }

    /// Whether the content holds no value at all: whitespace only, or (for
    /// the comment-bearing formats) comments and whitespace only.
    pub fn is_blank(self, text: &str) -> bool {
        match self {
            Format::Json => text.trim().is_empty(),
            Format::Yaml => text.lines().all(|line| {
                let trimmed = line.trim();
                trimmed.is_empty() || trimmed.starts_with('#')
            }),
            Format::Cson => cson::is_blank(text),
        }
    }

    /// Parse non-blank text. Duplicate map keys are last-wins unless
    /// `allow_duplicate_keys` is false, in which case the second occurrence
    /// of a key is a located error. Syntax errors win over duplicate-key
    /// errors: the uniqueness pass only runs on text that already parsed.
    pub fn parse(self, text: &str, allow_duplicate_keys: bool) -> Result<Value, Diagnostic> {
        match self {
            Format::Json => serde_json::from_str(text).map_err(|e| Diagnostic::json(&e, text)),
            Format::Yaml => {
                let value = serde_yaml::from_str(text).map_err(|e| Diagnostic::yaml(&e, text))?;
                if !allow_duplicate_keys {
                    keys::check_unique(text, text)?;
                }
                Ok(value)
            }
            Format::Cson => {
                let yaml = cson::translate(text);
                let value = serde_yaml::from_str(&yaml).map_err(|e| Diagnostic::yaml(&e, text))?;
                if !allow_duplicate_keys {
                    keys::check_unique(&yaml, text)?;
                }
                Ok(value)
            }
        }
    }

    /// Serialize a value in this format. JSON renders pretty-printed;
    /// everything else goes through the CSON writer (whose output is valid
    /// YAML). Output always ends with a newline.
    pub fn stringify(self, value: &Value) -> String {
        match self {
            Format::Json => {
                let mut text = serde_json::to_string_pretty(value)
                    .expect("BUG: Value always serializes as JSON");
                text.push('\n');
                text
            }
            Format::Cson | Format::Yaml => writer::stringify(value),
        }
    }
}
