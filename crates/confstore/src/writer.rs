//! The CSON serializer.
//!
//! Produces single-quote-preferring YAML block style: bare scalars wherever
//! the text is unambiguous, `'...'` when quoting is needed, `"..."` only when
//! the string itself contains single quotes or characters that need escapes.
//! Empty collections render inline (`[]` / `{}`), non-empty ones indent under
//! their key, and the output always ends with a newline.

use crate::value::Value;
use indexmap::IndexMap;

/// Serialize a value as CSON text (also valid YAML).
pub fn stringify(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Array(items) if !items.is_empty() => write_items(&mut out, items, 0),
        Value::Object(entries) if !entries.is_empty() => write_entries(&mut out, entries, 0),
        scalar => {
            out.push_str(&inline(scalar));
            out.push('\n');
        }
    }
    out
}

/// Scalars and empty collections, rendered on one line.
fn inline(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(_) => "[]".to_string(),
        Value::Object(_) => "{}".to_string(),
    }
}

fn is_inline(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        _ => true,
    }
}

fn write_entries(out: &mut String, entries: &IndexMap<String, Value>, indent: usize) {
    let pad = "  ".repeat(indent);
    for (key, value) in entries {
        out.push_str(&pad);
        out.push_str(&quote(key));
        if is_inline(value) {
            out.push_str(": ");
            out.push_str(&inline(value));
            out.push('\n');
        } else {
            out.push_str(":\n");
            match value {
                Value::Array(items) => write_items(out, items, indent + 1),
                Value::Object(nested) => write_entries(out, nested, indent + 1),
                _ => unreachable!("is_inline covers every scalar"),
            }
        }
    }
}

fn write_items(out: &mut String, items: &[Value], indent: usize) {
    let pad = "  ".repeat(indent);
    for item in items {
        if is_inline(item) {
            out.push_str(&pad);
            out.push_str("- ");
            out.push_str(&inline(item));
            out.push('\n');
        } else {
            // The item's first line shares the dash line; the rest keep the
            // deeper padding.
            let mut nested = String::new();
            match item {
                Value::Array(inner) => write_items(&mut nested, inner, indent + 1),
                Value::Object(entries) => write_entries(&mut nested, entries, indent + 1),
                _ => unreachable!("is_inline covers every scalar"),
            }
            out.push_str(&pad);
            out.push_str("- ");
            out.push_str(&nested[pad.len() + 2..]);
        }
    }
}

/// Quote a string scalar (or object key) as needed.
///
/// Strings containing double quotes go in single quotes; strings containing
/// single quotes (and none double) go in double quotes; anything else that is
/// ambiguous as a bare scalar is single-quoted.
fn quote(s: &str) -> String {
    if s.chars().any(|c| c.is_control()) {
        double_quoted(s)
    } else if s.contains('"') {
        single_quoted(s)
    } else if s.contains('\'') {
        double_quoted(s)
    } else if needs_quoting(s) {
        single_quoted(s)
    } else {
        s.to_string()
    }
}

fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    let first = s.chars().next().unwrap_or(' ');
    if s.trim() != s {
        return true;
    }
    // Leading indicator characters open collections, anchors, comments and
    // friends in YAML.
    if "-?:,[]{}#&*!|>%@`\"'".contains(first) {
        return true;
    }
    // Text that would parse as some other scalar type.
    if matches!(
        s.to_ascii_lowercase().as_str(),
        "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off"
    ) {
        return true;
    }
    if s.parse::<f64>().is_ok() {
        return true;
    }
    // Hex and octal integer spellings.
    if s.starts_with("0x") || s.starts_with("0o") {
        return true;
    }
    // A colon or hash in key/comment position changes the parse.
    s.contains(": ") || s.ends_with(':') || s.contains(" #")
}

fn single_quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
