//! Strict duplicate-key enforcement over block-mapping text.
//!
//! The YAML engine is last-wins on duplicate keys and cannot report where a
//! second occurrence sits, so the opt-in uniqueness pass scans the text
//! directly. It understands the block style this crate reads and writes:
//! indentation-scoped mappings, `- ` sequence items and `#` comments.
//! Flow-style collections (`{a: 1, a: 2}`) are not inspected.
//!
//! For CSON input the scan runs over the line-count-preserving YAML
//! translation while the snippet is cut from the original source, so the
//! reported location always points into the caller's file.

use crate::error::Diagnostic;
use crate::regex_util::static_regex;
use regex::Regex;
use std::collections::HashSet;

static_regex!(
    fn key_pattern,
    r#"^(?:"(?P<dq>(?:[^"\\]|\\.)*)"|'(?P<sq>[^']*)'|(?P<plain>[^\s:#"'][^:#]*?))\s*:(?:\s|$)"#
);

struct Frame {
    indent: usize,
    keys: HashSet<String>,
}

/// Scan `scan` (block YAML) for a key that re-occurs within one mapping
/// scope. On the first duplicate, returns the fixed uniqueness diagnostic
/// located at the second occurrence, with context cut from `source`.
pub(crate) fn check_unique(scan: &str, source: &str) -> Result<(), Diagnostic> {
    let mut frames: Vec<Frame> = Vec::new();

    for (index, line) in scan.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut col = line.len() - trimmed.len();

        // Each dash starts a fresh node, so sibling keys from the previous
        // sequence item stop counting.
        loop {
            let rest = &line[col..];
            if rest == "-" {
                frames.retain(|frame| frame.indent <= col);
                break;
            }
            if let Some(after) = rest.strip_prefix("- ") {
                frames.retain(|frame| frame.indent <= col);
                col += 2 + (after.len() - after.trim_start().len());
            } else {
                break;
            }
        }

        let rest = &line[col..];
        let Some(captures) = key_pattern().captures(rest) else {
            continue;
        };
        let key = captures
            .name("plain")
            .or_else(|| captures.name("dq"))
            .or_else(|| captures.name("sq"))
            .map(|m| m.as_str().trim_end().to_string())
            .unwrap_or_default();

        while frames.last().is_some_and(|frame| frame.indent > col) {
            frames.pop();
        }
        match frames.last_mut() {
            Some(frame) if frame.indent == col => {
                if !frame.keys.insert(key) {
                    return Err(Diagnostic::duplicate_key(source, index + 1, col + 1));
                }
            }
            _ => {
                frames.push(Frame {
                    indent: col,
                    keys: HashSet::from([key]),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn check(text: &str) -> Result<(), Diagnostic> {
        check_unique(text, text)
    }

    #[test]
    fn unique_keys_pass() {
        assert!(check("a: 1\nb:\n  c: true\n").is_ok());
    }

    #[test]
    fn top_level_duplicate_is_located_at_second_occurrence() {
        let err = check("foo: 1\nbar: 2\nfoo: 3\n").unwrap_err();
        assert_eq!(err.line, Some(3));
        assert_eq!(err.column, Some(1));
        assert_eq!(err.code, Some(ErrorCode::DuplicateKey));
        assert_eq!(
            err.message,
            "Map keys must be unique at line 3, column 1:\n\nbar: 2\nfoo: 3\n^\n"
        );
    }

    #[test]
    fn nested_duplicate_is_detected() {
        let err = check("a:\n  x: 1\n  y: 2\n  x: 3\n").unwrap_err();
        assert_eq!(err.line, Some(4));
        assert_eq!(err.column, Some(3));
    }

    #[test]
    fn same_key_in_sibling_scopes_is_fine() {
        assert!(check("a:\n  x: 1\nb:\n  x: 1\n").is_ok());
    }

    #[test]
    fn same_key_across_sequence_items_is_fine() {
        assert!(check("- a: 1\n  b: 2\n- a: 1\n  b: 2\n").is_ok());
        assert!(check("-\n  a: 1\n-\n  a: 1\n").is_ok());
    }

    #[test]
    fn duplicate_inside_one_sequence_item_is_caught() {
        let err = check("- a: 1\n  a: 2\n").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert_eq!(err.column, Some(3));
    }

    #[test]
    fn quoted_keys_compare_by_content() {
        let err = check("\"foo\": 1\nfoo: 2\n").unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        assert!(check("a: 1\n\n# a: 1\nb: 2\n").is_ok());
    }

    #[test]
    fn dedent_closes_inner_scope() {
        assert!(check("a:\n  x: 1\nx: 1\n").is_ok());
        let err = check("a:\n  x: 1\na: 2\n").unwrap_err();
        assert_eq!(err.line, Some(3));
    }
}
