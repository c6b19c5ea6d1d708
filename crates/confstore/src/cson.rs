//! CSON surface syntax → YAML translation.
//!
//! The CSON dialect this crate reads is YAML-compatible block notation except
//! for two constructs: `'''` heredoc strings and `###` block comments.
//! [`translate`] rewrites both into YAML while preserving the line count, so
//! line numbers reported against the translated text map directly onto the
//! source file. Everything else passes through untouched, including `#` line
//! comments and quoted strings.

/// Translate CSON text into YAML text of the same line count.
pub fn translate(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while !rest.is_empty() {
        if rest.starts_with("'''") {
            rest = heredoc(&mut out, &rest[3..]);
        } else if rest.starts_with("###") && !rest[3..].starts_with('#') {
            // exactly ###; four or more hashes is a line comment
            rest = block_comment(&mut out, &rest[3..]);
        } else if rest.starts_with('#') {
            rest = copy_until_newline(&mut out, rest);
        } else if rest.starts_with('"') {
            rest = copy_quoted(&mut out, rest, '"');
        } else if rest.starts_with('\'') {
            rest = copy_quoted(&mut out, rest, '\'');
        } else {
            let ch = rest.chars().next().unwrap_or('\0');
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    out
}

/// Whether the text holds no value: whitespace, line comments and block
/// comments only.
pub fn is_blank(source: &str) -> bool {
    translate(source).lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with('#')
    })
}

/// Emit a heredoc body as one double-quoted YAML scalar, padded with blank
/// lines to keep line numbers stable. `rest` starts just past the opening
/// `'''`; returns the text past the closing delimiter.
fn heredoc<'a>(out: &mut String, rest: &'a str) -> &'a str {
    let (body, remainder) = match rest.find("'''") {
        Some(end) => (&rest[..end], &rest[end + 3..]),
        None => (rest, ""),
    };
    let newlines = body.matches('\n').count();

    out.push('"');
    for ch in dedent(body).chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');

    // Whatever trails the closing delimiter on its line stays put; the lines
    // the heredoc spanned become blanks.
    let trailing = copy_rest_of_line(out, remainder);
    out.push_str(&"\n".repeat(newlines));
    trailing
}

/// CoffeeScript heredoc semantics: strip one leading and one trailing
/// newline, then remove the common indentation of the remaining lines.
fn dedent(body: &str) -> String {
    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = match body.rfind('\n') {
        Some(pos) if body[pos + 1..].trim().is_empty() => &body[..pos],
        _ => body,
    };
    let indent = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    body.lines()
        .map(|line| if line.len() >= indent { &line[indent..] } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace a `### ... ###` block with blank lines of the same span.
fn block_comment<'a>(out: &mut String, rest: &'a str) -> &'a str {
    let (body, remainder) = match rest.find("###") {
        Some(end) => (&rest[..end], &rest[end + 3..]),
        None => (rest, ""),
    };
    out.push_str(&"\n".repeat(body.matches('\n').count()));
    // Drop anything else on the closing line so stray comment text cannot
    // leak into the YAML.
    skip_rest_of_line(remainder)
}

fn copy_until_newline<'a>(out: &mut String, rest: &'a str) -> &'a str {
    match rest.find('\n') {
        Some(pos) => {
            out.push_str(&rest[..=pos]);
            &rest[pos + 1..]
        }
        None => {
            out.push_str(rest);
            ""
        }
    }
}

fn copy_rest_of_line<'a>(out: &mut String, rest: &'a str) -> &'a str {
    match rest.find('\n') {
        Some(pos) => {
            out.push_str(&rest[..pos]);
            &rest[pos..]
        }
        None => {
            out.push_str(rest);
            ""
        }
    }
}

fn skip_rest_of_line(rest: &str) -> &str {
    match rest.find('\n') {
        Some(pos) => &rest[pos..],
        None => "",
    }
}

/// Copy a single-line quoted string verbatim, honoring backslash escapes.
fn copy_quoted<'a>(out: &mut String, rest: &'a str, quote: char) -> &'a str {
    let mut chars = rest.char_indices();
    // Opening quote.
    let _ = chars.next();
    out.push(quote);
    let mut escaped = false;
    for (idx, ch) in chars {
        out.push(ch);
        if escaped {
            escaped = false;
        } else if ch == '\\' && quote == '"' {
            escaped = true;
        } else if ch == quote || ch == '\n' {
            return &rest[idx + ch.len_utf8()..];
        }
    }
    ""
}
