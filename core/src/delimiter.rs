//! Delimiter and escaping rules shared by the tokenizer and the serializer.
//!
//! A data line looks like `pri1|pri2='v'=sec1|sec2:annotation`:
//!
//! - `|` separates fields. A field ending in an odd run of `\` continues into
//!   the next one with a literal `|`; each `\\` pair in that run stands for
//!   one literal backslash.
//! - `=` separates the last primary value from the first secondary value.
//!   Quoted (`'...'`) and parenthesized (`(...)`) text may contain `=`.
//! - `:` introduces a trailing annotation on the last value of the line,
//!   which is discarded.
//!
//! Empty values are written as the two-character token `''`.

use std::borrow::Cow;
use std::iter;

pub const FIELD_SEPARATOR: char = '|';
pub const ESCAPE: char = '\\';
pub const KEY_SEPARATOR: char = '=';
pub const ANNOTATION_SEPARATOR: char = ':';
pub const QUOTE: char = '\'';
pub const EMPTY_VALUE: &str = "''";
pub const OPT_MARKER: &str = "(OPT)";
pub const HIDDEN_KEY_SEPARATOR: &str = ",";

/// A quoted segment stays open until it ends with a closing quote.
fn quote_open(text: &str) -> bool {
    let text = text.trim();
    text.starts_with(QUOTE) && !closes_quote(text)
}

fn closes_quote(text: &str) -> bool {
    text.len() > 1 && text.ends_with(QUOTE)
}

/// Unclosed `(` outside quotes.
fn paren_depth(text: &str) -> usize {
    let mut in_quote = false;
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            QUOTE => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// A `=` segment is complete as soon as it ends in `'` or `)`. Until then it
/// keeps absorbing while it opened a quote or a parenthesis.
fn segment_open(text: &str) -> bool {
    let text = text.trim();
    if text.ends_with(')') || closes_quote(text) {
        return false;
    }
    text.starts_with(QUOTE) || paren_depth(text) > 0
}

fn trailing_escapes(text: &str) -> usize {
    text.len() - text.trim_end_matches(ESCAPE).len()
}

/// Splits a data line on `|`, honouring backslash escapes.
///
/// The escaping backslash is removed from the rejoined field and doubled
/// backslashes before a separator collapse to one. Backslashes at the very
/// end of the line precede no separator and are kept as they are.
///
/// ```
/// use ptf_core::delimiter::split_fields;
///
/// assert_eq!(split_fields(r"a\|b|c"), ["a|b", "c"]);
/// assert_eq!(split_fields(r"a\\|b"), [r"a\", "b"]);
/// ```
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut pending: Option<String> = None;
    let mut pieces = line.split(FIELD_SEPARATOR).peekable();

    while let Some(piece) = pieces.next() {
        let mut field = pending.take().unwrap_or_default();
        field.push_str(piece);
        if pieces.peek().is_none() {
            fields.push(field);
            break;
        }

        let run = trailing_escapes(&field);
        field.truncate(field.len() - run + run / 2);
        if run % 2 == 1 {
            field.push(FIELD_SEPARATOR);
            pending = Some(field);
        } else {
            fields.push(field);
        }
    }
    fields
}

/// Splits the last primary field on `=` into its value tokens.
///
/// A segment ending in `'` or `)` is complete. Any other segment keeps
/// absorbing `=` while it starts with a quote or holds an unclosed
/// parenthesis. A completed segment ending in `)` yields the text before its
/// parenthesized suffix; any other non-empty segment yields itself.
///
/// ```
/// use ptf_core::delimiter::split_key_segments;
///
/// assert_eq!(split_key_segments("'a=b'='c'"), ["'a=b'", "'c'"]);
/// assert_eq!(split_key_segments("'v'(x=1)='c'"), ["'v'", "'c'"]);
/// ```
pub fn split_key_segments(field: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending: Option<String> = None;

    for segment in field.trim().split(KEY_SEPARATOR) {
        let current = match pending.take() {
            Some(mut joined) => {
                joined.push(KEY_SEPARATOR);
                joined.push_str(segment);
                joined
            }
            None => segment.to_string(),
        };
        if segment_open(&current) {
            pending = Some(current);
            continue;
        }
        tokens.extend(finish_segment(&current));
    }

    if let Some(rest) = pending {
        tokens.extend(finish_segment(&rest));
    }
    tokens
}

fn finish_segment(segment: &str) -> Option<String> {
    let segment = segment.trim();
    if segment.is_empty() {
        return None;
    }
    if segment.ends_with(')') {
        if let Some(start) = suffix_start(segment) {
            return Some(segment[..start].trim().to_string());
        }
    }
    Some(segment.to_string())
}

/// Byte offset of the first `(` outside quotes.
fn suffix_start(segment: &str) -> Option<usize> {
    let mut in_quote = false;
    for (idx, c) in segment.char_indices() {
        match c {
            QUOTE => in_quote = !in_quote,
            '(' if !in_quote => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Drops a `:` annotation from the last value of a line.
///
/// Only the first segment is kept; it absorbs further `:` while it has
/// opened a quote that it does not yet close.
///
/// ```
/// use ptf_core::delimiter::strip_annotation;
///
/// assert_eq!(strip_annotation("'12:30':note"), "'12:30'");
/// assert_eq!(strip_annotation("plain:rest:more"), "plain");
/// ```
pub fn strip_annotation(value: &str) -> String {
    let mut kept = String::new();
    for (idx, segment) in value.split(ANNOTATION_SEPARATOR).enumerate() {
        if idx > 0 {
            kept.push(ANNOTATION_SEPARATOR);
        }
        kept.push_str(segment);
        if !quote_open(&kept) {
            break;
        }
    }
    kept.trim().to_string()
}

/// Escapes a value for a data line.
///
/// Every `|` becomes `\|`, with the backslashes right before it doubled.
/// When the value is followed by a field separator on the line, its
/// trailing backslashes are doubled too so they cannot swallow that
/// separator.
///
/// ```
/// use ptf_core::delimiter::escape_value;
///
/// assert_eq!(escape_value("a|b", false), r"a\|b");
/// assert_eq!(escape_value(r"x\", true), r"x\\");
/// assert_eq!(escape_value(r"x\", false), r"x\");
/// ```
pub fn escape_value(value: &str, before_separator: bool) -> Cow<'_, str> {
    let guards_tail = before_separator && value.ends_with(ESCAPE);
    if !guards_tail && !value.contains(FIELD_SEPARATOR) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 4);
    let mut run = 0;
    for c in value.chars() {
        match c {
            ESCAPE => run += 1,
            FIELD_SEPARATOR => {
                out.extend(iter::repeat_n(ESCAPE, run * 2 + 1));
                out.push(FIELD_SEPARATOR);
                run = 0;
            }
            _ => {
                out.extend(iter::repeat_n(ESCAPE, run));
                out.push(c);
                run = 0;
            }
        }
    }
    let tail = if before_separator { run * 2 } else { run };
    out.extend(iter::repeat_n(ESCAPE, tail));
    Cow::Owned(out)
}

/// Renders a stored value for output; `NULL` and empty become `''`.
pub fn render_value(value: Option<&str>, before_separator: bool) -> Cow<'_, str> {
    match value {
        None | Some("") => Cow::Borrowed(EMPTY_VALUE),
        Some(value) => escape_value(value, before_separator),
    }
}
