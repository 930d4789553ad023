//! Renormalization of locale-formatted numeric text.
//!
//! Comparison operands that look like formatted numbers (`1.234,5`, `-12,5%`, `1,000,000`)
//! are rewritten to canonical dot-decimal text before they are compared or bound. The test
//! is purely on the shape of the text, not on the type of the compared property, so a
//! textual value that happens to look numeric is rewritten too. Known sharp edge: a single
//! separator is always read as the decimal mark, so `1,234` becomes `1.234`.

use bson::Bson;

/// Canonical form of `s` when it has the shape of a formatted number, otherwise `None`.
#[must_use]
pub fn normalize_numeric_text(s: &str) -> Option<String> {
    let t = s.trim();
    let (negative, rest) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };
    let body = rest.strip_suffix('%').unwrap_or(rest);
    let bytes = body.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return None;
    };
    if !first.is_ascii_digit() || !last.is_ascii_digit() {
        return None;
    }
    if !bytes.iter().all(|b| b.is_ascii_digit() || *b == b',' || *b == b'.') {
        return None;
    }
    if bytes.windows(2).any(|w| !w[0].is_ascii_digit() && !w[1].is_ascii_digit()) {
        return None;
    }

    let commas = bytes.iter().filter(|b| **b == b',').count();
    let dots = bytes.iter().filter(|b| **b == b'.').count();
    let decimal_mark = match (commas, dots) {
        (0, 0) => None,
        (c, d) if c > 0 && d > 0 => {
            let mark = bytes.iter().rev().copied().find(|b| !b.is_ascii_digit());
            let mark_count = if mark == Some(b',') { c } else { d };
            if mark_count > 1 {
                return None;
            }
            mark
        }
        (1, 0) => Some(b','),
        (0, 1) => Some(b'.'),
        _ => None,
    };

    let mut out = String::with_capacity(body.len() + 1);
    if negative {
        out.push('-');
    }
    for b in bytes {
        match *b {
            d if d.is_ascii_digit() => out.push(char::from(d)),
            m if Some(m) == decimal_mark => out.push('.'),
            _ => {}
        }
    }
    Some(out)
}

/// Applies [`normalize_numeric_text`] to string values; other values pass through.
#[must_use]
pub fn normalize_value(value: Bson) -> Bson {
    match value {
        Bson::String(s) => match normalize_numeric_text(&s) {
            Some(n) => Bson::String(n),
            None => Bson::String(s),
        },
        other => other,
    }
}
