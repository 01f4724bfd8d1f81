//! Rewrite `@Name` references into the positional `@P1..@Pn` form that
//! tiberius binds.
//!
//! Quoted strings, quoted identifiers, and comments are copied untouched.
//! `@@SYSTEM` variables and `@locals` with no matching parameter are left
//! alone so that `DECLARE @x` batches still work, unless a local is spelled
//! like one of the positional names the rewrite hands out.

use tracing::debug;

use crate::binder::Record;
use crate::error::SqlTaskError;
use crate::types::SqlValue;

/// SQL text rewritten for positional binding, with the values in bind order.
#[derive(Debug)]
pub struct Translated<'p> {
    pub sql: String,
    pub values: Vec<&'p SqlValue>,
}

/// Replace each `@Name` that matches a parameter (ignoring case) with `@Pn`.
///
/// Repeated references share one position. Parameters the text never
/// references are not bound.
///
/// # Errors
/// Returns `SqlTaskError::ConfigError` when the text uses a local such as
/// `@P1` that would collide with a bound position.
pub fn translate_named<'p>(sql: &str, params: &'p Record) -> Result<Translated<'p>, SqlTaskError> {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut bound: Vec<(&'p str, &'p SqlValue)> = Vec::new();
    let mut positional_locals: Vec<(&str, usize)> = Vec::new();
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'[' => state = State::Bracketed,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'@' if bytes.get(idx + 1) == Some(&b'@') => {
                    idx = scan_name(bytes, idx + 2) - 1;
                }
                b'@' => {
                    let end = scan_name(bytes, idx + 1);
                    let name = &sql[idx + 1..end];
                    if let Some(position) = bind_position(&mut bound, params, name) {
                        out.push_str(&sql[copied..idx]);
                        out.push_str("@P");
                        out.push_str(&position.to_string());
                        copied = end;
                    } else if let Some(position) = positional_index(name) {
                        positional_locals.push((name, position));
                    }
                    idx = end - 1;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Bracketed => {
                if b == b']' {
                    if bytes.get(idx + 1) == Some(&b']') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
    out.push_str(&sql[copied.min(sql.len())..]);

    if bound.len() < params.len() {
        for (name, _) in params.iter() {
            if !bound.iter().any(|(b, _)| b.eq_ignore_ascii_case(name)) {
                debug!(parameter = name, "parameter not referenced by the statement");
            }
        }
    }

    if let Some((name, _)) = positional_locals
        .iter()
        .find(|(_, position)| *position <= bound.len())
    {
        return Err(SqlTaskError::ConfigError(format!(
            "variable @{name} collides with a bound parameter position; rename it"
        )));
    }

    Ok(Translated {
        sql: out,
        values: bound.into_iter().map(|(_, value)| value).collect(),
    })
}

/// `n` for a name of the form `P<n>` (any case).
fn positional_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(['P', 'p'])?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    LineComment,
    BlockComment(u32),
}

/// One past the last byte of the identifier starting at `start`.
fn scan_name(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && is_name_byte(bytes[idx]) {
        idx += 1;
    }
    idx
}

// Bytes >= 0x80 belong to multi-byte characters, so slicing at the first
// ASCII non-name byte stays on a char boundary.
fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'#' | b'$') || b >= 0x80
}

fn bind_position<'p>(
    bound: &mut Vec<(&'p str, &'p SqlValue)>,
    params: &'p Record,
    name: &str,
) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    if let Some(existing) = bound.iter().position(|(b, _)| b.eq_ignore_ascii_case(name)) {
        return Some(existing + 1);
    }
    let (key, value) = params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))?;
    bound.push((key, value));
    Some(bound.len())
}
