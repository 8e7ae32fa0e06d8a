//! Quoting and placeholder utilities.

use crate::error::{CompileError, CompileResult};

/// Quote an identifier with double quotes.
///
/// Identifiers that contain a double quote are rejected instead of escaped,
/// so a malformed name can never change the shape of the statement.
pub fn quote_identifier(name: &str) -> CompileResult<String> {
    if name.contains('"') {
        return Err(CompileError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

/// Append a quoted identifier to `out`.
pub fn push_identifier(out: &mut String, name: &str) -> CompileResult<()> {
    if name.contains('"') {
        return Err(CompileError::InvalidIdentifier(name.to_string()));
    }
    out.push('"');
    out.push_str(name);
    out.push('"');
    Ok(())
}

/// Quote a table name, optionally qualified with a schema prefix.
pub fn quote_table(prefix: Option<&str>, name: &str) -> CompileResult<String> {
    match prefix {
        Some(prefix) => Ok(format!(
            "{}.{}",
            quote_identifier(prefix)?,
            quote_identifier(name)?
        )),
        None => quote_identifier(name),
    }
}

/// Quote a string literal with single quotes, doubling embedded quotes.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    push_string(&mut out, value);
    out
}

/// Append a quoted string literal to `out`.
pub fn push_string(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
}

/// Validate a name that is emitted without quotes (extension names, aliases
/// in `ATTACH`/`DETACH`, secret names).
pub fn bare_name(name: &str) -> CompileResult<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(CompileError::InvalidName(name.to_string()))
    }
}

/// Build a positional parameter placeholder. Indexes are 1-based.
pub fn placeholder(index: usize) -> String {
    format!("${}", index)
}

/// Turn an arbitrary name into a bare identifier by replacing every
/// character that is not an ASCII letter or digit with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
