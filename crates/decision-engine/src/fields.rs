//! Typed access to the daemon's string-keyed field mapping.

use std::collections::HashMap;

use rootgate_core::RequestError;

pub type Fields = HashMap<String, String>;

/// Fails on any field name outside `known`.
pub fn reject_unknown(fields: &Fields, known: &[&str]) -> Result<(), RequestError> {
    let mut unknown: Vec<&str> = fields
        .keys()
        .map(String::as_str)
        .filter(|name| !known.contains(name))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(RequestError::malformed(format!(
        "unknown fields: {}",
        unknown.join(", ")
    )))
}

pub fn require_int(fields: &Fields, name: &str) -> Result<i32, RequestError> {
    let raw = fields
        .get(name)
        .ok_or_else(|| RequestError::malformed(format!("missing field '{name}'")))?;
    raw.trim()
        .parse()
        .map_err(|_| RequestError::malformed(format!("field '{name}' is not an integer: {raw:?}")))
}

/// Lenient integer lookup for report fields, falling back on absence or
/// garbage the way the daemon's own defaults would.
pub fn int_or(fields: &Fields, name: &str, default: i32) -> i32 {
    fields
        .get(name)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

pub fn bool_or(fields: &Fields, name: &str, default: bool) -> bool {
    match fields.get(name).map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(value) if value == "1" || value == "true" => true,
        Some(value) if value == "0" || value == "false" => false,
        _ => default,
    }
}

pub fn optional_str(fields: &Fields, name: &str) -> Option<String> {
    fields
        .get(name)
        .map(|value| value.to_string())
        .filter(|value| !value.is_empty())
}
