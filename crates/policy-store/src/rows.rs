use std::collections::HashMap;

use rootgate_core::{Decision, Expiry, PolicyRecord};

/// Separator between `key=value` fields in one output line.
pub const FIELD_DELIMITER: char = '|';

pub type Row = HashMap<String, String>;

/// Splits helper output into rows. Fields without `=` or with an empty key are
/// skipped, and lines that end up with no fields are dropped.
pub fn parse_rows<I, S>(lines: I) -> Vec<Row>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_row(line.as_ref()))
        .collect()
}

pub fn parse_row(line: &str) -> Option<Row> {
    let row: Row = line
        .trim_end_matches(&['\r', '\n'][..])
        .split(FIELD_DELIMITER)
        .filter_map(|field| {
            let (key, value) = field.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect();
    if row.is_empty() {
        None
    } else {
        Some(row)
    }
}

/// Builds a record from a `policies` row, or `None` when a required column
/// is missing or unparsable.
pub fn policy_from_row(row: &Row) -> Option<PolicyRecord> {
    let uid = int_field(row, "uid")?;
    let decision = Decision::from_code(int_field(row, "policy")?)?;
    let until = row.get("until")?.trim().parse::<i64>().ok()?;
    Some(PolicyRecord {
        uid,
        decision,
        expiry: Expiry::from_raw(until),
        logging: bool_field(row, "logging").unwrap_or(true),
        notification: bool_field(row, "notification").unwrap_or(true),
    })
}

fn int_field(row: &Row, key: &str) -> Option<i32> {
    row.get(key)?.trim().parse().ok()
}

fn bool_field(row: &Row, key: &str) -> Option<bool> {
    int_field(row, key).map(|value| value != 0)
}
