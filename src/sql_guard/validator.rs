//! Read-only statement checks applied before anything reaches ClickHouse.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::allowlist::Allowlist;
use super::errors::GuardError;

/// Substrings that reject a statement wherever they appear, literals included.
const MUTATING_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "truncate", "alter", "create", "attach", "detach",
];

/// Markers that can hide a table reference from the `FROM`/`JOIN` scan.
const OPAQUE_MARKERS: &[(&str, &str)] = &[
    ("`", "quoted identifier"),
    ("\"", "quoted identifier"),
    ("/*", "comment"),
    ("--", "comment"),
];

lazy_static! {
    static ref LIMIT_RE: Regex = Regex::new(r"(?i)\blimit\b").unwrap();
    static ref TABLE_REF_RE: Regex = Regex::new(r"(?i)\b(?:from|join)\s+([a-zA-Z0-9_.]+)").unwrap();
    static ref SOURCE_KEYWORD_RE: Regex = Regex::new(r"(?i)\b(?:from|join)\b").unwrap();
    static ref TABLE_NAME_RE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?").unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"(?i)^\s*(?:as\s+)?[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

fn check_safe(sql: &str) -> Result<(), GuardError> {
    let lowered = sql.trim().to_lowercase();
    if lowered.is_empty() {
        return Err(GuardError::unsafe_statement("empty statement"));
    }
    if !lowered.starts_with("select") {
        return Err(GuardError::unsafe_statement("statement is not a SELECT"));
    }
    if let Some(keyword) = MUTATING_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
        return Err(GuardError::unsafe_statement(format!(
            "contains '{}'",
            keyword
        )));
    }
    Ok(())
}

pub fn is_safe(sql: &str) -> bool {
    check_safe(sql).is_ok()
}

/// Append `LIMIT max_rows` unless the statement already has a limit.
///
/// An existing limit is never lowered. Idempotent.
pub fn enforce_limit(sql: &str, max_rows: u32) -> String {
    let s = sql.trim().trim_end_matches(';').trim_end();
    if s.is_empty() || LIMIT_RE.is_match(s) {
        return s.to_string();
    }
    format!("{}\nLIMIT {}", s, max_rows)
}

/// Identifiers following `FROM` / `JOIN`. A subquery after `FROM` adds nothing.
pub fn extract_referenced_tables(sql: &str) -> BTreeSet<String> {
    TABLE_REF_RE
        .captures_iter(sql)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Length of the parenthesised group `s` starts with, closing paren included.
fn balanced_group_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every `FROM` / `JOIN` must be followed by one plain table name or one
/// parenthesised `SELECT`. Anything the scan cannot read rejects the statement.
fn check_sources(sql: &str) -> Result<(), GuardError> {
    if let Some((marker, what)) = OPAQUE_MARKERS.iter().find(|(m, _)| sql.contains(*m)) {
        return Err(GuardError::unsafe_statement(format!(
            "contains {} ({})",
            what, marker
        )));
    }
    for keyword in SOURCE_KEYWORD_RE.find_iter(sql) {
        let rest = sql[keyword.end()..].trim_start();
        let source_len = if rest.starts_with('(') {
            let is_select = rest[1..].trim_start().to_lowercase().starts_with("select");
            balanced_group_len(rest).filter(|_| is_select)
        } else {
            TABLE_NAME_RE.find(rest).map(|m| m.end())
        };
        let Some(source_len) = source_len else {
            return Err(GuardError::unsafe_statement(format!(
                "unreadable source after {}",
                keyword.as_str().to_uppercase()
            )));
        };
        let after = &rest[source_len..];
        let after = ALIAS_RE.find(after).map_or(after, |m| &after[m.end()..]);
        if after.trim_start().starts_with(',') {
            return Err(GuardError::unsafe_statement(format!(
                "comma-separated sources after {}",
                keyword.as_str().to_uppercase()
            )));
        }
    }
    Ok(())
}

pub fn check_allowlist(sql: &str, allowlist: &Allowlist) -> Result<(), GuardError> {
    check_sources(sql)?;
    let denied: Vec<String> = extract_referenced_tables(sql)
        .into_iter()
        .filter(|t| !allowlist.contains(t))
        .collect();
    if denied.is_empty() {
        Ok(())
    } else {
        Err(GuardError::UnauthorizedTable { tables: denied })
    }
}

/// Safety check, limit enforcement and allowlist check, in that order.
///
/// Returns the text to execute. Any failure rejects the whole statement.
pub fn validate(sql: &str, allowlist: &Allowlist, max_rows: u32) -> Result<String, GuardError> {
    check_safe(sql)?;
    let limited = enforce_limit(sql, max_rows);
    check_allowlist(&limited, allowlist)?;
    Ok(limited)
}
