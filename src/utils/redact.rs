//! Secret redaction for text that ends up in logs or result notes.
//!
//! Error messages from HTTP clients can echo connection strings, so anything
//! shaped like `password=...`, `secret: ...` or `token=...` is masked.

use lazy_static::lazy_static;
use regex::Regex;

pub const REDACTED: &str = "[REDACTED]";

lazy_static! {
    static ref SECRET_PATTERNS: Vec<Regex> = ["password", "secret", "token"]
        .iter()
        .map(|key| Regex::new(&format!(r"(?i){}\s*[:=]\s*\S+", key)).unwrap())
        .collect();
}

pub fn redact_secrets(text: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, re| {
            re.replace_all(&acc, REDACTED).into_owned()
        })
}
