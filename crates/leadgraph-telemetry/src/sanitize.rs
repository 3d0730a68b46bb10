//! Credential redaction for error reports
//!
//! Every report passes through here before it is queued. Messages have
//! query-string tokens, bearer headers and Facebook token-shaped substrings
//! replaced; context maps additionally have sensitive keys blanked.

use serde_json::Value;

use crate::error_report::ErrorContext;

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Replacement for bare token-shaped substrings
pub const REDACTED_TOKEN: &str = "[REDACTED_TOKEN]";

/// Facebook access tokens start with this prefix
const TOKEN_PREFIX: &str = "EAA";

/// Shortest alphanumeric run (prefix included) treated as a token
const MIN_TOKEN_LEN: usize = 12;

/// Context keys whose values are never kept (compared case-insensitively)
const SENSITIVE_KEYS: &[&str] = &[
    "access_token",
    "accesstoken",
    "session_token",
    "sessiontoken",
    "token",
    "page_token",
    "pagetoken",
    "page_tokens",
    "pagetokens",
    "authorization",
    "client_secret",
    "appsecret_proof",
];

/// Redacts credentials from free text.
pub fn sanitize_message(text: &str) -> String {
    let text = redact_after(text, "access_token=", REDACTED);
    let text = redact_after(&text, "Bearer ", REDACTED);
    redact_token_shapes(&text)
}

/// Redacts sensitive keys and sanitizes every string value, recursively.
pub fn sanitize_context(context: &ErrorContext) -> ErrorContext {
    context
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                sanitize_value(value)
            };
            (key.clone(), value)
        })
        .collect()
}

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&lower.as_str())
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_message(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize_value(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_value_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '&' | '"' | '\'' | '<' | '>' | ')' | ',' | ';' | '#')
}

/// Replaces the value following every occurrence of `marker`, ignoring ASCII case.
fn redact_after(text: &str, marker: &str, replacement: &str) -> String {
    // ASCII lowercasing keeps byte offsets, so positions found in `haystack` index `text`.
    let haystack = text.to_ascii_lowercase();
    let marker = marker.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(pos) = haystack[cursor..].find(&marker) {
        let value_start = cursor + pos + marker.len();
        out.push_str(&text[cursor..value_start]);

        let value = &text[value_start..];
        let value_len = value.find(is_value_delimiter).unwrap_or(value.len());
        if value_len > 0 {
            out.push_str(replacement);
        }
        cursor = value_start + value_len;
    }

    out.push_str(&text[cursor..]);
    out
}

/// Replaces `EAA...` alphanumeric runs that start at a word boundary.
fn redact_token_shapes(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(TOKEN_PREFIX) {
        let start = cursor + offset;
        let at_boundary = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let run = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();

        if at_boundary && run >= MIN_TOKEN_LEN {
            out.push_str(&text[copied..start]);
            out.push_str(REDACTED_TOKEN);
            copied = start + run;
            cursor = copied;
        } else {
            cursor = start + TOKEN_PREFIX.len();
        }
    }

    out.push_str(&text[copied..]);
    out
}
