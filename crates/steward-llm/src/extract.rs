//! Parsing of JSON payloads out of model replies.
//!
//! Models frequently wrap JSON in a fenced code block even when told not to.
//! The accepted grammar is: optional leading triple-backtick fence with an
//! optional language tag on the same line, the payload, and an optional
//! trailing triple-backtick fence. Anything else is passed through verbatim.

use serde::de::DeserializeOwned;

/// Strip an optional surrounding code fence from `text`.
///
/// An unterminated opening fence is tolerated: the opening line is dropped
/// and the rest is returned as-is.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag (or nothing) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return "",
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

/// Parse a JSON value of type `T` from a model reply, stripping a
/// surrounding code fence first.
///
/// # Errors
///
/// Returns the underlying `serde_json` error when the unfenced payload is
/// not valid JSON for `T`.
pub fn json_from_response<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fence(text))
}
