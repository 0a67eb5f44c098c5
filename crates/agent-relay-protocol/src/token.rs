//! App-token normalization.

/// Token used when a connection does not name an app.
pub const DEFAULT_TOKEN: &str = "default";

/// Normalize an `appToken` before any lookup, enqueue, or registry write.
///
/// An absent or blank-after-trim token maps to [`DEFAULT_TOKEN`]; any
/// other token is kept verbatim.
#[must_use]
pub fn normalize_token(token: Option<&str>) -> String {
    match token {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => DEFAULT_TOKEN.to_string(),
    }
}
