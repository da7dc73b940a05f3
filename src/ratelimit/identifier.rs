//! Identifier resolution for callers that have a user id, an IP, or neither.

/// Key used when neither a user id nor an IP is known.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// Pick the key a caller's checks are counted against.
///
/// Prefers the user id, then the IP, then [`ANONYMOUS_IDENTIFIER`]. Empty
/// strings count as absent. Callers behind one shared IP share one budget.
pub fn resolve_identifier(user_id: Option<&str>, ip: Option<&str>) -> String {
    user_id
        .filter(|id| !id.is_empty())
        .or_else(|| ip.filter(|ip| !ip.is_empty()))
        .unwrap_or(ANONYMOUS_IDENTIFIER)
        .to_string()
}
