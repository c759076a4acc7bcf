// crates/db/src/fts.rs
//! FTS5 query sanitization: free-text input is never handed to the
//! engine verbatim, since FTS5's query syntax treats several characters
//! and bare boolean keywords as operators.

const OPERATOR_CHARS: &[char] = &['"', ':', '(', ')', '^', '*', '-', '+'];

/// Sanitize a free-text query for FTS5: strip operator characters and
/// standalone boolean-operator tokens, collapse whitespace, and fall
/// back to a match-all wildcard if nothing is left.
pub fn sanitize_fts_query(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .map(|c| if OPERATOR_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let collapsed = stripped
        .split_whitespace()
        .filter(|tok| !is_boolean_operator(tok))
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.is_empty() {
        "*".to_string()
    } else {
        collapsed
    }
}

fn is_boolean_operator(token: &str) -> bool {
    matches!(
        token.to_ascii_uppercase().as_str(),
        "AND" | "OR" | "NOT" | "NEAR"
    )
}
