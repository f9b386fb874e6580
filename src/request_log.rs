//! Request logging formatter

use crate::api::{ChatRequest, Role};

/// Format a request log message in compact format
pub fn format_request_log(request: &ChatRequest, token_count: usize, token_limit: usize) -> String {
    let mut parts = vec![
        format!("msgs={}", request.messages.len()),
        format!("tokens={}/{}", token_count, token_limit),
    ];

    let roles = role_summary(request);
    if !roles.is_empty() {
        parts.push(roles);
    }

    if let Some(last) = request.last_message() {
        parts.push(format!("\"{}\"", truncate_message(&normalize_whitespace(&last.content))));
    }

    format!("→ {}", parts.join(" "))
}

/// Per-role message counts, e.g. "user=2 assistant=1"
fn role_summary(request: &ChatRequest) -> String {
    [Role::System, Role::User, Role::Assistant]
        .iter()
        .filter_map(|role| {
            let count = request.messages.iter().filter(|m| m.role == *role).count();
            (count > 0).then(|| format!("{}={}", role.as_str(), count))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert newlines and tabs to single spaces, collapse multiple spaces
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate message according to rules:
/// - If <= 100 chars: show all
/// - If > 100 chars: first 25 + " ... " + last 75
fn truncate_message(s: &str) -> String {
    const MAX_TOTAL: usize = 100;
    const PREFIX_LEN: usize = 25;
    const SUFFIX_LEN: usize = 75;
    const ELLIPSIS: &str = " ... ";

    let char_count = s.chars().count();
    if char_count <= MAX_TOTAL {
        return s.to_string();
    }

    let prefix: String = s.chars().take(PREFIX_LEN).collect();
    let suffix: String = s.chars().skip(char_count - SUFFIX_LEN).collect();

    format!("{}{}{}", prefix, ELLIPSIS, suffix)
}
