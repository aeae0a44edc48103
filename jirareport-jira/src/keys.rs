use std::sync::OnceLock;

use jirareport_domain::{IssueKey, ReportError, Result};
use regex::Regex;

// Characters the Jira text-search operator (`~`) treats as syntax.
const TEXT_SEARCH_RESERVED: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '~', '*', '?', '\\', ':',
];

fn loose_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z][A-Z0-9]*?)[\s_-]*(\d+)$").expect("issue key pattern")
    })
}

/// Normalizes a loosely written key (`skp_288`, `SKP 288`, `288` with project `SKP`)
/// into `SKP-288`. Anything else is passed through for the tracker to judge.
pub fn resolve_issue_key(raw: &str, project: Option<&str>) -> Result<IssueKey> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ReportError::validation("issue key cannot be empty"));
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let project = project
            .map(str::trim)
            .filter(|project| !project.is_empty())
            .ok_or_else(|| {
                ReportError::validation(format!("issue number {trimmed} needs a project key"))
            })?;
        return IssueKey::parse(&format!("{}-{trimmed}", project.to_ascii_uppercase()));
    }

    let upper = trimmed.to_ascii_uppercase();
    match loose_key_pattern().captures(&upper) {
        Some(captures) => IssueKey::parse(&format!("{}-{}", &captures[1], &captures[2])),
        None => IssueKey::parse(trimmed),
    }
}

/// Escapes a value for use inside a double-quoted JQL string.
pub fn escape_jql_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escapes a value for a quoted `~` text-search operand. Reserved characters need a
/// double backslash: one for the text-search syntax, one for the JQL string.
pub fn escape_text_search(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if TEXT_SEARCH_RESERVED.contains(&c) {
            out.push_str("\\\\");
            out.push(c);
        } else if c == '"' {
            out.push_str("\\\"");
        } else {
            out.push(c);
        }
    }
    out
}

pub(crate) fn summary_lookup_jql(project: &str, summary: &str) -> String {
    format!(
        "project = \"{}\" AND summary ~ \"{}\" ORDER BY created DESC",
        escape_jql_string(project.trim()),
        escape_text_search(summary.trim())
    )
}
