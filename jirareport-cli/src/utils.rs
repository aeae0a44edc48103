const ERROR_LIMIT: usize = 120;

/// Single-line, length-capped rendering of an error for log fields.
pub fn compact_error(value: &str) -> String {
    let cleaned = value.replace(['\n', '\r'], " ");
    if cleaned.chars().count() <= ERROR_LIMIT {
        return cleaned;
    }
    let truncated = cleaned.chars().take(ERROR_LIMIT).collect::<String>();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::compact_error;

    #[test]
    fn compact_error_truncates_long_strings() {
        let input = "é".repeat(200);
        let compact = compact_error(&input);
        assert!(compact.ends_with("..."));
        assert_eq!(compact.chars().count(), 123);
    }

    #[test]
    fn compact_error_flattens_lines() {
        assert_eq!(compact_error("line one\nline two"), "line one line two");
    }
}
