pub(crate) fn redact_value(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "<redacted>".to_string();
    }

    let head = value.chars().take(4).collect::<String>();
    let tail = value
        .chars()
        .rev()
        .take(4)
        .collect::<String>()
        .chars()
        .rev()
        .collect::<String>();

    if head.len() + tail.len() >= value.len() {
        return "<redacted>".to_string();
    }

    format!("{head}...{tail}")
}

pub(crate) fn redact_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().map(redact_value)
}
