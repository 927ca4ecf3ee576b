use regex::Regex;
use std::sync::OnceLock;

/// Mask credentials in analyzer output before it is stored or printed.
/// The analyzer receives `DATABASE_URL` and API keys through its environment,
/// and its error lines tend to echo them back.
pub fn mask_secrets(text: &str) -> String {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            // API keys
            (r"sk-[a-zA-Z0-9_\-]{20,}", "[MASKED]"),
            (r"xai-[a-zA-Z0-9]{20,}", "[MASKED]"),
            (r"gh[pousr]_[a-zA-Z0-9]{20,}", "[MASKED]"),
            // Bearer tokens
            (r"Bearer\s+[a-zA-Z0-9._\-]+", "Bearer [MASKED]"),
            // Credentials embedded in connection strings
            (r"://([^:/@\s]+):[^@\s]+@", "://$1:[MASKED]@"),
            // key=value patterns
            (
                r"(?i)(password|secret|token|key|api_key|apikey)=[^\s&]+",
                "$1=[MASKED]",
            ),
        ]
        .into_iter()
        .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, r)))
        .collect()
    });

    let mut result = text.to_string();
    for (re, replacement) in patterns {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}
