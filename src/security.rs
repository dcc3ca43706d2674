use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<\s*script[^>]*>.*?<\s*/\s*script\s*>").expect("valid regex"));
static JS_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("valid regex"));
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bon[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]*)"#).expect("valid regex")
});
/// Only markup that can carry active content; `a<b and c>d` is ordinary text.
static ACTIVE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*(script|iframe|frame|frameset|img|svg|object|embed|applet|link|style|meta|base|form|input|button|textarea|video|audio|source|body|html|math|details|marquee|a)\b[^<>]*>",
    )
    .expect("valid regex")
});

/// Sanitized request text: non-empty, bounded, stripped of script injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn sanitize_query(raw: &str, max_chars: usize) -> Result<Query, AppError> {
    let stripped = SCRIPT_BLOCK.replace_all(raw, " ");
    let stripped = JS_URI.replace_all(&stripped, " ");
    let stripped = EVENT_HANDLER.replace_all(&stripped, " ");
    let stripped = ACTIVE_TAG.replace_all(&stripped, " ");

    // Collapse whitespace and drop control characters
    let normalized: String = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    if normalized.is_empty() {
        return Err(AppError::Validation("query is empty".to_string()));
    }
    let len = normalized.chars().count();
    if len > max_chars {
        return Err(AppError::Validation(format!(
            "query is too long ({} > {} characters)",
            len, max_chars
        )));
    }
    Ok(Query(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_blocks_and_handlers() {
        let q = sanitize_query(
            "search <script>alert(1)</script> rust <img src=x onerror=alert(1)> books",
            200,
        )
        .unwrap();
        assert_eq!(q.as_str(), "search rust books");
    }

    #[test]
    fn comparison_text_is_not_a_tag() {
        let q = sanitize_query("is a<b and c>d true", 200).unwrap();
        assert_eq!(q.as_str(), "is a<b and c>d true");
        let q = sanitize_query("x < y > z <iframe src=evil></iframe> done", 200).unwrap();
        assert_eq!(q.as_str(), "x < y > z done");
    }

    #[test]
    fn strips_javascript_uri() {
        let q = sanitize_query("open javascript:alert(document.cookie)", 200).unwrap();
        assert!(!q.as_str().to_lowercase().contains("javascript:"));
        assert!(q.as_str().starts_with("open"));
    }

    #[test]
    fn rejects_empty_and_injection_only() {
        assert!(matches!(sanitize_query("   ", 10), Err(AppError::Validation(_))));
        assert!(matches!(
            sanitize_query("<script>steal()</script>", 100),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_oversized() {
        let long = "a".repeat(11);
        assert!(matches!(sanitize_query(&long, 10), Err(AppError::Validation(_))));
        assert!(sanitize_query(&"a".repeat(10), 10).is_ok());
    }

    #[test]
    fn keeps_non_ascii_text() {
        let q = sanitize_query("  淘宝   搜索 iPhone 15 ", 50).unwrap();
        assert_eq!(q.as_str(), "淘宝 搜索 iPhone 15");
        assert_eq!(fingerprint(q.as_str()), "淘宝 搜索 iphone 15");
    }

    #[test]
    fn comparison_operators_are_not_tags() {
        let q = sanitize_query("is 3 < 5 and 7 > 2", 50).unwrap();
        assert_eq!(q.as_str(), "is 3 < 5 and 7 > 2");
    }
}
