// Web Tools
// System browser opener, programmatic web search and page fetch.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
    pub body: String,
}

#[async_trait]
pub trait WebTools: Send + Sync {
    /// Opens a URL, or a search for free text, in the user's browser.
    async fn open_in_browser(&self, target: &str) -> bool;
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
    /// Readable text of a page, truncated.
    async fn fetch(&self, url: &str) -> Result<String>;
}

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/?q=";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const MAX_PAGE_CHARS: usize = 4_000;

static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("valid result link regex")
});
static RESULT_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|td|div)>"#)
        .expect("valid snippet regex")
});
static NON_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head)[^>]*>.*?</(script|style|noscript|head)>")
        .expect("valid non-content regex")
});
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^<>]*>").expect("valid tag regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

pub struct SystemWebTools {
    client: Client,
}

impl SystemWebTools {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    fn opener_command(target: &str) -> std::process::Command {
        #[cfg(target_os = "macos")]
        {
            let mut cmd = std::process::Command::new("open");
            cmd.arg(target);
            cmd
        }
        #[cfg(target_os = "windows")]
        {
            // No shell in between: `&` and `^` in a query string stay part of the URL.
            let mut cmd = std::process::Command::new("rundll32");
            cmd.args(["url.dll,FileProtocolHandler", target]);
            cmd
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let mut cmd = std::process::Command::new("xdg-open");
            cmd.arg(target);
            cmd
        }
    }
}

#[async_trait]
impl WebTools for SystemWebTools {
    async fn open_in_browser(&self, target: &str) -> bool {
        let url = browser_target(target);
        let mut cmd = tokio::process::Command::from(Self::opener_command(&url));
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        match cmd.status().await {
            Ok(status) if status.success() => {
                info!("🌐 [Web] Opened in browser: {}", url);
                true
            }
            Ok(status) => {
                warn!("[Web] opener exited with {} for {}", status, url);
                false
            }
            Err(e) => {
                warn!("[Web] failed to launch opener: {}", e);
                false
            }
        }
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}{}", DDG_HTML_URL, urlencoding::encode(query));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("search request failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("search returned HTTP {}", resp.status()));
        }
        let html = resp.text().await?;
        let hits = parse_search_results(&html, max_results);
        info!("🔎 [Web] '{}' -> {} results", query, hits.len());
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !resp.status().is_success() {
            return Err(anyhow!("{} returned HTTP {}", url, resp.status()));
        }
        let html = resp.text().await?;
        Ok(truncate_chars(&html_to_text(&html), MAX_PAGE_CHARS))
    }
}

/// URLs pass through; anything else becomes a web search URL.
/// Only a well-formed http(s) URL reaches the opener as-is; anything else becomes a search.
pub fn browser_target(target: &str) -> String {
    let trimmed = target.trim();
    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url.into(),
        _ => format!("https://duckduckgo.com/?q={}", urlencoding::encode(trimmed)),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub fn html_to_text(html: &str) -> String {
    let without_blocks = NON_CONTENT.replace_all(html, " ");
    let without_tags = HTML_TAG.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Result links on the HTML endpoint are redirects carrying the target in `uddg`.
fn resolve_result_href(raw: &str) -> String {
    let href = decode_entities(raw);
    if let Some(pos) = href.find("uddg=") {
        let encoded = href[pos + 5..].split('&').next().unwrap_or("");
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href
    }
}

pub fn parse_search_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = RESULT_SNIPPET
        .captures_iter(html)
        .map(|c| html_to_text(&c[1]))
        .collect();

    RESULT_LINK
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: html_to_text(&c[2]),
            href: resolve_result_href(&c[1]),
            body: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.title.is_empty() && !hit.href.is_empty())
        .take(max_results)
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdocs.python.org%2F3.13%2Fwhatsnew%2F3.13.html&amp;rut=abc">What&#x27;s New In <b>Python</b> 3.13</a>
  </h2>
  <a class="result__snippet" href="x">This article explains the new features in <b>Python 3.13</b>.</a>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://realpython.com/python313-new-features/">Python 3.13: Cool New Features</a>
  </h2>
  <a class="result__snippet" href="y">Free-threading &amp; a new REPL.</a>
</div>
"#;

    #[test]
    fn parses_duckduckgo_results() {
        let hits = parse_search_results(SAMPLE, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "What's New In Python 3.13");
        assert_eq!(hits[0].href, "https://docs.python.org/3.13/whatsnew/3.13.html");
        assert!(hits[0].body.contains("new features"));
        assert_eq!(hits[1].body, "Free-threading & a new REPL.");
    }

    #[test]
    fn result_count_is_bounded() {
        assert_eq!(parse_search_results(SAMPLE, 1).len(), 1);
        assert!(parse_search_results("<html>nothing</html>", 5).is_empty());
    }

    #[test]
    fn html_to_text_drops_scripts_and_tags() {
        let html = "<html><head><title>x</title></head><body><script>evil()</script><p>Hello&nbsp;<b>world</b></p></body></html>";
        assert_eq!(html_to_text(html), "Hello world");
    }

    #[test]
    fn free_text_becomes_search_url() {
        assert_eq!(browser_target("https://example.com"), "https://example.com/");
        assert_eq!(browser_target("rust book"), "https://duckduckgo.com/?q=rust%20book");
        assert_eq!(
            browser_target("javascript:alert(1)"),
            "https://duckduckgo.com/?q=javascript%3Aalert%281%29"
        );
    }

    #[test]
    fn opener_gets_url_as_single_argument_without_shell() {
        let url = browser_target("https://x.test/?a=1&calc");
        assert_eq!(url, "https://x.test/?a=1&calc");
        let cmd = SystemWebTools::opener_command(&url);
        assert_ne!(cmd.get_program(), "cmd");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args.last().copied(), Some(std::ffi::OsStr::new(&url)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("你好世界", 2), "你好…");
        assert_eq!(truncate_chars("abc", 5), "abc");
    }
}
