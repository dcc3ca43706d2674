//! Platform table: maps a target platform or a free-text query to a deep-link
//! search URL and, when the planner supplied no steps, a canned step sequence.
//!
//! The table is data. Built-in defaults can be replaced by a JSON file which is
//! written out with the defaults the first time it is requested.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use crate::schema::Action;

pub const GENERIC_SEARCH_URL: &str = "https://www.google.com/search?q={query}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipe {
    /// Open results page and wait for the listing.
    Shop,
    /// Open results, open the first hit in a new tab, start playback.
    Video,
    /// Open results page only.
    Page,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub name: String,
    pub domain: String,
    /// Lower-case names and localized keywords that identify the platform in free text.
    pub keywords: Vec<String>,
    /// Contains `{query}`.
    pub search_url: String,
    #[serde(default = "default_recipe")]
    pub recipe: Recipe,
    /// First-result selectors, highest priority first.
    #[serde(default)]
    pub result_selectors: Vec<String>,
}

fn default_recipe() -> Recipe {
    Recipe::Page
}

impl PlatformEntry {
    pub fn search_url_for(&self, keyword: &str) -> String {
        fill_template(&self.search_url, keyword)
    }

    fn matches_platform(&self, platform: &str) -> bool {
        let p = platform.trim().to_lowercase();
        if p.is_empty() {
            return false;
        }
        let p = p
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.");
        p == self.name
            || p == self.domain
            || p.ends_with(&format!(".{}", self.domain))
            || p.split('/').next() == Some(self.domain.as_str())
            || self.keywords.iter().any(|k| k == p)
    }

    fn mentioned_in(&self, text_lower: &str) -> bool {
        self.keywords.iter().any(|kw| contains_keyword(text_lower, kw))
            || contains_keyword(text_lower, &self.domain)
    }
}

fn fill_template(template: &str, keyword: &str) -> String {
    template.replace("{query}", &urlencoding::encode(keyword))
}

/// ASCII keywords must sit on word boundaries; CJK keywords match as substrings.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    if !keyword.is_ascii() {
        return haystack.contains(&keyword);
    }
    let is_word = |c: char| c.is_ascii_alphanumeric();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(&keyword) {
        let begin = start + pos;
        let end = begin + keyword.len();
        let before_ok = haystack[..begin].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word(c));
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
        while !haystack.is_char_boundary(start) {
            start += 1;
        }
    }
    false
}

static FILLER_WORDS: &[&str] = &[
    "search", "for", "find", "look", "up", "on", "in", "at", "play", "watch", "open", "the",
    "please", "me", "a", "video", "videos", "and", "then",
];
/// Longest first where one is a prefix of another.
static CJK_FILLERS: &[&str] = &[
    "搜索", "搜一下", "搜", "查找", "播放", "看视频", "观看", "打开", "帮我", "在", "上的", "上", "里",
];

pub static DEFAULT_PLATFORMS: Lazy<Vec<PlatformEntry>> = Lazy::new(|| {
    let entry = |name: &str, domain: &str, keywords: &[&str], url: &str, recipe: Recipe, sels: &[&str]| {
        PlatformEntry {
            name: name.to_string(),
            domain: domain.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            search_url: url.to_string(),
            recipe,
            result_selectors: sels.iter().map(|s| s.to_string()).collect(),
        }
    };
    vec![
        entry("taobao", "taobao.com", &["taobao", "淘宝"], "https://s.taobao.com/search?q={query}",
              Recipe::Shop, &["#content_items_wrapper a", ".m-itemlist .items .item", "div[class*='Card--']"]),
        entry("jd", "jd.com", &["jingdong", "京东"], "https://search.jd.com/Search?keyword={query}",
              Recipe::Shop, &["#J_goodsList li.gl-item", ".gl-item"]),
        entry("tmall", "tmall.com", &["tmall", "天猫"], "https://list.tmall.com/search_product.htm?q={query}",
              Recipe::Shop, &["#J_ItemList .product", ".product-iWrap"]),
        entry("amazon", "amazon.com", &["amazon", "亚马逊"], "https://www.amazon.com/s?k={query}",
              Recipe::Shop, &["div[data-component-type='s-search-result']"]),
        entry("bilibili", "bilibili.com", &["bilibili", "b站", "哔哩哔哩"], "https://search.bilibili.com/all?keyword={query}",
              Recipe::Video, &[".bili-video-card a[href*='/video/']", ".video-list .bili-video-card__wrap a", "a[href*='bilibili.com/video/']"]),
        entry("youtube", "youtube.com", &["youtube", "油管"], "https://www.youtube.com/results?search_query={query}",
              Recipe::Video, &["ytd-video-renderer a#video-title", "a#video-title", "a[href^='/watch']"]),
        entry("douyin", "douyin.com", &["douyin", "抖音"], "https://www.douyin.com/search/{query}",
              Recipe::Video, &["ul[data-e2e='scroll-list'] li a", "a[href*='/video/']"]),
        entry("xiaohongshu", "xiaohongshu.com", &["xiaohongshu", "小红书", "rednote"], "https://www.xiaohongshu.com/search_result?keyword={query}",
              Recipe::Page, &[]),
        entry("zhihu", "zhihu.com", &["zhihu", "知乎"], "https://www.zhihu.com/search?type=content&q={query}",
              Recipe::Page, &[]),
        entry("weibo", "weibo.com", &["weibo", "微博"], "https://s.weibo.com/weibo?q={query}",
              Recipe::Page, &[]),
        entry("baidu", "baidu.com", &["baidu", "百度"], "https://www.baidu.com/s?wd={query}",
              Recipe::Page, &[]),
        entry("github", "github.com", &["github"], "https://github.com/search?q={query}",
              Recipe::Page, &[]),
    ]
});

#[derive(Debug, Clone)]
pub struct PlatformResolver {
    entries: Vec<PlatformEntry>,
    generic_search_url: String,
}

impl Default for PlatformResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORMS.clone())
    }
}

impl PlatformResolver {
    pub fn new(entries: Vec<PlatformEntry>) -> Self {
        Self {
            entries,
            generic_search_url: GENERIC_SEARCH_URL.to_string(),
        }
    }

    /// Reads the table from `path`, writing the defaults there first if it is missing.
    /// A malformed file falls back to the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!("[Platforms] using built-in table ({}): {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&*DEFAULT_PLATFORMS)?)?;
            info!("[Platforms] wrote default table: {}", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let entries: Vec<PlatformEntry> =
            serde_json::from_str(&content).context("platform table is not valid JSON")?;
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[PlatformEntry] {
        &self.entries
    }

    /// Entry named by a plan's `target_platform` (name, domain, URL or keyword).
    pub fn find(&self, platform: &str) -> Option<&PlatformEntry> {
        self.entries.iter().find(|e| e.matches_platform(platform))
    }

    /// Entry mentioned anywhere in free text.
    pub fn detect(&self, text: &str) -> Option<&PlatformEntry> {
        let lower = text.to_lowercase();
        self.entries.iter().find(|e| e.mentioned_in(&lower))
    }

    fn resolve(&self, platform: &str, query: &str) -> Option<&PlatformEntry> {
        self.find(platform).or_else(|| self.detect(platform)).or_else(|| self.detect(query))
    }

    /// The search keyword left once platform names and filler words are removed.
    ///
    /// Platform mentions split the query into segments. Fillers are only peeled off
    /// segment edges; single-character CJK fillers only right next to a mention.
    pub fn search_keyword(&self, query: &str) -> String {
        let segments = self.split_on_mentions(query);
        let kept: Vec<String> = segments
            .iter()
            .map(|seg| trim_fillers(seg.text, seg.after_mention, seg.before_mention))
            .filter(|s| !s.is_empty())
            .collect();
        let keyword = kept.join(" ");
        if keyword.is_empty() {
            query.trim().to_string()
        } else {
            keyword
        }
    }

    fn split_on_mentions<'a>(&self, query: &'a str) -> Vec<Segment<'a>> {
        // ASCII lowercasing keeps byte offsets aligned with `query`.
        let lower = query.to_ascii_lowercase();
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for entry in &self.entries {
            for kw in entry.keywords.iter().chain(std::iter::once(&entry.domain)) {
                let needle = kw.trim().to_ascii_lowercase();
                if needle.is_empty() {
                    continue;
                }
                spans.extend(lower.match_indices(&needle).map(|(at, m)| (at, at + m.len())));
            }
        }
        spans.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut segments = Vec::with_capacity(merged.len() + 1);
        let mut cursor = 0;
        for (start, end) in &merged {
            segments.push(Segment {
                text: &query[cursor..*start],
                after_mention: cursor > 0,
                before_mention: true,
            });
            cursor = *end;
        }
        segments.push(Segment {
            text: &query[cursor..],
            after_mention: cursor > 0,
            before_mention: false,
        });
        segments
    }

    pub fn generic_search_url(&self, query: &str) -> String {
        fill_template(&self.generic_search_url, query)
    }

    /// Deep-link search URL for a known platform; `None` outside the table.
    pub fn search_url(&self, platform: &str, query: &str) -> Option<String> {
        self.resolve(platform, query)
            .map(|entry| entry.search_url_for(&self.search_keyword(query)))
    }

    /// Deep link when the platform is known, generic web search otherwise.
    pub fn search_url_or_generic(&self, platform: &str, query: &str) -> String {
        self.search_url(platform, query)
            .unwrap_or_else(|| self.generic_search_url(query))
    }

    /// Canned steps for plans that arrived without any. Falls back to a plain web search.
    pub fn canned_steps(&self, platform: &str, query: &str) -> Vec<Action> {
        let Some(entry) = self.resolve(platform, query) else {
            return vec![Action::new("navigate").with("url", self.generic_search_url(query))];
        };
        let url = entry.search_url_for(&self.search_keyword(query));
        let mut steps = vec![Action::new("navigate").with("url", url)];
        match entry.recipe {
            Recipe::Page => {}
            Recipe::Shop => {
                if !entry.result_selectors.is_empty() {
                    steps.push(
                        Action::new("wait_any")
                            .with("selectors", json!(entry.result_selectors))
                            .with("optional", true),
                    );
                }
                steps.push(Action::new("screenshot").with("optional", true));
            }
            Recipe::Video => {
                if !entry.result_selectors.is_empty() {
                    steps.push(
                        Action::new("wait_any")
                            .with("selectors", json!(entry.result_selectors))
                            .with("optional", true),
                    );
                    steps.push(
                        Action::new("click_any")
                            .with("selectors", json!(entry.result_selectors))
                            .with("new_page", true),
                    );
                }
                steps.push(Action::new("wait_video_ready").with("optional", true));
                steps.push(Action::new("video_play").with("optional", true));
                steps.push(Action::new("video_force_play").with("optional", true));
            }
        }
        steps
    }

    /// Video platforms support the composite "search then play first result".
    pub fn is_video_platform(&self, platform: &str, query: &str) -> bool {
        self.resolve(platform, query)
            .map(|e| e.recipe == Recipe::Video)
            .unwrap_or(false)
    }
}

struct Segment<'a> {
    text: &'a str,
    after_mention: bool,
    before_mention: bool,
}

fn is_ascii_filler(token: &str) -> bool {
    FILLER_WORDS.iter().any(|f| f.eq_ignore_ascii_case(token))
}

/// CJK fillers allowed at this edge: all of them beside a mention, multi-character ones elsewhere.
fn cjk_fillers(touches_mention: bool) -> impl Iterator<Item = &'static str> {
    CJK_FILLERS
        .iter()
        .copied()
        .filter(move |f| touches_mention || f.chars().count() > 1)
}

fn trim_fillers(segment: &str, after_mention: bool, before_mention: bool) -> String {
    let mut tokens: Vec<String> = segment.split_whitespace().map(str::to_string).collect();

    let mut touching = after_mention && !segment.starts_with(char::is_whitespace);
    while let Some(first) = tokens.first_mut() {
        if is_ascii_filler(first) {
            tokens.remove(0);
            touching = false;
            continue;
        }
        while let Some(rest) = cjk_fillers(touching).find_map(|f| first.strip_prefix(f)) {
            *first = rest.to_string();
            touching = false;
        }
        if first.is_empty() {
            tokens.remove(0);
            touching = false;
            continue;
        }
        break;
    }

    let mut touching = before_mention && !segment.ends_with(char::is_whitespace);
    while let Some(last) = tokens.last_mut() {
        if is_ascii_filler(last) {
            tokens.pop();
            touching = false;
            continue;
        }
        while let Some(rest) = cjk_fillers(touching).find_map(|f| last.strip_suffix(f)) {
            *last = rest.to_string();
            touching = false;
        }
        if last.is_empty() {
            tokens.pop();
            touching = false;
            continue;
        }
        break;
    }

    tokens.join(" ")
}
