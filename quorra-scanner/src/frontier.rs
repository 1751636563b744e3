//! Link discovery, filtering and prioritisation for the crawl.

use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::debug;
use url::Url;

const SKIPPED_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "css", "js", "mjs", "map",
    "json", "xml", "txt", "zip", "gz", "tar", "rar", "7z", "exe", "dmg", "mp3", "mp4", "avi",
    "mov", "webm", "woff", "woff2", "ttf", "eot", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
];

/// Path segments skipped under strict filtering.
const RESTRICTED_SEGMENTS: &[&str] = &[
    "admin",
    "administrator",
    "wp-admin",
    "api",
    "logout",
    "log-out",
    "signout",
    "sign-out",
    "logoff",
    "download",
    "downloads",
];

const CONTENT_KEYWORDS: &[&str] = &["about", "service", "product", "contact", "guide", "tutorial"];

const USER_CONTENT_MARKERS: &[&str] = &[
    "/user/", "/users/", "/u/", "/member", "/comment", "/forum", "/tag/", "/author/",
];

const UTILITY_MARKERS: &[&str] = &[
    "privacy", "terms", "cookie", "legal", "sitemap", "search", "login", "register", "cart",
    "checkout",
];

pub const BASE_PRIORITY: i32 = 50;
pub const CONTENT_BONUS: i32 = 20;
pub const DEPTH_PENALTY: i32 = 5;
pub const USER_CONTENT_PENALTY: i32 = 15;
pub const UTILITY_PENALTY: i32 = 10;
pub const QUERY_PENALTY: i32 = 5;

/// A discovered page waiting to be tested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlFrontierEntry {
    /// Normalized URL; also the dedup key.
    pub url: String,
    /// The URL as linked, minus its fragment. This is what gets loaded.
    pub target: String,
    pub depth: usize,
    pub priority: i32,
}

/// The address to load for `url`: fragment removed, query kept.
pub fn page_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Canonical form used for dedup: no fragment, no trailing slash, and
/// optionally no query.
pub fn normalize_url(url: &Url, strip_query: bool) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    if strip_query {
        url.set_query(None);
    }
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

/// Whether `url` is worth testing at all.
pub fn is_crawlable(url: &Url, strict: bool) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    let path = url.path().to_lowercase();
    if let Some((_, extension)) = path.rsplit('/').next().unwrap_or_default().rsplit_once('.')
        && SKIPPED_EXTENSIONS.contains(&extension)
    {
        return false;
    }

    if strict
        && path
            .split('/')
            .any(|segment| RESTRICTED_SEGMENTS.contains(&segment))
    {
        return false;
    }

    true
}

/// Higher for content pages, lower for deep, user-generated or utility pages.
pub fn priority_score(url: &Url) -> i32 {
    let path = url.path().to_lowercase();
    let mut priority = BASE_PRIORITY;

    if CONTENT_KEYWORDS.iter().any(|k| path.contains(k)) {
        priority += CONTENT_BONUS;
    }

    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    if depth > 2 {
        priority -= DEPTH_PENALTY * (depth as i32 - 2);
    }

    let slashed = format!("{}/", path);
    if USER_CONTENT_MARKERS.iter().any(|m| slashed.contains(m)) {
        priority -= USER_CONTENT_PENALTY;
    }

    if UTILITY_MARKERS.iter().any(|m| path.contains(m)) {
        priority -= UTILITY_PENALTY;
    }

    if url.query().is_some() {
        priority -= QUERY_PENALTY;
    }

    priority
}

pub fn is_same_origin(url: &Url, origin: &Url) -> bool {
    url.origin() == origin.origin()
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Absolute `a[href]` targets found in `html`, in document order.
pub fn discover_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href")
            && let Some(url) = resolve_href(base, href)
            && seen.insert(url.to_string())
        {
            debug!("Found link: {}", url);
            links.push(url);
        }
    }
    links
}

/// Pending pages, highest priority first after [`Frontier::sort_by_priority`].
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlFrontierEntry>,
    queued: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the URL is already queued.
    pub fn push(&mut self, entry: CrawlFrontierEntry) -> bool {
        if !self.queued.insert(entry.url.clone()) {
            return false;
        }
        self.queue.push_back(entry);
        true
    }

    pub fn pop(&mut self) -> Option<CrawlFrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.queued.remove(&entry.url);
        Some(entry)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.queued.contains(url)
    }

    /// Stable: equal priorities keep discovery order.
    pub fn sort_by_priority(&mut self) {
        self.queue
            .make_contiguous()
            .sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn into_entries(self) -> Vec<CrawlFrontierEntry> {
        self.queue.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn entry(u: &str, priority: i32) -> CrawlFrontierEntry {
        CrawlFrontierEntry {
            url: u.to_string(),
            target: u.to_string(),
            depth: 1,
            priority,
        }
    }

    #[test]
    fn test_page_url_keeps_query() {
        assert_eq!(
            page_url(&url("https://ex.com/view?item=about#top")),
            "https://ex.com/view?item=about"
        );
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(&url("https://ex.com/docs/?page=2#intro"), true),
            "https://ex.com/docs"
        );
        assert_eq!(
            normalize_url(&url("https://ex.com/docs/?page=2#intro"), false),
            "https://ex.com/docs?page=2"
        );
        assert_eq!(normalize_url(&url("https://ex.com"), true), "https://ex.com/");
    }

    #[test]
    fn test_is_crawlable_rejects_assets_and_schemes() {
        assert!(is_crawlable(&url("https://ex.com/about"), true));
        assert!(!is_crawlable(&url("https://ex.com/files/report.PDF"), false));
        assert!(!is_crawlable(&url("https://ex.com/static/app.js"), false));
        assert!(!is_crawlable(&url("mailto:team@ex.com"), false));
        assert!(!is_crawlable(&url("tel:+15555550100"), false));
        assert!(is_crawlable(&url("https://ex.com/v1.2/notes"), false));
    }

    #[test]
    fn test_strict_filtering_skips_session_ending_paths() {
        assert!(!is_crawlable(&url("https://ex.com/logout"), true));
        assert!(!is_crawlable(&url("https://ex.com/admin/users"), true));
        assert!(!is_crawlable(&url("https://ex.com/api/v1/items"), true));
        assert!(is_crawlable(&url("https://ex.com/logout"), false));
        assert!(is_crawlable(&url("https://ex.com/apiary"), true));
    }

    #[test]
    fn test_priority_score() {
        assert_eq!(priority_score(&url("https://ex.com/about")), BASE_PRIORITY + CONTENT_BONUS);
        assert_eq!(priority_score(&url("https://ex.com/pricing")), BASE_PRIORITY);
        assert_eq!(
            priority_score(&url("https://ex.com/a/b/c/d")),
            BASE_PRIORITY - 2 * DEPTH_PENALTY
        );
        assert_eq!(
            priority_score(&url("https://ex.com/users/42")),
            BASE_PRIORITY - USER_CONTENT_PENALTY
        );
        assert_eq!(
            priority_score(&url("https://ex.com/privacy?lang=en")),
            BASE_PRIORITY - UTILITY_PENALTY - QUERY_PENALTY
        );
    }

    #[test]
    fn test_discover_links_resolves_and_filters_hrefs() {
        let html = r##"<html><body>
            <a href="/about">About</a>
            <a href="services/">Services</a>
            <a href="https://other.com/x">Elsewhere</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:a@ex.com">Mail</a>
            <a href="/about#team">About again</a>
            <a>No href</a>
        </body></html>"##;

        let links = discover_links(html, &url("https://ex.com/docs/index"));
        let links: Vec<String> = links.iter().map(Url::to_string).collect();

        assert_eq!(
            links,
            vec![
                "https://ex.com/about",
                "https://ex.com/docs/services/",
                "https://other.com/x",
            ]
        );
    }

    #[test]
    fn test_same_origin() {
        let origin = url("https://ex.com/");
        assert!(is_same_origin(&url("https://ex.com/a"), &origin));
        assert!(!is_same_origin(&url("http://ex.com/a"), &origin));
        assert!(!is_same_origin(&url("https://blog.ex.com/a"), &origin));
    }

    #[test]
    fn test_frontier_dedups_and_sorts_stably() {
        let mut frontier = Frontier::new();
        assert!(frontier.push(entry("https://ex.com/a", 50)));
        assert!(frontier.push(entry("https://ex.com/b", 70)));
        assert!(frontier.push(entry("https://ex.com/c", 50)));
        assert!(!frontier.push(entry("https://ex.com/a", 90)));

        frontier.sort_by_priority();

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop()).map(|e| e.url).collect();
        assert_eq!(order, vec!["https://ex.com/b", "https://ex.com/a", "https://ex.com/c"]);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_popped_url_can_be_requeued() {
        let mut frontier = Frontier::new();
        frontier.push(entry("https://ex.com/a", 50));
        frontier.pop();
        assert!(!frontier.contains("https://ex.com/a"));
        assert!(frontier.push(entry("https://ex.com/a", 50)));
        assert_eq!(frontier.len(), 1);
    }
}
