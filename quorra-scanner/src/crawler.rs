use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::analyzer::Analyzer;
use crate::driver::Driver;
use crate::error::{Result, ScanError};
use crate::frontier::{
    CrawlFrontierEntry, Frontier, discover_links, is_crawlable, is_same_origin, normalize_url,
    page_url, priority_score,
};
use crate::result::PageTestResult;
use crate::stability::{StabilityConfig, StabilityExpectation, StabilityWaiter};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;
pub type ResultCallback = Arc<dyn Fn(&PageTestResult) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub max_pages: usize,
    pub max_depth: usize,
    /// Skip admin, api, logout and download paths.
    pub strict_filtering: bool,
    /// Treat URLs differing only in their query as the same page.
    pub strip_query: bool,
    pub stability: StabilityConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            max_depth: 3,
            strict_filtering: true,
            strip_query: true,
            stability: StabilityConfig::default(),
        }
    }
}

impl CrawlConfig {
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_strict_filtering(mut self, strict: bool) -> Self {
        self.strict_filtering = strict;
        self
    }

    pub fn with_strip_query(mut self, strip: bool) -> Self {
        self.strip_query = strip;
        self
    }

    pub fn with_stability(mut self, stability: StabilityConfig) -> Self {
        self.stability = stability;
        self
    }
}

/// Everything a finished crawl produced.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    /// One result per tested page, in crawl order.
    pub results: Vec<PageTestResult>,
    /// Frontier entries left untested when the crawl stopped.
    pub unvisited: Vec<CrawlFrontierEntry>,
}

/// Sequential, priority-ordered crawl of one origin through a single driver.
pub struct Crawler<'a, D: Driver, A: Analyzer> {
    driver: &'a D,
    analyzer: &'a A,
    config: CrawlConfig,
    waiter: StabilityWaiter,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
}

struct PageVisit {
    result: PageTestResult,
    landed: Option<Url>,
    links: Vec<Url>,
}

impl<'a, D: Driver, A: Analyzer> Crawler<'a, D, A> {
    pub fn new(driver: &'a D, analyzer: &'a A, config: CrawlConfig) -> Self {
        let waiter = StabilityWaiter::new(config.stability);
        Self {
            driver,
            analyzer,
            config,
            waiter,
            progress_callback: None,
            result_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    pub async fn crawl_and_test(&self, start_url: &str, max_pages: usize) -> Result<Vec<PageTestResult>> {
        Ok(self.crawl(start_url, max_pages).await?.results)
    }

    /// Test up to `max_pages` pages reachable from `start_url`.
    ///
    /// Per-page failures are recorded as failed results; only an invalid
    /// start URL is an error.
    pub async fn crawl(&self, start_url: &str, max_pages: usize) -> Result<CrawlSummary> {
        let start = Url::parse(start_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", start_url, e)))?;
        info!("Starting crawl of {} (budget {} pages, depth {})", start, max_pages, self.config.max_depth);

        let mut frontier = Frontier::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut results: Vec<PageTestResult> = Vec::new();

        frontier.push(CrawlFrontierEntry {
            url: normalize_url(&start, self.config.strip_query),
            target: page_url(&start),
            depth: 0,
            priority: priority_score(&start),
        });

        while results.len() < max_pages {
            let Some(entry) = frontier.pop() else {
                break;
            };
            if !visited.insert(entry.url.clone()) {
                continue;
            }

            if let Some(callback) = &self.progress_callback {
                callback(results.len() + 1, entry.target.clone());
            }

            let visit = self.test_page(&entry).await;

            if let Some(landed) = &visit.landed {
                let key = normalize_url(landed, self.config.strip_query);
                if key != entry.url && !visited.insert(key.clone()) {
                    debug!("{} redirected to already tested {}", entry.url, key);
                    continue;
                }
            }

            if let Some(callback) = &self.result_callback {
                callback(&visit.result);
            }
            results.push(visit.result);

            let child_depth = entry.depth + 1;
            if child_depth > self.config.max_depth {
                debug!("Not following links from {} (depth {})", entry.url, entry.depth);
                continue;
            }

            let mut added = 0;
            for link in visit.links {
                if !is_same_origin(&link, &start) || !is_crawlable(&link, self.config.strict_filtering) {
                    continue;
                }
                let key = normalize_url(&link, self.config.strip_query);
                if visited.contains(&key) || frontier.contains(&key) {
                    continue;
                }
                let priority = priority_score(&link);
                if frontier.push(CrawlFrontierEntry {
                    url: key,
                    target: page_url(&link),
                    depth: child_depth,
                    priority,
                }) {
                    added += 1;
                }
            }
            frontier.sort_by_priority();
            debug!("Queued {} new links; frontier holds {}", added, frontier.len());
        }

        info!(
            "Crawl finished: {} pages tested, {} left in frontier",
            results.len(),
            frontier.len()
        );
        Ok(CrawlSummary {
            results,
            unvisited: frontier.into_entries(),
        })
    }

    async fn test_page(&self, entry: &CrawlFrontierEntry) -> PageVisit {
        debug!("Testing {} (depth {}, priority {})", entry.target, entry.depth, entry.priority);

        if let Err(e) = self.driver.navigate(&entry.target).await {
            let error = ScanError::PageTestFailed {
                url: entry.target.clone(),
                reason: e.to_string(),
            };
            warn!("{}", error);
            return PageVisit {
                result: PageTestResult::failed(entry.target.clone(), entry.depth, error.to_string()),
                landed: None,
                links: Vec::new(),
            };
        }

        self.waiter
            .await_stable(self.driver, StabilityExpectation::AnyContent)
            .await;

        let landed = match self.driver.current_url().await {
            Ok(current) => Url::parse(&current).ok(),
            Err(e) => {
                debug!("Could not read URL after navigating to {}: {}", entry.target, e);
                None
            }
        };
        let title = self.driver.title().await.ok();

        let result = match self.analyzer.analyze(self.driver).await {
            Ok(analysis) => {
                debug!(
                    "{}: {} violations, {} passes",
                    entry.target,
                    analysis.violations.len(),
                    analysis.passes.len()
                );
                PageTestResult::new(entry.target.clone(), entry.depth, analysis).with_title(title)
            }
            Err(e) => {
                let error = ScanError::PageTestFailed {
                    url: entry.target.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", error);
                PageTestResult::failed(entry.target.clone(), entry.depth, error.to_string()).with_title(title)
            }
        };

        let base = landed.clone().or_else(|| Url::parse(&entry.target).ok());
        let links = match (base, self.driver.page_source().await) {
            (Some(base), Ok(html)) => discover_links(&html, &base),
            (_, Err(e)) => {
                debug!("No page source for {}: {}", entry.target, e);
                Vec::new()
            }
            (None, Ok(_)) => Vec::new(),
        };

        PageVisit {
            result,
            landed,
            links,
        }
    }
}
