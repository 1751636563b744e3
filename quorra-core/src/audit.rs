use indicatif::{ProgressBar, ProgressStyle};
use quorra_scanner::crawler::CrawlConfig;
use quorra_scanner::login::{LoginConfig, LoginOrchestrator};
use quorra_scanner::result::PageTestResult;
use quorra_scanner::session::AuditSession;
use quorra_scanner::{Analyzer, Driver, ScanError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::report::AuditReport;

/// Options for one audit run
pub struct AuditOptions {
    /// Credentials and selectors; `None` audits anonymously.
    pub login: Option<LoginConfig>,
    /// Where to start crawling; defaults to the page reached after login.
    pub start_url: Option<String>,
    pub crawl: CrawlConfig,
    pub show_progress_bars: bool,
}

impl AuditOptions {
    pub fn new() -> Self {
        Self {
            login: None,
            start_url: None,
            crawl: CrawlConfig::default(),
            show_progress_bars: false,
        }
    }

    pub fn with_login(mut self, login: LoginConfig) -> Self {
        self.login = Some(login);
        self
    }

    pub fn with_start_url(mut self, url: Option<String>) -> Self {
        self.start_url = url;
        self
    }

    pub fn with_crawl(mut self, crawl: CrawlConfig) -> Self {
        self.crawl = crawl;
        self
    }

    pub fn with_progress_bars(mut self, show: bool) -> Self {
        self.show_progress_bars = show;
        self
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback for phase messages
pub type AuditProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Callback for each page result as it is produced
pub type AuditResultCallback = Arc<dyn Fn(&PageTestResult) + Send + Sync>;

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run one audit session: log in if configured, then crawl and test.
///
/// A failed login is returned as an error and nothing is crawled. The
/// driver is closed before returning either way.
pub async fn execute_audit<D: Driver, A: Analyzer>(
    driver: D,
    analyzer: A,
    options: AuditOptions,
    progress_callback: Option<AuditProgressCallback>,
    result_callback: Option<AuditResultCallback>,
) -> Result<AuditReport, ScanError> {
    let AuditOptions {
        login,
        start_url,
        crawl,
        show_progress_bars,
    } = options;

    let progress_bar = show_progress_bars.then(|| Arc::new(spinner()));
    let tested = Arc::new(AtomicUsize::new(0));

    let notify = |message: String| {
        if let Some(pb) = &progress_bar {
            pb.set_message(message.clone());
        }
        if let Some(callback) = &progress_callback {
            callback(message);
        }
    };

    let max_pages = crawl.max_pages;
    let mut session = AuditSession::new(driver, analyzer).with_crawl_config(crawl);

    if let Some(login) = login {
        notify(format!("Logging in at {}", login.login_url));
        session = session.with_login(LoginOrchestrator::new(login));
    }

    let page_progress = {
        let pb = progress_bar.clone();
        let callback = progress_callback.clone();
        Arc::new(move |n: usize, url: String| {
            let message = format!("Testing page {}/{}: {}", n, max_pages, url);
            if let Some(pb) = &pb {
                pb.set_message(message.clone());
            }
            if let Some(callback) = &callback {
                callback(message);
            }
        })
    };
    session = session.with_progress_callback(page_progress);

    {
        let tested = tested.clone();
        let callback = result_callback.clone();
        session = session.with_result_callback(Arc::new(move |result: &PageTestResult| {
            tested.fetch_add(1, Ordering::Relaxed);
            if let Some(callback) = &callback {
                callback(result);
            }
        }));
    }

    let outcome = session.run(start_url.as_deref()).await;
    if let Err(e) = session.into_driver().close().await {
        warn!("Browser did not shut down cleanly: {}", e);
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &progress_bar {
                pb.finish_with_message(format!("Audit aborted: {}", e));
            }
            return Err(e);
        }
    };

    let count = tested.load(Ordering::Relaxed);
    if let Some(pb) = &progress_bar {
        pb.finish_with_message(format!("Audit complete! {} pages tested", count));
    }
    info!(
        "Audit of {} finished: {} pages tested, {} left unvisited",
        report.start_url,
        count,
        report.unvisited.len()
    );

    Ok(AuditReport::new(report.results, report.login_used)
        .with_start_url(Some(report.start_url))
        .with_unvisited(report.unvisited.len()))
}
