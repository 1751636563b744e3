//! One audit: optional login, then a crawl, over a driver the session owns.

use serde::Serialize;
use tracing::{error, info};

use crate::analyzer::Analyzer;
use crate::crawler::{CrawlConfig, Crawler, ProgressCallback, ResultCallback};
use crate::driver::Driver;
use crate::error::{Result, ScanError};
use crate::frontier::CrawlFrontierEntry;
use crate::login::{LoginOrchestrator, LoginOutcome};
use crate::result::PageTestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    LoggingIn,
    Crawling,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub login_used: bool,
    pub start_url: String,
    pub login: Option<LoginOutcome>,
    pub results: Vec<PageTestResult>,
    pub unvisited: Vec<CrawlFrontierEntry>,
}

pub struct AuditSession<D: Driver, A: Analyzer> {
    driver: D,
    analyzer: A,
    login: Option<LoginOrchestrator>,
    crawl: CrawlConfig,
    state: SessionState,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
}

impl<D: Driver, A: Analyzer> AuditSession<D, A> {
    pub fn new(driver: D, analyzer: A) -> Self {
        Self {
            driver,
            analyzer,
            login: None,
            crawl: CrawlConfig::default(),
            state: SessionState::Idle,
            progress_callback: None,
            result_callback: None,
        }
    }

    pub fn with_login(mut self, login: LoginOrchestrator) -> Self {
        self.login = Some(login);
        self
    }

    pub fn with_crawl_config(mut self, config: CrawlConfig) -> Self {
        self.crawl = config;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Hand the driver back, e.g. to close the browser.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Run the configured login once and report the verdict.
    pub async fn login(&mut self) -> Result<LoginOutcome> {
        let orchestrator = self
            .login
            .as_mut()
            .ok_or_else(|| ScanError::Other("no login configured".to_string()))?;
        self.state = SessionState::LoggingIn;
        orchestrator.login(&self.driver).await
    }

    /// Crawl from `start_url`, testing at most `max_pages` pages.
    pub async fn crawl_and_test(&mut self, start_url: &str, max_pages: usize) -> Result<Vec<PageTestResult>> {
        self.state = SessionState::Crawling;
        let outcome = self.crawler().crawl_and_test(start_url, max_pages).await;
        self.state = SessionState::Done;
        outcome
    }

    fn crawler(&self) -> Crawler<'_, D, A> {
        let mut crawler = Crawler::new(&self.driver, &self.analyzer, self.crawl.clone());
        if let Some(callback) = &self.progress_callback {
            crawler = crawler.with_progress_callback(callback.clone());
        }
        if let Some(callback) = &self.result_callback {
            crawler = crawler.with_result_callback(callback.clone());
        }
        crawler
    }

    /// Log in if configured, then crawl.
    ///
    /// The crawl starts at `start_url` when given, otherwise at the
    /// configured post-login URL, otherwise wherever the login landed.
    pub async fn run(&mut self, start_url: Option<&str>) -> Result<SessionReport> {
        self.state = SessionState::Idle;

        let login = if self.login.is_some() {
            let outcome = match self.login().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.state = SessionState::Done;
                    error!("Login could not be completed: {}", e);
                    return Err(e);
                }
            };
            if !outcome.success {
                self.state = SessionState::Done;
                let url = outcome.current_url.clone().unwrap_or_default();
                error!("Login was not verified at {}", url);
                return Err(ScanError::LoginVerificationFailed {
                    url,
                    reason: outcome.reason,
                });
            }
            Some(outcome)
        } else {
            None
        };

        let configured = self
            .login
            .as_ref()
            .and_then(|l| l.config().post_login_url.clone());
        let detected = login.as_ref().and_then(|l| l.current_url.clone());
        let Some(start) = start_url.map(str::to_string).or(configured).or(detected) else {
            self.state = SessionState::Done;
            return Err(ScanError::Other("no start URL to crawl from".to_string()));
        };
        info!("Crawl starts at {}", start);

        self.state = SessionState::Crawling;
        let summary = self.crawler().crawl(&start, self.crawl.max_pages).await;
        self.state = SessionState::Done;
        let summary = summary?;

        Ok(SessionReport {
            login_used: login.is_some(),
            start_url: start,
            login,
            results: summary.results,
            unvisited: summary.unvisited,
        })
    }
}
