//! Authenticated accessibility scanning.
//!
//! Locate and submit a login form on an unfamiliar site, verify the session
//! took, then crawl same-origin pages and run an accessibility engine on each.

pub mod analyzer;
pub mod chromium;
pub mod crawler;
pub mod driver;
pub mod error;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod frontier;
pub mod login;
pub mod resolver;
pub mod result;
pub mod scorer;
pub mod session;
pub mod stability;
pub mod strategy;
pub mod verifier;

pub use analyzer::{Analyzer, AxeAnalyzer};
pub use chromium::{ChromiumConfig, ChromiumDriver};
pub use crawler::{CrawlConfig, Crawler};
pub use driver::Driver;
pub use error::{Result, ScanError};
pub use login::{LoginConfig, LoginOrchestrator, LoginOutcome};
pub use result::{Impact, ImpactCounts, PageTestResult, RuleResult};
pub use session::{AuditSession, SessionReport, SessionState};
