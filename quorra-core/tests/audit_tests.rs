// Tests for audit orchestration

use quorra_core::audit::{AuditOptions, AuditProgressCallback, AuditResultCallback, execute_audit};
use quorra_scanner::ScanError;
use quorra_scanner::crawler::CrawlConfig;
use quorra_scanner::fixture::{FixtureAnalyzer, FixtureDriver};
use quorra_scanner::login::LoginConfig;
use quorra_scanner::result::{AnalysisResults, Impact, PageTestResult, RuleResult};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

const LOGIN: &str = "https://app.ex.com/login";

const LOGIN_FORM: &str = r#"<html><head><title>Sign in</title></head><body>
    <form action="/session" method="post">
        <label for="user">Username</label><input id="user" name="username">
        <label for="pass">Password</label><input id="pass" type="password" name="password">
        <input type="submit" value="Sign in">
    </form></body></html>"#;

const HOME: &str = r#"<html><head><title>Home</title></head><body>
    <nav><a href="/profile">Profile</a><a href="/about">About us</a>
    <a href="/logout">Sign out</a><a href="/files/export.pdf">Export</a></nav>
    <h1>Welcome back</h1></body></html>"#;

fn site() -> FixtureDriver {
    FixtureDriver::new()
        .with_page(LOGIN, LOGIN_FORM)
        .with_page("https://app.ex.com/home", HOME)
        .with_page("https://app.ex.com/profile", "<html><head><title>Profile</title></head><body></body></html>")
        .with_page("https://app.ex.com/about", "<html><head><title>About</title></head><body></body></html>")
        .on_submit(LOGIN, "https://app.ex.com/home")
        .with_credentials("grace", "s3cret")
}

fn analyzer() -> FixtureAnalyzer {
    FixtureAnalyzer::new().with_results(
        "https://app.ex.com/home",
        AnalysisResults {
            violations: vec![RuleResult::new("landmark-one-main").with_impact(Impact::Moderate)],
            ..AnalysisResults::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_audit_builds_report() {
    let options = AuditOptions::new().with_login(LoginConfig::new(LOGIN, "grace", "s3cret"));

    let report = execute_audit(site(), analyzer(), options, None, None)
        .await
        .unwrap();

    assert!(report.login_used);
    assert_eq!(report.start_url.as_deref(), Some("https://app.ex.com/home"));
    assert_eq!(report.summary.pages_tested, 3);
    assert_eq!(report.summary.impact.moderate, 1);
    // About outranks Profile on content keywords
    assert_eq!(report.pages[1].url, "https://app.ex.com/about");
    assert_eq!(report.pages[0].title.as_deref(), Some("Home"));
    assert_eq!(report.unvisited, 0);
}

#[tokio::test(start_paused = true)]
async fn test_page_budget_leaves_unvisited_count() {
    let options = AuditOptions::new()
        .with_login(LoginConfig::new(LOGIN, "grace", "s3cret"))
        .with_crawl(CrawlConfig::default().with_max_pages(2));

    let report = execute_audit(site(), analyzer(), options, None, None)
        .await
        .unwrap();

    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.unvisited, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_login_is_an_error() {
    let options = AuditOptions::new().with_login(LoginConfig::new(LOGIN, "grace", "guess"));

    let result = execute_audit(site(), analyzer(), options, None, None).await;

    assert!(matches!(result, Err(ScanError::LoginVerificationFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_audit_from_start_url() {
    let options = AuditOptions::new().with_start_url(Some("https://app.ex.com/about".to_string()));

    let report = execute_audit(site(), analyzer(), options, None, None)
        .await
        .unwrap();

    assert!(!report.login_used);
    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.summary.average_score, Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_receive_progress_and_results() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let results = Arc::new(Mutex::new(Vec::new()));

    let progress: AuditProgressCallback = {
        let messages = messages.clone();
        Arc::new(move |message: String| messages.lock().unwrap().push(message))
    };
    let on_result: AuditResultCallback = {
        let results = results.clone();
        Arc::new(move |result: &PageTestResult| results.lock().unwrap().push(result.url.clone()))
    };

    let options = AuditOptions::new().with_login(LoginConfig::new(LOGIN, "grace", "s3cret"));
    execute_audit(site(), analyzer(), options, Some(progress), Some(on_result))
        .await
        .unwrap();

    let messages = messages.lock().unwrap();
    assert_eq!(messages[0], format!("Logging in at {}", LOGIN));
    assert!(messages.contains(&"Testing page 1/10: https://app.ex.com/home".to_string()));
    assert_eq!(results.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_driver_is_closed_after_audit() {
    let driver = site();
    let closed = driver.closed_flag();
    let options = AuditOptions::new().with_login(LoginConfig::new(LOGIN, "grace", "s3cret"));

    execute_audit(driver, analyzer(), options, None, None)
        .await
        .unwrap();

    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_driver_is_closed_after_rejected_login() {
    let driver = site();
    let closed = driver.closed_flag();
    let options = AuditOptions::new().with_login(LoginConfig::new(LOGIN, "grace", "guess"));

    let result = execute_audit(driver, analyzer(), options, None, None).await;

    assert!(matches!(result, Err(ScanError::LoginVerificationFailed { .. })));
    assert!(closed.load(Ordering::SeqCst));
}
