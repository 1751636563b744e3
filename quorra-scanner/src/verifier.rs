//! Post-submit login verification.
//!
//! No single observation proves a login worked: conventional sites redirect,
//! single-page apps re-render in place. The verifier collects independent
//! signals and combines them. A passing URL-change signal is accepted on its
//! own; otherwise the remaining signals are weighted and must reach
//! [`SUCCESS_THRESHOLD`].

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::driver::Driver;
use crate::error::Result;

pub const DOM_INDICATOR_WEIGHT: u32 = 30;
pub const FORM_ABSENCE_WEIGHT: u32 = 30;
pub const CONTENT_WEIGHT: u32 = 20;
pub const ERROR_ABSENCE_WEIGHT: u32 = 20;
pub const SUCCESS_THRESHOLD: u32 = 60;

const LOGIN_PATH_MARKERS: &[&str] = &["login", "signin", "auth", "register", "signup"];

const AUTHENTICATED_PATHS: &[&str] = &[
    "/dashboard",
    "/home",
    "/profile",
    "/account",
    "/app",
    "/my",
    "/portal",
    "/welcome",
];

const SUCCESS_TOKENS: &[&str] = &["token", "authenticated", "success"];

const DOM_INDICATORS: &[&str] = &[
    r#"a[href*="logout"]"#,
    r#"a[href*="signout"]"#,
    r#"a[href*="sign-out"]"#,
    r#"a[href*="log-out"]"#,
    r#"button[id*="logout"]"#,
    r#"[class*="logout"]"#,
    r#"[class*="avatar"]"#,
    r#"[class*="user-menu"]"#,
    r#"[class*="profile"]"#,
    r#"[class*="welcome"]"#,
    r#"[data-testid*="user-menu"]"#,
];

const AUTHENTICATED_KEYWORDS: &[&str] = &["welcome", "dashboard", "signed in", "logged in"];

const LOGIN_FLOW_KEYWORDS: &[&str] = &["login", "password"];

const ERROR_SELECTORS: &[&str] = &[
    r#"[role="alert"]"#,
    ".error",
    ".error-message",
    ".alert-danger",
    ".alert-error",
    ".login-error",
    ".invalid-feedback",
    r#"[aria-invalid="true"]"#,
];

const FAILURE_PHRASES: &[&str] = &[
    "invalid username",
    "invalid password",
    "invalid credentials",
    "invalid email",
    "incorrect username",
    "incorrect password",
    "wrong password",
    "login failed",
    "authentication failed",
    "account locked",
    "please try again",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    UrlChange,
    DomIndicator,
    ContentMatch,
    FormAbsence,
    ErrorAbsence,
}

impl SignalKind {
    /// Contribution to the weighted score; the URL signal is decisive instead.
    pub fn weight(&self) -> u32 {
        match self {
            SignalKind::UrlChange => 0,
            SignalKind::DomIndicator => DOM_INDICATOR_WEIGHT,
            SignalKind::ContentMatch => CONTENT_WEIGHT,
            SignalKind::FormAbsence => FORM_ABSENCE_WEIGHT,
            SignalKind::ErrorAbsence => ERROR_ABSENCE_WEIGHT,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::UrlChange => "url change",
            SignalKind::DomIndicator => "dom indicator",
            SignalKind::ContentMatch => "content match",
            SignalKind::FormAbsence => "form absence",
            SignalKind::ErrorAbsence => "error absence",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationSignal {
    pub kind: SignalKind,
    pub passed: bool,
    pub reason: String,
}

impl VerificationSignal {
    fn new(kind: SignalKind, passed: bool, reason: impl Into<String>) -> Self {
        Self {
            kind,
            passed,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    NotAttempted,
    Submitted,
    VerifiedSuccess,
    VerifiedFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub success: bool,
    pub current_url: Option<String>,
    pub signals: Vec<VerificationSignal>,
    /// Weighted score of the non-URL signals.
    pub score: u32,
}

impl Verdict {
    pub fn signal(&self, kind: SignalKind) -> Option<&VerificationSignal> {
        self.signals.iter().find(|s| s.kind == kind)
    }

    /// Human-readable summary of why the verdict was reached.
    pub fn reason(&self) -> String {
        if self.signal(SignalKind::UrlChange).is_some_and(|s| s.passed) {
            return "URL transition indicates an authenticated page".to_string();
        }
        let failed: Vec<String> = self
            .signals
            .iter()
            .filter(|s| !s.passed)
            .map(|s| format!("{}: {}", s.kind, s.reason))
            .collect();
        format!(
            "weighted score {}/{} (threshold {}); {}",
            self.score,
            DOM_INDICATOR_WEIGHT + FORM_ABSENCE_WEIGHT + CONTENT_WEIGHT + ERROR_ABSENCE_WEIGHT,
            SUCCESS_THRESHOLD,
            failed.join("; ")
        )
    }
}

/// Combine signals into a verdict.
pub fn decide(current_url: Option<String>, signals: Vec<VerificationSignal>) -> Verdict {
    let url_passed = signals
        .iter()
        .any(|s| s.kind == SignalKind::UrlChange && s.passed);
    let score = signals
        .iter()
        .filter(|s| s.passed)
        .map(|s| s.kind.weight())
        .sum();
    Verdict {
        success: url_passed || score >= SUCCESS_THRESHOLD,
        current_url,
        signals,
        score,
    }
}

/// Evaluate the URL transition from `login_url` to `current_url`.
pub fn url_change_signal(
    login_url: &str,
    current_url: &str,
    post_login_url: Option<&str>,
) -> VerificationSignal {
    let kind = SignalKind::UrlChange;
    let (Ok(login), Ok(current)) = (Url::parse(login_url), Url::parse(current_url)) else {
        return VerificationSignal::new(kind, false, format!("unparseable URL '{}'", current_url));
    };

    if login.host_str() != current.host_str() {
        return VerificationSignal::new(
            kind,
            true,
            format!(
                "redirected to another domain ({})",
                current.host_str().unwrap_or_default()
            ),
        );
    }

    if let Some(expected) = post_login_url.filter(|u| !u.is_empty())
        && (current_url == expected || current_url.contains(expected))
    {
        return VerificationSignal::new(kind, true, format!("reached post-login URL {}", expected));
    }

    let path = current.path().to_lowercase();
    let login_path = login.path().to_lowercase();
    if let Some(area) = AUTHENTICATED_PATHS
        .iter()
        .find(|p| path.contains(*p) && !login_path.contains(*p))
    {
        return VerificationSignal::new(kind, true, format!("path contains {}", area));
    }

    if current.path() != login.path() && !LOGIN_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        return VerificationSignal::new(
            kind,
            true,
            format!("left login path {} for {}", login.path(), current.path()),
        );
    }

    let before = format!(
        "{}#{}",
        login.query().unwrap_or_default(),
        login.fragment().unwrap_or_default()
    )
    .to_lowercase();
    let after = format!(
        "{}#{}",
        current.query().unwrap_or_default(),
        current.fragment().unwrap_or_default()
    )
    .to_lowercase();
    if let Some(token) = SUCCESS_TOKENS
        .iter()
        .find(|t| after.contains(*t) && !before.contains(*t))
    {
        return VerificationSignal::new(kind, true, format!("URL gained '{}' token", token));
    }

    VerificationSignal::new(kind, false, format!("still on {}", current.path()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub settle_delay: Duration,
    pub post_login_url: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            post_login_url: None,
        }
    }
}

impl VerifierConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_post_login_url(mut self, url: Option<String>) -> Self {
        self.post_login_url = url;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginVerifier {
    config: VerifierConfig,
}

impl LoginVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Wait out the settle delay, then judge whether the login succeeded.
    pub async fn verify<D: Driver>(&self, driver: &D, login_url: &str) -> Verdict {
        sleep(self.config.settle_delay).await;

        let current_url = match driver.current_url().await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Could not read URL after submit: {}", e);
                None
            }
        };

        let url_signal = match &current_url {
            Some(url) => url_change_signal(login_url, url, self.config.post_login_url.as_deref()),
            None => VerificationSignal::new(SignalKind::UrlChange, false, "current URL unavailable"),
        };

        let signals = vec![
            url_signal,
            self.dom_indicator(driver).await,
            self.content(driver).await,
            self.form_absence(driver).await,
            self.error_absence(driver).await,
        ];
        for signal in &signals {
            debug!(
                "Signal {}: {} ({})",
                signal.kind,
                if signal.passed { "pass" } else { "fail" },
                signal.reason
            );
        }

        let verdict = decide(current_url, signals);
        info!(
            "Login verdict: {} (score {})",
            if verdict.success { "success" } else { "failure" },
            verdict.score
        );
        verdict
    }

    async fn first_visible<D: Driver>(&self, driver: &D, selectors: &[&str]) -> Option<String> {
        for selector in selectors {
            let Ok(elements) = driver.find_elements(selector).await else {
                continue;
            };
            for element in &elements {
                if driver.is_displayed(element).await.unwrap_or(false) {
                    return Some(selector.to_string());
                }
            }
        }
        None
    }

    async fn dom_indicator<D: Driver>(&self, driver: &D) -> VerificationSignal {
        match self.first_visible(driver, DOM_INDICATORS).await {
            Some(selector) => VerificationSignal::new(
                SignalKind::DomIndicator,
                true,
                format!("found {}", selector),
            ),
            None => VerificationSignal::new(
                SignalKind::DomIndicator,
                false,
                "no logout, profile or avatar element",
            ),
        }
    }

    async fn content<D: Driver>(&self, driver: &D) -> VerificationSignal {
        let kind = SignalKind::ContentMatch;
        let title = driver.title().await.unwrap_or_default().to_lowercase();
        let body = match driver.body_text().await {
            Ok(body) => body.to_lowercase(),
            Err(e) => return VerificationSignal::new(kind, false, format!("body unreadable: {}", e)),
        };

        if let Some(keyword) = AUTHENTICATED_KEYWORDS
            .iter()
            .find(|k| title.contains(*k) || body.contains(*k))
        {
            return VerificationSignal::new(kind, true, format!("page mentions '{}'", keyword));
        }
        if !LOGIN_FLOW_KEYWORDS.iter().any(|k| body.contains(k)) {
            return VerificationSignal::new(kind, true, "no login wording left on the page");
        }
        VerificationSignal::new(kind, false, "page still reads like a login form")
    }

    async fn form_absence<D: Driver>(&self, driver: &D) -> VerificationSignal {
        let kind = SignalKind::FormAbsence;
        match self.visible_password_inputs(driver).await {
            Ok(0) => VerificationSignal::new(kind, true, "no password inputs remain"),
            Ok(count) => VerificationSignal::new(kind, false, format!("{} password input(s) remain", count)),
            Err(e) => VerificationSignal::new(kind, false, format!("could not inspect form: {}", e)),
        }
    }

    async fn visible_password_inputs<D: Driver>(&self, driver: &D) -> Result<usize> {
        let mut count = 0;
        for element in driver.find_elements(r#"input[type="password"]"#).await? {
            if driver.is_displayed(&element).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn error_absence<D: Driver>(&self, driver: &D) -> VerificationSignal {
        let kind = SignalKind::ErrorAbsence;
        if let Some(selector) = self.first_visible(driver, ERROR_SELECTORS).await {
            return VerificationSignal::new(kind, false, format!("error element {}", selector));
        }
        let body = driver.body_text().await.unwrap_or_default().to_lowercase();
        if let Some(phrase) = FAILURE_PHRASES.iter().find(|p| body.contains(*p)) {
            return VerificationSignal::new(kind, false, format!("page says '{}'", phrase));
        }
        VerificationSignal::new(kind, true, "no error messages")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureDriver;

    const LOGIN: &str = "https://ex.com/login";

    const LOGIN_FORM: &str = r#"<html><head><title>Sign in</title></head><body>
        <form><label>Email</label><input type="email"><label>Password</label>
        <input type="password"><button type="submit">Login</button></form></body></html>"#;

    fn verifier() -> LoginVerifier {
        LoginVerifier::new(VerifierConfig::default())
    }

    async fn at(url: &str, html: &str) -> FixtureDriver {
        let driver = FixtureDriver::new().with_page(url, html);
        driver.navigate(url).await.unwrap();
        driver
    }

    #[test]
    fn test_cross_domain_redirect_passes() {
        let signal = url_change_signal(LOGIN, "https://sso.ex-idp.com/callback", None);
        assert!(signal.passed);
        assert!(signal.reason.contains("another domain"));
    }

    #[test]
    fn test_post_login_url_match_passes() {
        let signal = url_change_signal(
            LOGIN,
            "https://ex.com/login/complete?next=/",
            Some("https://ex.com/login/complete"),
        );
        assert!(signal.passed);
        assert!(signal.reason.contains("post-login"));
    }

    #[test]
    fn test_authenticated_area_path_passes() {
        let signal = url_change_signal(LOGIN, "https://ex.com/dashboard", None);
        assert!(signal.passed);
        assert_eq!(signal.reason, "path contains /dashboard");
    }

    #[test]
    fn test_leaving_login_path_passes_unless_still_login_flow() {
        assert!(url_change_signal(LOGIN, "https://ex.com/orders", None).passed);
        assert!(!url_change_signal(LOGIN, "https://ex.com/signin/mfa", None).passed);
        assert!(!url_change_signal(LOGIN, "https://ex.com/register", None).passed);
    }

    #[test]
    fn test_success_token_in_fragment_passes() {
        let signal = url_change_signal(LOGIN, "https://ex.com/login#access_token=abc", None);
        assert!(signal.passed);

        let unchanged = url_change_signal(LOGIN, "https://ex.com/login?error=1", None);
        assert!(!unchanged.passed);
    }

    #[test]
    fn test_url_signal_alone_decides_success() {
        let verdict = decide(
            Some("https://other.com/".to_string()),
            vec![
                VerificationSignal::new(SignalKind::UrlChange, true, "redirected"),
                VerificationSignal::new(SignalKind::DomIndicator, false, ""),
                VerificationSignal::new(SignalKind::ContentMatch, false, ""),
                VerificationSignal::new(SignalKind::FormAbsence, false, ""),
                VerificationSignal::new(SignalKind::ErrorAbsence, false, ""),
            ],
        );
        assert!(verdict.success);
        assert_eq!(verdict.score, 0);
    }

    #[test]
    fn test_weighted_threshold() {
        let signals = |dom, form, content, error| {
            vec![
                VerificationSignal::new(SignalKind::UrlChange, false, ""),
                VerificationSignal::new(SignalKind::DomIndicator, dom, ""),
                VerificationSignal::new(SignalKind::FormAbsence, form, ""),
                VerificationSignal::new(SignalKind::ContentMatch, content, ""),
                VerificationSignal::new(SignalKind::ErrorAbsence, error, ""),
            ]
        };
        assert!(!decide(None, signals(true, false, false, true)).success);
        assert!(decide(None, signals(true, true, false, false)).success);
        assert!(decide(None, signals(true, false, true, true)).success);
        assert!(!decide(None, signals(false, false, true, true)).success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_redirect_verifies() {
        let driver = at("https://ex.com/dashboard", "<html><body><p>Hello</p></body></html>").await;

        let verdict = verifier().verify(&driver, LOGIN).await;

        assert!(verdict.success);
        assert_eq!(verdict.current_url.as_deref(), Some("https://ex.com/dashboard"));
        assert!(verdict.signal(SignalKind::UrlChange).unwrap().passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_password_form_fails() {
        let driver = at(LOGIN, LOGIN_FORM).await;

        let verdict = verifier().verify(&driver, LOGIN).await;

        assert!(!verdict.success);
        assert!(!verdict.signal(SignalKind::FormAbsence).unwrap().passed);
        assert!(!verdict.signal(SignalKind::ContentMatch).unwrap().passed);
        assert!(verdict.reason().contains("password input(s) remain"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spa_render_with_avatar_verifies_in_place() {
        let driver = at(
            LOGIN,
            r#"<html><body><nav><img class="user-avatar" src="/me.png"></nav>
               <main><h1>Overview</h1></main></body></html>"#,
        )
        .await;

        let verdict = verifier().verify(&driver, LOGIN).await;

        assert!(verdict.success);
        assert!(!verdict.signal(SignalKind::UrlChange).unwrap().passed);
        assert!(verdict.signal(SignalKind::DomIndicator).unwrap().passed);
        assert!(verdict.signal(SignalKind::FormAbsence).unwrap().passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_avatar_alone_does_not_cross_threshold() {
        let driver = at(
            LOGIN,
            r#"<html><body><span class="user-avatar"></span>
               <form><label>Password</label><input type="password"></form></body></html>"#,
        )
        .await;

        let verdict = verifier().verify(&driver, LOGIN).await;

        assert!(!verdict.success);
        assert_eq!(verdict.score, DOM_INDICATOR_WEIGHT + ERROR_ABSENCE_WEIGHT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_error_message_fails_error_absence() {
        let driver = at(
            LOGIN,
            r#"<html><body><div role="alert">Invalid password</div>
               <form><input type="password"></form></body></html>"#,
        )
        .await;

        let verdict = verifier().verify(&driver, LOGIN).await;

        assert!(!verdict.success);
        let error = verdict.signal(SignalKind::ErrorAbsence).unwrap();
        assert!(!error.passed);
        assert!(error.reason.contains("role=\"alert\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_is_observed() {
        let driver = at("https://ex.com/home", "<html><body></body></html>").await;
        let verifier = LoginVerifier::new(
            VerifierConfig::default().with_settle_delay(Duration::from_secs(5)),
        );
        let start = tokio::time::Instant::now();

        verifier.verify(&driver, LOGIN).await;

        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
