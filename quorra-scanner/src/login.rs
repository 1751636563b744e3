//! Login orchestration: navigate, fill, submit, verify.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::driver::Driver;
use crate::error::Result;
use crate::resolver::{ElementResolver, ResolutionTier};
use crate::stability::{StabilityConfig, StabilityExpectation, StabilityWaiter};
use crate::strategy::ElementRole;
use crate::verifier::{LoginState, LoginVerifier, VerificationSignal, VerifierConfig};

/// Caller-supplied login parameters, fixed for one attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginConfig {
    pub login_url: String,
    pub username_selector: Option<String>,
    pub password_selector: Option<String>,
    pub submit_selector: Option<String>,
    pub username: String,
    pub password: String,
    pub post_login_url: Option<String>,
}

impl std::fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginConfig")
            .field("login_url", &self.login_url)
            .field("username_selector", &self.username_selector)
            .field("password_selector", &self.password_selector)
            .field("submit_selector", &self.submit_selector)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("post_login_url", &self.post_login_url)
            .finish()
    }
}

impl LoginConfig {
    pub fn new(
        login_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            login_url: login_url.into(),
            username_selector: None,
            password_selector: None,
            submit_selector: None,
            username: username.into(),
            password: password.into(),
            post_login_url: None,
        }
    }

    pub fn with_username_selector(mut self, selector: Option<String>) -> Self {
        self.username_selector = selector;
        self
    }

    pub fn with_password_selector(mut self, selector: Option<String>) -> Self {
        self.password_selector = selector;
        self
    }

    pub fn with_submit_selector(mut self, selector: Option<String>) -> Self {
        self.submit_selector = selector;
        self
    }

    pub fn with_post_login_url(mut self, url: Option<String>) -> Self {
        self.post_login_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    fn selectors_for(&self, role: ElementRole) -> Vec<String> {
        let selector = match role {
            ElementRole::Username => &self.username_selector,
            ElementRole::Password => &self.password_selector,
            ElementRole::Submit => &self.submit_selector,
        };
        selector
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// How one login control was found.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub role: ElementRole,
    pub tier: ResolutionTier,
    pub selector: String,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub current_url: Option<String>,
    pub signals: Vec<VerificationSignal>,
    pub score: u32,
    pub resolutions: Vec<ResolutionReport>,
    /// Why the verifier decided as it did.
    pub reason: String,
}

pub struct LoginOrchestrator {
    config: LoginConfig,
    form_wait: StabilityWaiter,
    verifier: LoginVerifier,
    state: LoginState,
}

impl LoginOrchestrator {
    pub fn new(config: LoginConfig) -> Self {
        let verifier =
            VerifierConfig::default().with_post_login_url(config.post_login_url.clone());
        Self {
            config,
            form_wait: StabilityWaiter::new(
                StabilityConfig::default().with_max_wait(Duration::from_secs(15)),
            ),
            verifier: LoginVerifier::new(verifier),
            state: LoginState::NotAttempted,
        }
    }

    pub fn with_form_wait(mut self, config: StabilityConfig) -> Self {
        self.form_wait = StabilityWaiter::new(config);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        let config = VerifierConfig::default()
            .with_post_login_url(self.config.post_login_url.clone())
            .with_settle_delay(delay);
        self.verifier = LoginVerifier::new(config);
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Perform one login attempt.
    ///
    /// Returns `Ok` with `success == false` when the form was submitted but
    /// not accepted; errors mean the attempt could not be carried out.
    pub async fn login<D: Driver>(&mut self, driver: &D) -> Result<LoginOutcome> {
        self.state = LoginState::NotAttempted;
        info!("Logging in at {}", self.config.login_url);

        driver.navigate(&self.config.login_url).await?;
        if !self
            .form_wait
            .await_stable(driver, StabilityExpectation::LoginForm)
            .await
            .is_stable()
        {
            warn!("Login form did not settle; attempting anyway");
        }

        // The form may live behind a redirect (SSO); judge URL changes from where it rendered.
        let form_url = match driver.current_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not read login form URL: {}", e);
                self.config.login_url.clone()
            }
        };
        if form_url != self.config.login_url {
            info!("Login form rendered at {}", form_url);
        }

        let resolver = ElementResolver::new(driver);
        let mut resolutions = Vec::with_capacity(3);

        let username = resolver
            .resolve(ElementRole::Username, &self.config.selectors_for(ElementRole::Username))
            .await?;
        driver.clear_and_type(&username.element, &self.config.username).await?;
        resolutions.push(ResolutionReport {
            role: ElementRole::Username,
            tier: username.tier,
            selector: username.selector,
            score: username.score,
        });

        let password = resolver
            .resolve(ElementRole::Password, &self.config.selectors_for(ElementRole::Password))
            .await?;
        driver.clear_and_type(&password.element, &self.config.password).await?;
        resolutions.push(ResolutionReport {
            role: ElementRole::Password,
            tier: password.tier,
            selector: password.selector,
            score: password.score,
        });

        let submit = resolver
            .resolve(ElementRole::Submit, &self.config.selectors_for(ElementRole::Submit))
            .await?;
        driver.click(&submit.element).await?;
        resolutions.push(ResolutionReport {
            role: ElementRole::Submit,
            tier: submit.tier,
            selector: submit.selector,
            score: submit.score,
        });
        self.state = LoginState::Submitted;

        let verdict = self.verifier.verify(driver, &form_url).await;
        self.state = if verdict.success {
            LoginState::VerifiedSuccess
        } else {
            LoginState::VerifiedFailure
        };

        let reason = verdict.reason();
        Ok(LoginOutcome {
            success: verdict.success,
            current_url: verdict.current_url,
            signals: verdict.signals,
            score: verdict.score,
            resolutions,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::fixture::FixtureDriver;

    const LOGIN: &str = "https://ex.com/login";

    const FORM: &str = r#"<html><head><title>Sign in</title></head><body>
        <form>
            <label for="email">Email</label><input id="email" type="email" name="email">
            <label for="pw">Password</label><input id="pw" type="password" name="password">
            <button type="submit">Log in</button>
        </form></body></html>"#;

    fn config() -> LoginConfig {
        LoginConfig::new(LOGIN, "ada@ex.com", "hunter2")
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_login_redirects_to_dashboard() {
        let driver = FixtureDriver::new()
            .with_page(LOGIN, FORM)
            .with_page("https://ex.com/dashboard", "<html><body>Welcome back</body></html>")
            .on_submit(LOGIN, "https://ex.com/dashboard")
            .with_credentials("ada@ex.com", "hunter2");
        let mut orchestrator = LoginOrchestrator::new(config());
        assert_eq!(orchestrator.state(), LoginState::NotAttempted);

        let outcome = orchestrator.login(&driver).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.current_url.as_deref(), Some("https://ex.com/dashboard"));
        assert_eq!(orchestrator.state(), LoginState::VerifiedSuccess);
        assert_eq!(outcome.resolutions.len(), 3);
        assert!(
            outcome
                .resolutions
                .iter()
                .all(|r| r.tier == ResolutionTier::SmartSelector)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_credentials_fail_verification() {
        let driver = FixtureDriver::new()
            .with_page(LOGIN, FORM)
            .with_page("https://ex.com/dashboard", "<html><body>Welcome</body></html>")
            .on_submit(LOGIN, "https://ex.com/dashboard")
            .with_credentials("ada@ex.com", "correct horse");
        let mut orchestrator = LoginOrchestrator::new(config());

        let outcome = orchestrator.login(&driver).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.current_url.as_deref(), Some(LOGIN));
        assert_eq!(orchestrator.state(), LoginState::VerifiedFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_credentials_on_redirected_sso_form_fail() {
        let idp = "https://idp.sso-example.com/authorize";
        let driver = FixtureDriver::new()
            .with_redirect(LOGIN, idp)
            .with_page(idp, FORM)
            .with_page("https://ex.com/dashboard", "<html><body>Welcome back</body></html>")
            .on_submit(idp, "https://ex.com/dashboard")
            .with_credentials("ada@ex.com", "hunter2");
        let mut orchestrator =
            LoginOrchestrator::new(LoginConfig::new(LOGIN, "ada@ex.com", "WRONG"));

        let outcome = orchestrator.login(&driver).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.current_url.as_deref(), Some(idp));
        assert_eq!(orchestrator.state(), LoginState::VerifiedFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_credentials_on_redirected_sso_form_succeed() {
        let idp = "https://idp.sso-example.com/authorize";
        let driver = FixtureDriver::new()
            .with_redirect(LOGIN, idp)
            .with_page(idp, FORM)
            .with_page("https://ex.com/dashboard", "<html><body>Welcome back</body></html>")
            .on_submit(idp, "https://ex.com/dashboard")
            .with_credentials("ada@ex.com", "hunter2");
        let mut orchestrator = LoginOrchestrator::new(config());

        let outcome = orchestrator.login(&driver).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.current_url.as_deref(), Some("https://ex.com/dashboard"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_app_login_without_url_change() {
        let driver = FixtureDriver::new()
            .with_page(LOGIN, FORM)
            .on_submit_render(
                LOGIN,
                r#"<html><body><header><a href="/logout">Sign out</a></header>
                   <h1>Your projects</h1></body></html>"#,
            );
        let mut orchestrator = LoginOrchestrator::new(config());

        let outcome = orchestrator.login(&driver).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.current_url.as_deref(), Some(LOGIN));
        assert!(outcome.score >= crate::verifier::SUCCESS_THRESHOLD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_selectors_are_used_first() {
        let driver = FixtureDriver::new()
            .with_page(
                LOGIN,
                r#"<form><input class="acct" name="a"><input class="secret" type="password">
                   <input type="email" name="newsletter"><a class="go">Continue</a>
                   <button class="primary">Go</button></form>"#,
            )
            .with_page("https://ex.com/app", "<html><body></body></html>")
            .on_submit(LOGIN, "https://ex.com/app");
        let mut orchestrator = LoginOrchestrator::new(
            config()
                .with_username_selector(Some(".acct".to_string()))
                .with_password_selector(Some(".secret".to_string()))
                .with_submit_selector(Some(".missing, .primary".to_string())),
        );

        let outcome = orchestrator.login(&driver).await.unwrap();

        assert!(outcome.success);
        assert!(
            outcome
                .resolutions
                .iter()
                .all(|r| r.tier == ResolutionTier::UserSelector)
        );
        assert_eq!(outcome.resolutions[2].selector, ".missing, .primary");
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_values_reach_the_form() {
        let driver = FixtureDriver::new().with_page(LOGIN, FORM);
        let mut orchestrator = LoginOrchestrator::new(config());

        orchestrator.login(&driver).await.unwrap();

        assert_eq!(driver.value_of("#email").as_deref(), Some("ada@ex.com"));
        assert_eq!(driver.value_of("#pw").as_deref(), Some("hunter2"));
        assert_eq!(driver.clicks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_password_field_is_element_not_found() {
        let driver = FixtureDriver::new()
            .with_page(LOGIN, r#"<form><input type="email"><button>Next</button></form>"#);
        let mut orchestrator = LoginOrchestrator::new(config());

        let err = orchestrator.login(&driver).await.unwrap_err();

        assert!(matches!(err, ScanError::ElementNotFound { role: ElementRole::Password }));
        assert_eq!(orchestrator.state(), LoginState::NotAttempted);
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
