//! Strategy cascade locating login controls on an unknown page.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::driver::Driver;
use crate::error::{Result, ScanError};
use crate::scorer::{self, Candidate};
use crate::strategy::{self, ElementRole};

/// Which tier of the cascade produced an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    UserSelector,
    SmartSelector,
    XPathHeuristic,
    GenericFallback,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionTier::UserSelector => "user selector",
            ResolutionTier::SmartSelector => "smart selector",
            ResolutionTier::XPathHeuristic => "xpath heuristic",
            ResolutionTier::GenericFallback => "generic fallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedElement<E> {
    pub element: E,
    pub tier: ResolutionTier,
    pub selector: String,
    /// Set when the element won a ranked comparison.
    pub score: Option<i32>,
}

/// How an element was validated before acceptance.
#[derive(Debug, Clone, Copy)]
struct Gate {
    visible: bool,
    enabled: bool,
    typed: bool,
}

impl Gate {
    const VISIBLE_ONLY: Gate = Gate {
        visible: true,
        enabled: false,
        typed: false,
    };
    const INTERACTIVE: Gate = Gate {
        visible: true,
        enabled: true,
        typed: true,
    };
}

fn looks_like_xpath(selector: &str) -> bool {
    selector.starts_with('/') || selector.starts_with("(/")
}

pub struct ElementResolver<'d, D: Driver> {
    driver: &'d D,
}

impl<'d, D: Driver> ElementResolver<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        Self { driver }
    }

    /// Locate the control for `role`, trying `user_selectors` first.
    pub async fn resolve(
        &self,
        role: ElementRole,
        user_selectors: &[String],
    ) -> Result<ResolvedElement<D::Element>> {
        let resolved = match self.from_user_selectors(role, user_selectors).await {
            Some(found) => Some(found),
            None => match self.from_smart_selectors(role).await {
                Some(found) => Some(found),
                None => match self.from_xpath_heuristics(role).await {
                    Some(found) => Some(found),
                    None => self.from_generic_fallback(role).await,
                },
            },
        };

        match resolved {
            Some(found) => {
                info!(
                    "Resolved {} via {} '{}'{}",
                    role,
                    found.tier,
                    found.selector,
                    found
                        .score
                        .map(|s| format!(" (score {})", s))
                        .unwrap_or_default()
                );
                Ok(found)
            }
            None => Err(ScanError::ElementNotFound { role }),
        }
    }

    async fn passes(&self, element: &D::Element, role: ElementRole, gate: Gate) -> bool {
        match self.check(element, role, gate).await {
            Ok(valid) => valid,
            Err(e) => {
                debug!("Discarding {} candidate: {}", role, e);
                false
            }
        }
    }

    async fn check(&self, element: &D::Element, role: ElementRole, gate: Gate) -> Result<bool> {
        if gate.visible && !self.driver.is_displayed(element).await? {
            return Ok(false);
        }
        if gate.enabled && !self.driver.is_enabled(element).await? {
            return Ok(false);
        }
        if gate.typed {
            let input_type = self.driver.attribute(element, "type").await?;
            if !role.accepts_input_type(input_type.as_deref()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn lookup(&self, selector: &str, xpath: bool) -> Option<Vec<D::Element>> {
        let found = if xpath {
            self.driver.find_xpath(selector).await
        } else {
            self.driver.find_elements(selector).await
        };
        match found {
            Ok(elements) => Some(elements),
            Err(e) => {
                debug!("Lookup '{}' failed: {}", selector, e);
                None
            }
        }
    }

    async fn first_valid(
        &self,
        role: ElementRole,
        selector: &str,
        xpath: bool,
        gate: Gate,
        tier: ResolutionTier,
    ) -> Option<ResolvedElement<D::Element>> {
        for element in self.lookup(selector, xpath).await? {
            if self.passes(&element, role, gate).await {
                return Some(ResolvedElement {
                    element,
                    tier,
                    selector: selector.to_string(),
                    score: None,
                });
            }
        }
        None
    }

    async fn from_user_selectors(
        &self,
        role: ElementRole,
        selectors: &[String],
    ) -> Option<ResolvedElement<D::Element>> {
        for selector in selectors.iter().filter(|s| !s.trim().is_empty()) {
            let found = self
                .first_valid(
                    role,
                    selector,
                    looks_like_xpath(selector),
                    Gate::VISIBLE_ONLY,
                    ResolutionTier::UserSelector,
                )
                .await;
            if found.is_some() {
                return found;
            }
            debug!("User selector '{}' matched nothing visible", selector);
        }
        None
    }

    async fn from_smart_selectors(&self, role: ElementRole) -> Option<ResolvedElement<D::Element>> {
        let mut best: Option<Candidate<D::Element>> = None;

        for strategy in strategy::smart_selectors(role) {
            let Some(elements) = self.lookup(strategy.selector, false).await else {
                continue;
            };
            let gate = Gate {
                visible: strategy.required_visible,
                enabled: strategy.required_enabled,
                typed: true,
            };
            for element in elements {
                if !self.passes(&element, role, gate).await {
                    continue;
                }
                let score = scorer::score(self.driver, &element, role, strategy.selector).await;
                debug!("{} candidate from '{}' scored {}", role, strategy.selector, score);
                // Strictly greater: earlier strategies win ties.
                if best.as_ref().is_none_or(|b| score > b.score) {
                    best = Some(Candidate {
                        element,
                        score,
                        strategy_label: strategy.selector.to_string(),
                    });
                }
            }
        }

        best.map(|c| ResolvedElement {
            element: c.element,
            tier: ResolutionTier::SmartSelector,
            selector: c.strategy_label,
            score: Some(c.score),
        })
    }

    async fn from_xpath_heuristics(&self, role: ElementRole) -> Option<ResolvedElement<D::Element>> {
        for xpath in strategy::xpath_heuristics(role) {
            let found = self
                .first_valid(role, &xpath, true, Gate::INTERACTIVE, ResolutionTier::XPathHeuristic)
                .await;
            if found.is_some() {
                return found;
            }
        }
        None
    }

    async fn from_generic_fallback(&self, role: ElementRole) -> Option<ResolvedElement<D::Element>> {
        for selector in strategy::generic_fallback(role) {
            let found = self
                .first_valid(role, selector, false, Gate::INTERACTIVE, ResolutionTier::GenericFallback)
                .await;
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureDriver;

    const PAGE: &str = "https://ex.com/login";

    async fn load(driver: FixtureDriver) -> FixtureDriver {
        driver.navigate(PAGE).await.unwrap();
        driver
    }

    async fn page(html: &str) -> FixtureDriver {
        load(FixtureDriver::new().with_page(PAGE, html)).await
    }

    async fn attr(driver: &FixtureDriver, resolved: &ResolvedElement<crate::fixture::FixtureElement>, name: &str) -> Option<String> {
        driver.attribute(&resolved.element, name).await.unwrap()
    }

    #[tokio::test]
    async fn test_email_input_wins_in_smart_tier() {
        let driver = page(
            r#"<form>
                <input type="text" name="search" placeholder="Search">
                <input type="email" name="login_email" id="e">
                <input type="password" name="pw">
            </form>"#,
        )
        .await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Username, &[]).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::SmartSelector);
        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("e"));
        assert!(resolved.score.is_some());
    }

    #[tokio::test]
    async fn test_bare_input_resolves_through_generic_fallback() {
        let driver = page("<form><input></form>").await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Username, &[]).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::GenericFallback);
        assert_eq!(resolved.score, None);
    }

    #[tokio::test]
    async fn test_user_selector_takes_precedence_and_skips_invalid_ones() {
        let driver = page(
            r#"<input type="email" id="primary">
               <input class="custom-login" id="custom">"#,
        )
        .await;
        let resolver = ElementResolver::new(&driver);
        let selectors = vec![
            "input[[broken".to_string(),
            "#does-not-exist".to_string(),
            ".custom-login".to_string(),
        ];

        let resolved = resolver.resolve(ElementRole::Username, &selectors).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::UserSelector);
        assert_eq!(resolved.selector, ".custom-login");
        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn test_user_xpath_selector_is_evaluated_as_xpath() {
        let xpath = "//input[@id='x']";
        let driver = load(
            FixtureDriver::new()
                .with_page(PAGE, r#"<form><input type="email" id="primary"><input id="x" name="acct"></form>"#)
                .with_xpath(xpath, "#x"),
        )
        .await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver
            .resolve(ElementRole::Username, &[xpath.to_string()])
            .await
            .unwrap();

        assert_eq!(resolved.tier, ResolutionTier::UserSelector);
        assert_eq!(resolved.selector, xpath);
        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("x"));
    }

    #[test]
    fn test_looks_like_xpath() {
        assert!(looks_like_xpath("//input[@id='x']"));
        assert!(looks_like_xpath("(//button)[2]"));
        assert!(!looks_like_xpath("#login input[type=email]"));
    }

    #[tokio::test]
    async fn test_user_selector_only_requires_visibility() {
        let driver = page(r#"<input id="locked" disabled><input id="hidden" hidden>"#).await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver
            .resolve(ElementRole::Username, &["#hidden".to_string(), "#locked".to_string()])
            .await
            .unwrap();

        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("locked"));
    }

    #[tokio::test]
    async fn test_smart_tier_skips_hidden_and_mistyped_matches() {
        let driver = page(
            r#"<input type="hidden" name="username" value="x">
               <input type="password" id="user_pass">
               <input type="text" name="user_login" id="real">"#,
        )
        .await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Username, &[]).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::SmartSelector);
        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("real"));
    }

    #[tokio::test]
    async fn test_ranking_prefers_labelled_candidate() {
        let driver = page(
            r#"<input name="username_hint" id="a" data-width="30" data-height="10">
               <label for="b">Username</label>
               <input name="username_field" id="b" placeholder="user">"#,
        )
        .await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Username, &[]).await.unwrap();

        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_xpath_tier_used_when_no_smart_selector_matches() {
        let label_xpath = strategy::xpath_heuristics(ElementRole::Username)[2].clone();
        let driver = load(
            FixtureDriver::new()
                .with_page(
                    PAGE,
                    r#"<form><input type="text" id="nick" name="nick">
                       <label>User ID</label><input type="text" id="f1" name="uid"></form>"#,
                )
                .with_xpath(label_xpath.clone(), "#f1"),
        )
        .await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Username, &[]).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::XPathHeuristic);
        assert_eq!(resolved.selector, label_xpath);
        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_xpath_heuristic_for_submit_button() {
        let log_in_xpath = strategy::xpath_heuristics(ElementRole::Submit)[0].clone();
        let driver = load(
            FixtureDriver::new()
                .with_page(PAGE, r#"<form><input type="email"><a class="btn">Help</a><button id="go">Log in</button></form>"#)
                .with_xpath(log_in_xpath.clone(), "#go"),
        )
        .await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Submit, &[]).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::XPathHeuristic);
        assert_eq!(resolved.selector, log_in_xpath);
    }

    #[tokio::test]
    async fn test_generic_submit_skips_disabled_buttons() {
        let driver = page(r#"<button disabled id="a">Wait</button><button type="button" id="b">Go</button>"#).await;
        let resolver = ElementResolver::new(&driver);

        let resolved = resolver.resolve(ElementRole::Submit, &[]).await.unwrap();

        assert_eq!(resolved.tier, ResolutionTier::GenericFallback);
        assert_eq!(attr(&driver, &resolved, "id").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_role() {
        let driver = page(r#"<input type="email">"#).await;
        let resolver = ElementResolver::new(&driver);

        let err = resolver.resolve(ElementRole::Password, &[]).await.unwrap_err();

        assert!(matches!(err, ScanError::ElementNotFound { role: ElementRole::Password }));
        assert_eq!(err.to_string(), "could not locate the password element on the page");
    }
}
