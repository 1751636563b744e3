//! Polling wait for a page to reach a stable, testable state.
//!
//! Single-page applications regularly report `readyState == "complete"` before
//! client-side rendering has produced the form, so readiness alone is not
//! enough: the structural signature of the DOM has to stop changing too.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::driver::Driver;

/// Elements whose class suggests a loading state.
pub const LOADING_INDICATOR_SELECTOR: &str =
    r#"[class*="loading"], [class*="spinner"], [class*="loader"], [aria-busy="true"]"#;

pub const DOM_SIGNATURE_SCRIPT: &str = r#"(() => {
    const count = (s) => document.querySelectorAll(s).length;
    const loading = Array.from(document.querySelectorAll('[class*="loading"], [class*="spinner"], [class*="loader"], [aria-busy="true"]'))
        .filter((el) => el.offsetParent !== null).length;
    return {
        forms: count('form'),
        inputs: count('input'),
        formInputs: count('form input'),
        buttons: count('button'),
        images: count('img'),
        links: count('a'),
        containers: count('div'),
        readyState: document.readyState,
        loadingIndicators: loading,
    };
})()"#;

/// Composite structural snapshot of the current document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSignature {
    pub forms: usize,
    pub inputs: usize,
    pub form_inputs: usize,
    pub buttons: usize,
    pub images: usize,
    pub links: usize,
    pub containers: usize,
    pub ready_state: String,
    pub loading_indicators: usize,
}

impl DomSignature {
    fn counts(&self) -> [usize; 7] {
        [
            self.forms,
            self.inputs,
            self.form_inputs,
            self.buttons,
            self.images,
            self.links,
            self.containers,
        ]
    }

    fn is_settled(&self, expectation: StabilityExpectation) -> bool {
        let base = self.ready_state == "complete" && self.loading_indicators == 0;
        match expectation {
            StabilityExpectation::AnyContent => base,
            StabilityExpectation::LoginForm => base && self.forms > 0 && self.form_inputs > 0,
        }
    }
}

/// What the caller needs the page to contain before it counts as stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityExpectation {
    AnyContent,
    /// At least one `<form>` holding at least one input.
    LoginForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
    pub max_wait: Duration,
    pub check_interval: Duration,
    pub required_stable: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            check_interval: Duration::from_millis(250),
            required_stable: Duration::from_millis(750),
        }
    }
}

impl StabilityConfig {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_required_stable(mut self, window: Duration) -> Self {
        self.required_stable = window;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityOutcome {
    Stable { elapsed: Duration },
    /// The deadline passed; the caller proceeds against the page as it is.
    TimedOut {
        elapsed: Duration,
        last: Option<DomSignature>,
    },
}

impl StabilityOutcome {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityOutcome::Stable { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StabilityWaiter {
    config: StabilityConfig,
}

impl StabilityWaiter {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Poll until the page is stable or the deadline passes. Never fails.
    pub async fn await_stable<D: Driver>(
        &self,
        driver: &D,
        expectation: StabilityExpectation,
    ) -> StabilityOutcome {
        let start = Instant::now();
        let mut last: Option<DomSignature> = None;
        let mut stable_since: Option<Instant> = None;

        loop {
            let now = Instant::now();
            match driver.dom_signature().await {
                Ok(signature) => {
                    let settled = signature.is_settled(expectation);
                    let unchanged = last
                        .as_ref()
                        .is_some_and(|previous| previous.counts() == signature.counts());

                    if settled && unchanged {
                        let since = *stable_since.get_or_insert(now);
                        if now.duration_since(since) >= self.config.required_stable {
                            debug!("Page stable after {:?}", start.elapsed());
                            return StabilityOutcome::Stable {
                                elapsed: start.elapsed(),
                            };
                        }
                    } else if settled {
                        stable_since = Some(now);
                    } else {
                        stable_since = None;
                    }
                    last = Some(signature);
                }
                Err(e) => {
                    debug!("DOM signature unavailable: {}", e);
                    stable_since = None;
                    last = None;
                }
            }

            if start.elapsed() >= self.config.max_wait {
                warn!(
                    "Page did not stabilise within {:?} ({:?}); continuing",
                    self.config.max_wait, expectation
                );
                return StabilityOutcome::TimedOut {
                    elapsed: start.elapsed(),
                    last,
                };
            }

            sleep(self.config.check_interval).await;
        }
    }
}
