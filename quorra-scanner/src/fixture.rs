//! In-memory driver and analyzer backed by static HTML.
//!
//! `FixtureDriver` parses pages with `scraper` and answers the [`Driver`]
//! primitives from the parsed tree, so resolution, verification and crawling
//! can be exercised against DOM fixtures without a browser.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::analyzer::Analyzer;
use crate::driver::{BODY_TEXT_SCRIPT, Driver, ElementSize};
use crate::error::{Result, ScanError};
use crate::result::{AnalysisResults, RuleResult};
use crate::stability::{DOM_SIGNATURE_SCRIPT, DomSignature, LOADING_INDICATOR_SELECTOR};
use crate::strategy::ElementRole;

/// Handle to an element of one loaded fixture document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureElement {
    epoch: u64,
    index: usize,
}

#[derive(Debug, Clone)]
enum SubmitTarget {
    Navigate(String),
    Render(String),
}

#[derive(Debug)]
struct Document {
    url: String,
    html: String,
    epoch: u64,
    values: HashMap<usize, String>,
    signatures: VecDeque<DomSignature>,
}

#[derive(Debug, Default)]
struct FixtureState {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    failing: HashSet<String>,
    signatures: HashMap<String, Vec<DomSignature>>,
    xpaths: HashMap<String, String>,
    routes: HashMap<String, SubmitTarget>,
    credentials: Option<(String, String)>,
    current: Option<Document>,
    epoch: u64,
    navigations: Vec<String>,
    clicks: usize,
}

#[derive(Debug, Default)]
pub struct FixtureDriver {
    state: Mutex<FixtureState>,
    closed: Arc<AtomicBool>,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScanError::Driver(format!("invalid selector '{}': {:?}", selector, e)))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn style_hides(style: &str) -> bool {
    let style = style.to_ascii_lowercase().replace(' ', "");
    style.contains("display:none") || style.contains("visibility:hidden")
}

fn hides_itself(element: &scraper::node::Element) -> bool {
    element.attr("hidden").is_some()
        || element.attr("style").is_some_and(style_hides)
        || matches!(element.name(), "script" | "style" | "template")
}

fn is_visible(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if value.name() == "input"
        && value
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
    {
        return false;
    }
    !hides_itself(value)
        && element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .all(|ancestor| !hides_itself(ancestor.value()))
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let shown = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|a| a.id() != element.id())
                .all(|a| !hides_itself(a.value()));
            if shown {
                parts.push(text.to_string());
            }
        }
    }
    normalize_whitespace(&parts.join(" "))
}

fn is_submit_control(element: &scraper::node::Element) -> bool {
    let input_type = element.attr("type").map(|t| t.to_ascii_lowercase());
    match element.name() {
        "button" => matches!(input_type.as_deref(), None | Some("submit")),
        "input" => matches!(input_type.as_deref(), Some("submit") | Some("image")),
        _ => false,
    }
}

impl Document {
    fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    fn select(&self, selector: &str) -> Result<Vec<FixtureElement>> {
        let selector = parse_selector(selector)?;
        let all = parse_selector("*")?;
        let html = self.parse();
        let order: Vec<_> = html.select(&all).map(|e| e.id()).collect();
        Ok(html
            .select(&selector)
            .filter_map(|e| order.iter().position(|id| *id == e.id()))
            .map(|index| FixtureElement {
                epoch: self.epoch,
                index,
            })
            .collect())
    }

    /// Run `f` against the element behind `handle`.
    fn with_element<T>(
        &self,
        handle: &FixtureElement,
        f: impl for<'h> FnOnce(ElementRef<'h>, &'h Html) -> Result<T>,
    ) -> Result<T> {
        if handle.epoch != self.epoch {
            return Err(ScanError::StaleElement);
        }
        let html = self.parse();
        let all = parse_selector("*")?;
        let element = html
            .select(&all)
            .nth(handle.index)
            .ok_or(ScanError::StaleElement)?;
        f(element, &html)
    }

    fn title(&self) -> Result<String> {
        let html = self.parse();
        let selector = parse_selector("title")?;
        Ok(html
            .select(&selector)
            .next()
            .map(|t| normalize_whitespace(&t.text().collect::<String>()))
            .unwrap_or_default())
    }

    fn body_text(&self) -> Result<String> {
        let html = self.parse();
        let selector = parse_selector("body")?;
        Ok(html
            .select(&selector)
            .next()
            .map(visible_text)
            .unwrap_or_default())
    }

    fn signature(&mut self) -> Result<DomSignature> {
        if self.signatures.len() > 1 {
            if let Some(next) = self.signatures.pop_front() {
                return Ok(next);
            }
        }
        if let Some(last) = self.signatures.front() {
            return Ok(last.clone());
        }

        let html = self.parse();
        let count = |selector: &str| -> Result<usize> {
            Ok(html.select(&parse_selector(selector)?).count())
        };
        let loading = parse_selector(LOADING_INDICATOR_SELECTOR)?;
        Ok(DomSignature {
            forms: count("form")?,
            inputs: count("input")?,
            form_inputs: count("form input")?,
            buttons: count("button")?,
            images: count("img")?,
            links: count("a")?,
            containers: count("div")?,
            ready_state: "complete".to_string(),
            loading_indicators: html.select(&loading).filter(|e| is_visible(*e)).count(),
        })
    }

    /// First non-empty typed value among inputs accepted by `role`.
    fn typed_value_for(&self, role: ElementRole) -> Result<Option<String>> {
        let html = self.parse();
        let all = parse_selector("*")?;
        Ok(html
            .select(&all)
            .enumerate()
            .filter(|(_, e)| e.value().name() == "input")
            .filter(|(_, e)| role.accepts_input_type(e.value().attr("type")))
            .find_map(|(index, _)| self.values.get(&index).filter(|v| !v.is_empty()).cloned()))
    }
}

impl FixtureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&mut self) -> &mut FixtureState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.state_mut().pages.insert(url.into(), html.into());
        self
    }

    /// Navigating to `from` lands on `to`.
    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.state_mut().redirects.insert(from.into(), to.into());
        self
    }

    pub fn with_failing_page(mut self, url: impl Into<String>) -> Self {
        self.state_mut().failing.insert(url.into());
        self
    }

    /// DOM signatures returned in order after navigating to `url`; the last repeats.
    pub fn with_signatures(mut self, url: impl Into<String>, signatures: Vec<DomSignature>) -> Self {
        self.state_mut().signatures.insert(url.into(), signatures);
        self
    }

    /// Answer `xpath` with the elements matching `css`.
    pub fn with_xpath(mut self, xpath: impl Into<String>, css: impl Into<String>) -> Self {
        self.state_mut().xpaths.insert(xpath.into(), css.into());
        self
    }

    /// Clicking a submit control on `from` navigates to `to`.
    pub fn on_submit(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.state_mut()
            .routes
            .insert(from.into(), SubmitTarget::Navigate(to.into()));
        self
    }

    /// Clicking a submit control on `from` re-renders it in place with `html`.
    pub fn on_submit_render(mut self, from: impl Into<String>, html: impl Into<String>) -> Self {
        self.state_mut()
            .routes
            .insert(from.into(), SubmitTarget::Render(html.into()));
        self
    }

    /// Submit routes only fire when these credentials were typed; otherwise the page reloads.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.state_mut().credentials = Some((username.into(), password.into()));
        self
    }

    /// URLs passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn clicks(&self) -> usize {
        self.lock().clicks
    }

    /// Set once `close` has run; readable after the driver is consumed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    /// Typed value of the first element matching `css` in the current document.
    pub fn value_of(&self, css: &str) -> Option<String> {
        let state = self.lock();
        let document = state.current.as_ref()?;
        let handle = document.select(css).ok()?.into_iter().next()?;
        document.values.get(&handle.index).cloned()
    }

    fn load(state: &mut FixtureState, url: &str) -> Result<()> {
        if state.failing.contains(url) {
            return Err(ScanError::Driver(format!(
                "net::ERR_CONNECTION_REFUSED at {}",
                url
            )));
        }
        let target = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        let html = state
            .pages
            .get(&target)
            .cloned()
            .ok_or_else(|| ScanError::Driver(format!("net::ERR_NAME_NOT_RESOLVED at {}", target)))?;

        state.epoch += 1;
        state.navigations.push(url.to_string());
        state.current = Some(Document {
            signatures: state
                .signatures
                .get(&target)
                .cloned()
                .unwrap_or_default()
                .into(),
            url: target,
            html,
            epoch: state.epoch,
            values: HashMap::new(),
        });
        Ok(())
    }

    fn render(state: &mut FixtureState, html: String) {
        state.epoch += 1;
        if let Some(document) = state.current.as_mut() {
            document.html = html;
            document.epoch = state.epoch;
            document.values.clear();
            document.signatures.clear();
        }
    }

    fn submit(state: &mut FixtureState) -> Result<()> {
        let Some(document) = state.current.as_ref() else {
            return Ok(());
        };
        let from = document.url.clone();
        let Some(target) = state.routes.get(&from).cloned() else {
            return Ok(());
        };

        if let Some((username, password)) = state.credentials.clone() {
            let typed_user = document.typed_value_for(ElementRole::Username)?;
            let typed_pass = document.typed_value_for(ElementRole::Password)?;
            if typed_user.as_deref() != Some(username.as_str())
                || typed_pass.as_deref() != Some(password.as_str())
            {
                return Self::load(state, &from);
            }
        }

        match target {
            SubmitTarget::Navigate(to) => Self::load(state, &to),
            SubmitTarget::Render(html) => {
                Self::render(state, html);
                Ok(())
            }
        }
    }
}

impl FixtureState {
    fn document(&self) -> Result<&Document> {
        self.current
            .as_ref()
            .ok_or_else(|| ScanError::Driver("no document loaded".to_string()))
    }
}

#[async_trait]
impl Driver for FixtureDriver {
    type Element = FixtureElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        Self::load(&mut self.lock(), url)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().document()?.url.clone())
    }

    async fn title(&self) -> Result<String> {
        self.lock().document()?.title()
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.lock().document()?.html.clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let mut state = self.lock();
        let document = state
            .current
            .as_mut()
            .ok_or_else(|| ScanError::Driver("no document loaded".to_string()))?;

        if script == DOM_SIGNATURE_SCRIPT {
            Ok(serde_json::to_value(document.signature()?)?)
        } else if script == BODY_TEXT_SCRIPT {
            Ok(Value::String(document.body_text()?))
        } else if script == "document.title" {
            Ok(Value::String(document.title()?))
        } else {
            Err(ScanError::Script(format!(
                "fixture cannot evaluate: {}",
                script.chars().take(60).collect::<String>()
            )))
        }
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<FixtureElement>> {
        self.lock().document()?.select(selector)
    }

    async fn find_xpath(&self, xpath: &str) -> Result<Vec<FixtureElement>> {
        let state = self.lock();
        let css = state
            .xpaths
            .get(xpath)
            .ok_or_else(|| ScanError::Driver(format!("unsupported xpath: {}", xpath)))?;
        state.document()?.select(css)
    }

    async fn is_displayed(&self, element: &FixtureElement) -> Result<bool> {
        self.lock()
            .document()?
            .with_element(element, |e, _| Ok(is_visible(e)))
    }

    async fn is_enabled(&self, element: &FixtureElement) -> Result<bool> {
        self.lock()
            .document()?
            .with_element(element, |e, _| Ok(e.value().attr("disabled").is_none()))
    }

    async fn attribute(&self, element: &FixtureElement, name: &str) -> Result<Option<String>> {
        let state = self.lock();
        let document = state.document()?;
        if name == "value" {
            if element.epoch == document.epoch {
                if let Some(typed) = document.values.get(&element.index) {
                    return Ok(Some(typed.clone()));
                }
            }
        }
        document.with_element(element, |e, _| Ok(e.value().attr(name).map(str::to_string)))
    }

    async fn text(&self, element: &FixtureElement) -> Result<String> {
        self.lock()
            .document()?
            .with_element(element, |e, _| Ok(visible_text(e)))
    }

    async fn size(&self, element: &FixtureElement) -> Result<ElementSize> {
        self.lock().document()?.with_element(element, |e, _| {
            if !is_visible(e) {
                return Ok(ElementSize::default());
            }
            let dimension = |name: &str, default: f64| {
                e.value()
                    .attr(name)
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(default)
            };
            Ok(ElementSize {
                width: dimension("data-width", 200.0),
                height: dimension("data-height", 30.0),
            })
        })
    }

    async fn label_text(&self, element: &FixtureElement) -> Result<Option<String>> {
        self.lock().document()?.with_element(element, |e, html| {
            let labels = parse_selector("label")?;
            let by_for = e.value().id().and_then(|id| {
                html.select(&labels)
                    .find(|label| label.value().attr("for") == Some(id))
            });
            let label = by_for.or_else(|| {
                e.ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|a| a.value().name() == "label")
            });
            Ok(label
                .map(|l| normalize_whitespace(&l.text().collect::<String>()))
                .filter(|t| !t.is_empty()))
        })
    }

    async fn clear_and_type(&self, element: &FixtureElement, text: &str) -> Result<()> {
        let mut state = self.lock();
        let document = state
            .current
            .as_mut()
            .ok_or_else(|| ScanError::Driver("no document loaded".to_string()))?;
        document.with_element(element, |_, _| Ok(()))?;
        document.values.insert(element.index, text.to_string());
        Ok(())
    }

    async fn click(&self, element: &FixtureElement) -> Result<()> {
        let mut state = self.lock();
        let submits = state
            .document()?
            .with_element(element, |e, _| Ok(is_submit_control(e.value())))?;
        state.clicks += 1;
        if submits {
            Self::submit(&mut state)?;
        }
        Ok(())
    }

    async fn index_among(&self, element: &FixtureElement, selector: &str) -> Result<Option<usize>> {
        let state = self.lock();
        let document = state.document()?;
        if element.epoch != document.epoch {
            return Err(ScanError::StaleElement);
        }
        Ok(document
            .select(selector)?
            .iter()
            .position(|candidate| candidate.index == element.index))
    }

    async fn close(self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Analyzer returning canned results per URL.
#[derive(Debug)]
pub struct FixtureAnalyzer {
    results: HashMap<String, AnalysisResults>,
    failing: HashSet<String>,
    default: AnalysisResults,
    analyzed: Mutex<Vec<String>>,
}

impl Default for FixtureAnalyzer {
    fn default() -> Self {
        Self {
            results: HashMap::new(),
            failing: HashSet::new(),
            default: AnalysisResults {
                passes: vec![RuleResult::new("document-title")],
                ..AnalysisResults::default()
            },
            analyzed: Mutex::new(Vec::new()),
        }
    }
}

impl FixtureAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, url: impl Into<String>, results: AnalysisResults) -> Self {
        self.results.insert(url.into(), results);
        self
    }

    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// URLs analyzed so far, in order.
    pub fn analyzed(&self) -> Vec<String> {
        self.analyzed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Analyzer for FixtureAnalyzer {
    async fn analyze<D: Driver>(&self, driver: &D) -> Result<AnalysisResults> {
        let url = driver.current_url().await?;
        self.analyzed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.clone());

        if self.failing.contains(&url) {
            return Err(ScanError::Script(format!("axe.run rejected on {}", url)));
        }
        Ok(self.results.get(&url).cloned().unwrap_or_else(|| self.default.clone()))
    }
}
