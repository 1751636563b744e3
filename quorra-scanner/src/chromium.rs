//! Chromium backend over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{Driver, ElementSize};
use crate::error::{Result, ScanError};

const IS_DISPLAYED_FN: &str = r#"function() {
    const style = window.getComputedStyle(this);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const rect = this.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}"#;

const IS_ENABLED_FN: &str = "function() { return !this.disabled; }";

const LABEL_TEXT_FN: &str = r#"function() {
    let label = null;
    if (this.id) label = document.querySelector('label[for="' + CSS.escape(this.id) + '"]');
    if (!label) label = this.closest('label');
    return label ? label.innerText.trim() : null;
}"#;

const CLEAR_VALUE_FN: &str = r#"function() {
    this.value = '';
    this.dispatchEvent(new Event('input', { bubbles: true }));
}"#;

/// Launch options for a local browser.
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub args: Vec<String>,
    /// Chrome executable; auto-detected when `None`.
    pub chrome_path: Option<String>,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1366, 900),
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
        }
    }
}

impl ChromiumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headed(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    fn to_browser_config(&self, user_data_dir: PathBuf) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();
        if !self.headless {
            config = config.with_head();
        }
        config = config.window_size(self.window_size.0, self.window_size.1);

        config = config.user_data_dir(user_data_dir);

        for arg in &self.args {
            config = config.arg(arg.clone());
        }
        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }

        config
            .build()
            .map_err(|e| ScanError::DriverConnectionFailed(format!("invalid browser configuration: {}", e)))
    }
}

/// A single-tab Chromium session.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    /// Throwaway profile of a launched browser, removed on close.
    user_data_dir: Option<PathBuf>,
}

impl ChromiumDriver {
    /// Start a local browser.
    pub async fn launch(config: ChromiumConfig) -> Result<Self> {
        debug!("Launching browser with config: {:?}", config);
        // Parallel sessions must not share a profile directory.
        let user_data_dir = std::env::temp_dir().join(format!("quorra-{}", uuid::Uuid::new_v4()));
        let launched = match config.to_browser_config(user_data_dir.clone()) {
            Ok(browser_config) => Browser::launch(browser_config)
                .await
                .map_err(|e| ScanError::DriverConnectionFailed(format!("failed to launch Chrome: {}", e))),
            Err(e) => Err(e),
        };
        let (browser, handler) = match launched {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile(&user_data_dir).await;
                return Err(e);
            }
        };
        match Self::attach(browser, handler).await {
            Ok(mut driver) => {
                driver.user_data_dir = Some(user_data_dir);
                Ok(driver)
            }
            Err(e) => {
                remove_profile(&user_data_dir).await;
                Err(e)
            }
        }
    }

    /// Attach to an already running browser's DevTools websocket.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        info!("Connecting to browser at {}", ws_url);
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| ScanError::DriverConnectionFailed(format!("{}: {}", ws_url, e)))?;
        Self::attach(browser, handler).await
    }

    async fn attach(browser: Browser, mut handler: chromiumoxide::Handler) -> Result<Self> {
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(ScanError::DriverConnectionFailed(format!("could not open a tab: {}", e)));
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
            user_data_dir: None,
        })
    }

    async fn call_fn(&self, element: &Element, function: &str) -> Result<Value> {
        let returns = element.call_js_fn(function, false).await.map_err(stale_or_driver)?;
        Ok(returns.result.value.unwrap_or(Value::Null))
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn remove_profile(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed browser profile {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove browser profile {}: {}", dir.display(), e),
    }
}

/// Lost node references surface as stale handles; everything else is a driver failure.
fn stale_or_driver(e: chromiumoxide::error::CdpError) -> ScanError {
    let message = e.to_string();
    if message.contains("No node with given id")
        || message.contains("Could not find node")
        || message.contains("Cannot find context")
    {
        ScanError::StaleElement
    } else {
        ScanError::Driver(message)
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| ScanError::Driver(format!("navigation to {} failed: {}", url, e)))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| ScanError::Driver(e.to_string()))?
            .ok_or_else(|| ScanError::Driver("page has no URL".to_string()))
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| ScanError::Driver(e.to_string()))?
            .unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScanError::Driver(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ScanError::Script)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| ScanError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Element>> {
        self.page
            .find_elements(selector)
            .await
            .or_else(|e| match e {
                // querySelectorAll on an empty match reports "not found"
                chromiumoxide::error::CdpError::NotFound => Ok(Vec::new()),
                other => Err(ScanError::Driver(format!("selector '{}': {}", selector, other))),
            })
    }

    async fn find_xpath(&self, xpath: &str) -> Result<Vec<Element>> {
        self.page
            .find_xpaths(xpath)
            .await
            .or_else(|e| match e {
                chromiumoxide::error::CdpError::NotFound => Ok(Vec::new()),
                other => Err(ScanError::Driver(format!("xpath '{}': {}", xpath, other))),
            })
    }

    async fn is_displayed(&self, element: &Element) -> Result<bool> {
        Ok(self.call_fn(element, IS_DISPLAYED_FN).await?.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool> {
        Ok(self.call_fn(element, IS_ENABLED_FN).await?.as_bool().unwrap_or(false))
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>> {
        element.attribute(name).await.map_err(stale_or_driver)
    }

    async fn text(&self, element: &Element) -> Result<String> {
        Ok(element
            .inner_text()
            .await
            .map_err(stale_or_driver)?
            .unwrap_or_default())
    }

    async fn size(&self, element: &Element) -> Result<ElementSize> {
        match element.bounding_box().await {
            Ok(bounds) => Ok(ElementSize {
                width: bounds.width,
                height: bounds.height,
            }),
            // Elements without a layout box have no quads.
            Err(chromiumoxide::error::CdpError::NotFound) => Ok(ElementSize::default()),
            Err(e) => Err(stale_or_driver(e)),
        }
    }

    async fn label_text(&self, element: &Element) -> Result<Option<String>> {
        Ok(self
            .call_fn(element, LABEL_TEXT_FN)
            .await?
            .as_str()
            .map(str::to_string)
            .filter(|s| !s.is_empty()))
    }

    async fn clear_and_type(&self, element: &Element, text: &str) -> Result<()> {
        self.call_fn(element, CLEAR_VALUE_FN).await?;
        element.focus().await.map_err(stale_or_driver)?;
        element.type_str(text).await.map_err(stale_or_driver)?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await.map_err(stale_or_driver)?;
        Ok(())
    }

    async fn index_among(&self, element: &Element, selector: &str) -> Result<Option<usize>> {
        let function = format!(
            "function() {{ return Array.prototype.indexOf.call(document.querySelectorAll({}), this); }}",
            serde_json::to_string(selector)?
        );
        let index = self.call_fn(element, &function).await?.as_i64().unwrap_or(-1);
        Ok(usize::try_from(index).ok())
    }

    async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        let _ = self.browser.wait().await;
        if let Some(dir) = self.user_data_dir.take() {
            remove_profile(&dir).await;
        }
        Ok(())
    }
}
