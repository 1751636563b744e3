use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::driver::Driver;
use crate::error::{Result, ScanError};
use crate::result::AnalysisResults;

pub const DEFAULT_AXE_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.10.2/axe.min.js";

pub const DEFAULT_TAGS: &[&str] = &["wcag2a", "wcag2aa", "wcag21a", "wcag21aa", "best-practice"];

const AXE_PRESENT_SCRIPT: &str = "typeof axe !== 'undefined'";

/// Runs accessibility rules against the document currently loaded in a driver.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze<D: Driver>(&self, driver: &D) -> Result<AnalysisResults>;
}

/// axe-core injected into the page and run through `axe.run`.
#[derive(Debug, Clone)]
pub struct AxeAnalyzer {
    source: Arc<String>,
    tags: Vec<String>,
}

impl AxeAnalyzer {
    pub fn from_source(source: String) -> Self {
        Self {
            source: Arc::new(source),
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(Self::from_source(source))
    }

    /// Restrict the run to rules carrying these tags; empty runs every rule.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    fn run_script(&self) -> String {
        let options = if self.tags.is_empty() {
            json!({})
        } else {
            json!({ "runOnly": { "type": "tag", "values": self.tags } })
        };
        format!(
            "(async () => {{ const r = await axe.run(document, {}); \
             return {{ violations: r.violations, passes: r.passes, incomplete: r.incomplete }}; }})()",
            options
        )
    }
}

#[async_trait]
impl Analyzer for AxeAnalyzer {
    async fn analyze<D: Driver>(&self, driver: &D) -> Result<AnalysisResults> {
        let present = driver.evaluate(AXE_PRESENT_SCRIPT).await?;
        if present != Value::Bool(true) {
            debug!("Injecting axe-core ({} bytes)", self.source.len());
            driver.evaluate(&format!("{};\ntrue", self.source)).await?;
        }

        let value = driver.evaluate(&self.run_script()).await?;
        if value.is_null() {
            return Err(ScanError::Script("axe.run returned no results".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Download the axe-core bundle.
pub async fn fetch_axe_source(url: &str) -> Result<String> {
    let client = Client::builder()
        .user_agent("Quorra/0.1 (https://github.com/trapdoorsec/quorra)")
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;

    info!("Fetching axe-core from {}", url);
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScanError::Other(format!(
            "HTTP {} while fetching axe-core from {}",
            status, url
        )));
    }

    let source = response.text().await?;
    if !source.contains("axe") {
        return Err(ScanError::Other(format!(
            "response from {} does not look like axe-core",
            url
        )));
    }
    Ok(source)
}
