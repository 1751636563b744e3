//! The browser capability consumed by the scanner.
//!
//! Everything above this trait (resolution, verification, crawling) is written
//! against [`Driver`] only, so a local Chromium, a remote DevTools endpoint and
//! the in-memory fixture are interchangeable backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScanError};
use crate::stability::{DOM_SIGNATURE_SCRIPT, DomSignature};

/// Rendered size of an element in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementSize {
    pub width: f64,
    pub height: f64,
}

/// Script returning the visible text of the document body.
pub const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// A single-document browser session.
///
/// Element handles are borrowed from the driver: they are only meaningful
/// while the document they were found in is loaded, and any method taking one
/// may fail with [`ScanError::StaleElement`] after navigation.
#[async_trait]
pub trait Driver: Send + Sync {
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Serialized HTML of the current document.
    async fn page_source(&self) -> Result<String>;

    /// Evaluate a script expression in the page, awaiting promises.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element>>;

    async fn find_xpath(&self, xpath: &str) -> Result<Vec<Self::Element>>;

    async fn is_displayed(&self, element: &Self::Element) -> Result<bool>;

    async fn is_enabled(&self, element: &Self::Element) -> Result<bool>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    async fn text(&self, element: &Self::Element) -> Result<String>;

    async fn size(&self, element: &Self::Element) -> Result<ElementSize>;

    /// Text of the `<label>` associated with the element, by `for`/id pairing
    /// or by wrapping.
    async fn label_text(&self, element: &Self::Element) -> Result<Option<String>>;

    /// Replace the element's current value with `text`.
    async fn clear_and_type(&self, element: &Self::Element, text: &str) -> Result<()>;

    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Position of `element` among the document's matches for `selector`.
    async fn index_among(&self, element: &Self::Element, selector: &str) -> Result<Option<usize>>;

    async fn body_text(&self) -> Result<String> {
        match self.evaluate(BODY_TEXT_SCRIPT).await? {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            other => Err(ScanError::Script(format!(
                "expected body text, got {}",
                other
            ))),
        }
    }

    /// Structural metrics used by the stability waiter.
    async fn dom_signature(&self) -> Result<DomSignature> {
        let value = self.evaluate(DOM_SIGNATURE_SCRIPT).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// End the session and release whatever the backend holds.
    async fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}
