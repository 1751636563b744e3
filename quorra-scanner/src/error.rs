use thiserror::Error;

use crate::strategy::ElementRole;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Every resolution tier was exhausted for a login control.
    #[error("could not locate the {role} element on the page")]
    ElementNotFound { role: ElementRole },

    /// The credentials were submitted but the verifier did not accept the result.
    #[error("login verification failed at {url}: {reason}")]
    LoginVerificationFailed { url: String, reason: String },

    /// Navigation or analysis failed for a single page.
    #[error("page test failed for {url}: {reason}")]
    PageTestFailed { url: String, reason: String },

    #[error("could not establish a browser session: {0}")]
    DriverConnectionFailed(String),

    /// A single driver primitive failed (lookup, read, interaction).
    #[error("driver error: {0}")]
    Driver(String),

    #[error("element reference is stale")]
    StaleElement,

    #[error("script error: {0}")]
    Script(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
