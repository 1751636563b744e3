//! Confidence scoring for login control candidates.

use tracing::debug;

use crate::driver::Driver;
use crate::error::Result;
use crate::strategy::ElementRole;

pub const BASE_MATCH: i32 = 10;
pub const SELECTOR_TYPE: i32 = 20;
pub const SELECTOR_NAME: i32 = 15;
pub const SELECTOR_ID: i32 = 15;
pub const POSITION: i32 = 10;
pub const LABEL_KEYWORD: i32 = 10;
pub const LABEL_PRESENT: i32 = 5;
pub const PLACEHOLDER_KEYWORD: i32 = 10;
pub const PLACEHOLDER_PRESENT: i32 = 5;
pub const PLAUSIBLE_SIZE: i32 = 5;
/// Score given to a candidate whose inspection failed.
pub const FALLBACK_SCORE: i32 = 1;

/// Only the first few controls of a role's kind on the page earn the position bonus.
const POSITION_WINDOW: usize = 2;

/// A ranked element, alive only for one resolution pass.
#[derive(Debug, Clone)]
pub struct Candidate<E> {
    pub element: E,
    pub score: i32,
    pub strategy_label: String,
}

fn mentions_keyword(text: &str, role: ElementRole) -> bool {
    let text = text.to_lowercase();
    role.keywords().iter().any(|k| text.contains(k))
}

/// Bonus earned by the selector string alone.
pub fn selector_bonus(selector: &str) -> i32 {
    let mut bonus = 0;
    if selector.contains("type=") {
        bonus += SELECTOR_TYPE;
    }
    if selector.contains("[name") {
        bonus += SELECTOR_NAME;
    }
    if selector.contains("[id") || selector.contains('#') {
        bonus += SELECTOR_ID;
    }
    bonus
}

/// Score `element` for `role`. Inspection failures yield [`FALLBACK_SCORE`].
pub async fn score<D: Driver>(driver: &D, element: &D::Element, role: ElementRole, selector: &str) -> i32 {
    match inspect(driver, element, role, selector).await {
        Ok(score) => score,
        Err(e) => {
            debug!("Scoring {} candidate from '{}' failed: {}", role, selector, e);
            FALLBACK_SCORE
        }
    }
}

async fn inspect<D: Driver>(
    driver: &D,
    element: &D::Element,
    role: ElementRole,
    selector: &str,
) -> Result<i32> {
    let mut score = BASE_MATCH + selector_bonus(selector);

    if driver
        .index_among(element, role.kind_selector())
        .await?
        .is_some_and(|position| position < POSITION_WINDOW)
    {
        score += POSITION;
    }

    let mut label = driver.label_text(element).await?;
    if role == ElementRole::Submit && label.is_none() {
        let text = driver.text(element).await?;
        label = if text.trim().is_empty() {
            driver.attribute(element, "value").await?
        } else {
            Some(text)
        };
    }
    if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
        score += LABEL_PRESENT;
        if mentions_keyword(&label, role) {
            score += LABEL_KEYWORD;
        }
    }

    if let Some(placeholder) = driver
        .attribute(element, "placeholder")
        .await?
        .filter(|p| !p.trim().is_empty())
    {
        score += PLACEHOLDER_PRESENT;
        if mentions_keyword(&placeholder, role) {
            score += PLACEHOLDER_KEYWORD;
        }
    }

    let size = driver.size(element).await?;
    if size.width > 50.0 && size.height > 20.0 {
        score += PLAUSIBLE_SIZE;
    }

    Ok(score)
}
