//! Static detection strategies for login controls.
//!
//! Each tier of the resolution cascade is a pure function from an
//! [`ElementRole`] to an ordered candidate list, so every tier can be checked
//! against a DOM fixture on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The login control being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementRole {
    Username,
    Password,
    Submit,
}

impl ElementRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementRole::Username => "username",
            ElementRole::Password => "password",
            ElementRole::Submit => "submit",
        }
    }

    /// Every control of this role's kind on a page, in document order.
    pub fn kind_selector(&self) -> &'static str {
        match self {
            ElementRole::Username => {
                r#"input:not([type]), input[type="text"], input[type="email"], input[type="tel"]"#
            }
            ElementRole::Password => r#"input[type="password"]"#,
            ElementRole::Submit => {
                r#"button, input[type="submit"], input[type="button"], input[type="image"]"#
            }
        }
    }

    /// Keywords that hint at this role in label, placeholder or button text.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            ElementRole::Username => &["user", "email"],
            ElementRole::Password => &["pass"],
            ElementRole::Submit => &["login", "log in", "sign"],
        }
    }

    /// Whether an `<input>` of the given `type` can play this role.
    ///
    /// Broad selectors such as `input[id*="user"]` also match hidden inputs or
    /// the password box, so the resolver filters on the declared type.
    pub fn accepts_input_type(&self, input_type: Option<&str>) -> bool {
        let input_type = input_type.map(|t| t.trim().to_ascii_lowercase());
        match (self, input_type.as_deref()) {
            (ElementRole::Username, None | Some("") | Some("text") | Some("email") | Some("tel")) => {
                true
            }
            (ElementRole::Username, _) => false,
            (ElementRole::Password, Some("password")) => true,
            (ElementRole::Password, _) => false,
            (ElementRole::Submit, None | Some("") | Some("submit") | Some("button") | Some("image")) => {
                true
            }
            (ElementRole::Submit, _) => false,
        }
    }
}

impl fmt::Display for ElementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CSS selector together with its validation requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorStrategy {
    pub selector: &'static str,
    pub required_visible: bool,
    pub required_enabled: bool,
}

impl SelectorStrategy {
    const fn interactive(selector: &'static str) -> Self {
        Self {
            selector,
            required_visible: true,
            required_enabled: true,
        }
    }
}

const USERNAME_SMART: &[SelectorStrategy] = &[
    // type / autocomplete
    SelectorStrategy::interactive(r#"input[type="email"]"#),
    SelectorStrategy::interactive(r#"input[autocomplete="username"]"#),
    SelectorStrategy::interactive(r#"input[autocomplete="email"]"#),
    // exact name / id
    SelectorStrategy::interactive(r#"input[name="username"]"#),
    SelectorStrategy::interactive(r#"input[name="email"]"#),
    SelectorStrategy::interactive(r#"input[name="user"]"#),
    SelectorStrategy::interactive(r#"input[name="login"]"#),
    SelectorStrategy::interactive(r#"input[id="username"]"#),
    SelectorStrategy::interactive(r#"input[id="email"]"#),
    SelectorStrategy::interactive(r#"input[id="user"]"#),
    SelectorStrategy::interactive(r#"input[id="login"]"#),
    // substring name / id
    SelectorStrategy::interactive(r#"input[name*="user"]"#),
    SelectorStrategy::interactive(r#"input[name*="email"]"#),
    SelectorStrategy::interactive(r#"input[name*="login"]"#),
    SelectorStrategy::interactive(r#"input[id*="user"]"#),
    SelectorStrategy::interactive(r#"input[id*="email"]"#),
    SelectorStrategy::interactive(r#"input[id*="login"]"#),
    // placeholder
    SelectorStrategy::interactive(r#"input[placeholder*="user"]"#),
    SelectorStrategy::interactive(r#"input[placeholder*="User"]"#),
    SelectorStrategy::interactive(r#"input[placeholder*="email"]"#),
    SelectorStrategy::interactive(r#"input[placeholder*="Email"]"#),
];

const PASSWORD_SMART: &[SelectorStrategy] = &[
    SelectorStrategy::interactive(r#"input[type="password"]"#),
    SelectorStrategy::interactive(r#"input[autocomplete="current-password"]"#),
    SelectorStrategy::interactive(r#"input[name="password"]"#),
    SelectorStrategy::interactive(r#"input[id="password"]"#),
    SelectorStrategy::interactive(r#"input[name*="pass"]"#),
    SelectorStrategy::interactive(r#"input[id*="pass"]"#),
    SelectorStrategy::interactive(r#"input[placeholder*="assword"]"#),
];

const SUBMIT_SMART: &[SelectorStrategy] = &[
    SelectorStrategy::interactive(r#"button[type="submit"]"#),
    SelectorStrategy::interactive(r#"input[type="submit"]"#),
    SelectorStrategy::interactive(r#"button[name="login"]"#),
    SelectorStrategy::interactive(r#"button[id="login"]"#),
    SelectorStrategy::interactive(r#"button[name*="login"]"#),
    SelectorStrategy::interactive(r#"button[id*="login"]"#),
    SelectorStrategy::interactive(r#"button[id*="signin"]"#),
    SelectorStrategy::interactive(r#"button[class*="login"]"#),
    SelectorStrategy::interactive(r#"button[class*="submit"]"#),
];

/// Priority-ordered CSS strategies evaluated and ranked by the scorer.
pub fn smart_selectors(role: ElementRole) -> &'static [SelectorStrategy] {
    match role {
        ElementRole::Username => USERNAME_SMART,
        ElementRole::Password => PASSWORD_SMART,
        ElementRole::Submit => SUBMIT_SMART,
    }
}

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Case-insensitive `contains()` for XPath 1.0, which has no `lower-case()`.
fn ci_contains(expr: &str, needle: &str) -> String {
    format!("contains(translate({expr},'{UPPER}','{LOWER}'),'{needle}')")
}

fn placeholder_match(needle: &str) -> String {
    format!("//input[{}]", ci_contains("@placeholder", needle))
}

fn label_following_input(needle: &str) -> String {
    format!(
        "//label[{}]/following::input[1]",
        ci_contains("normalize-space(.)", needle)
    )
}

fn label_wrapped_input(needle: &str) -> String {
    format!("//label[{}]//input", ci_contains("normalize-space(.)", needle))
}

/// XPath heuristics tried in order after the smart tier.
pub fn xpath_heuristics(role: ElementRole) -> Vec<String> {
    match role {
        ElementRole::Username => vec![
            placeholder_match("user"),
            placeholder_match("email"),
            label_following_input("user"),
            label_following_input("email"),
            label_wrapped_input("user"),
            label_wrapped_input("email"),
            "(//input[@type='email'])[1]".to_string(),
            "(//input[@type='text'])[1]".to_string(),
            "(//input[not(@type)])[1]".to_string(),
        ],
        ElementRole::Password => vec![
            placeholder_match("pass"),
            label_following_input("pass"),
            label_wrapped_input("pass"),
            "(//input[@type='password'])[1]".to_string(),
        ],
        ElementRole::Submit => vec![
            format!("//button[{}]", ci_contains("normalize-space(.)", "log in")),
            format!("//button[{}]", ci_contains("normalize-space(.)", "login")),
            format!("//button[{}]", ci_contains("normalize-space(.)", "sign in")),
            format!("//button[{}]", ci_contains("normalize-space(.)", "submit")),
            format!("//input[@type='submit' or ({})]", ci_contains("@value", "login")),
            "(//form//button)[1]".to_string(),
        ],
    }
}

/// Broad CSS fallbacks; the first visible, enabled match in document order wins.
pub fn generic_fallback(role: ElementRole) -> &'static [&'static str] {
    match role {
        ElementRole::Username => &[r#"input:not([type]), input[type="text"], input[type="email"]"#],
        ElementRole::Password => &[r#"input[type="password"]"#],
        ElementRole::Submit => &[r#"button, input[type="submit"]"#],
    }
}
