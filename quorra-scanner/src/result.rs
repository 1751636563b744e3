use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// axe-core impact levels, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Serious => "serious",
            Impact::Critical => "critical",
        }
    }
}

/// One rule outcome as reported by the analysis engine.
///
/// Only the listed fields are read by Quorra; anything else the engine emits
/// is carried through to reports untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub id: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "helpUrl", default)]
    pub help_url: String,
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type Violation = RuleResult;

impl RuleResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            impact: None,
            description: String::new(),
            help_url: String::new(),
            nodes: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_impact(mut self, impact: Impact) -> Self {
        self.impact = Some(impact);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_help_url(mut self, help_url: impl Into<String>) -> Self {
        self.help_url = help_url.into();
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<Value>) -> Self {
        self.nodes = nodes;
        self
    }
}

/// The three buckets returned by one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub passes: Vec<RuleResult>,
    #[serde(default)]
    pub incomplete: Vec<RuleResult>,
}

/// Violation counts grouped by impact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactCounts {
    pub critical: usize,
    pub serious: usize,
    pub moderate: usize,
    pub minor: usize,
    /// Violations the engine reported without an impact.
    pub unknown: usize,
}

impl ImpactCounts {
    pub fn from_violations<'a>(violations: impl IntoIterator<Item = &'a Violation>) -> Self {
        let mut counts = Self::default();
        for violation in violations {
            match violation.impact {
                Some(Impact::Critical) => counts.critical += 1,
                Some(Impact::Serious) => counts.serious += 1,
                Some(Impact::Moderate) => counts.moderate += 1,
                Some(Impact::Minor) => counts.minor += 1,
                None => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.serious + self.moderate + self.minor + self.unknown
    }

    pub fn merge(&mut self, other: &ImpactCounts) {
        self.critical += other.critical;
        self.serious += other.serious;
        self.moderate += other.moderate;
        self.minor += other.minor;
        self.unknown += other.unknown;
    }
}

/// Outcome of testing one crawled page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTestResult {
    pub url: String,
    pub title: Option<String>,
    pub depth: usize,
    pub violations: Vec<Violation>,
    pub passes: Vec<RuleResult>,
    pub incomplete: Vec<RuleResult>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub score: Option<u8>,
}

impl PageTestResult {
    pub fn new(url: String, depth: usize, analysis: AnalysisResults) -> Self {
        let score = page_score(analysis.passes.len(), analysis.violations.len());
        Self {
            url,
            title: None,
            depth,
            violations: analysis.violations,
            passes: analysis.passes,
            incomplete: analysis.incomplete,
            timestamp: Utc::now(),
            success: true,
            error: None,
            score: Some(score),
        }
    }

    pub fn failed(url: String, depth: usize, error: String) -> Self {
        Self {
            url,
            title: None,
            depth,
            violations: Vec::new(),
            passes: Vec::new(),
            incomplete: Vec::new(),
            timestamp: Utc::now(),
            success: false,
            error: Some(error),
            score: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn impact_counts(&self) -> ImpactCounts {
        ImpactCounts::from_violations(&self.violations)
    }
}

/// Share of passing rules as a 0-100 score; a page with no rule outcomes scores 100.
pub fn page_score(passes: usize, violations: usize) -> u8 {
    let total = passes + violations;
    if total == 0 {
        return 100;
    }
    ((passes as f64 / total as f64) * 100.0).round() as u8
}
