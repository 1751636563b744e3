// Report generation from audit results

use chrono::{DateTime, Utc};
use quorra_scanner::result::{ImpactCounts, PageTestResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const THIN_RULE: &str = "────────────────────────────────────────────────────────────────────────────────\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Html,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "html" => Some(ReportFormat::Html),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
            ReportFormat::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub pages_tested: usize,
    pub pages_failed: usize,
    pub total_violations: usize,
    pub impact: ImpactCounts,
    /// Mean page score over pages that were analysed.
    pub average_score: Option<u8>,
}

impl ReportSummary {
    fn from_pages(pages: &[PageTestResult]) -> Self {
        let mut impact = ImpactCounts::default();
        for page in pages {
            impact.merge(&page.impact_counts());
        }

        let scores: Vec<u32> = pages.iter().filter_map(|p| p.score).map(u32::from).collect();
        let average_score = if scores.is_empty() {
            None
        } else {
            let mean = scores.iter().sum::<u32>() as f64 / scores.len() as f64;
            Some(mean.round() as u8)
        };

        Self {
            pages_tested: pages.len(),
            pages_failed: pages.iter().filter(|p| !p.success).count(),
            total_violations: impact.total(),
            impact,
            average_score,
        }
    }
}

/// Everything a report needs: the ordered page results and whether the
/// session was authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub start_url: Option<String>,
    pub login_used: bool,
    pub summary: ReportSummary,
    pub pages: Vec<PageTestResult>,
    /// Discovered pages left untested when the budget ran out.
    pub unvisited: usize,
}

impl AuditReport {
    pub fn new(pages: Vec<PageTestResult>, login_used: bool) -> Self {
        Self {
            generated_at: Utc::now(),
            start_url: None,
            login_used,
            summary: ReportSummary::from_pages(&pages),
            pages,
            unvisited: 0,
        }
    }

    pub fn with_start_url(mut self, url: Option<String>) -> Self {
        self.start_url = url;
        self
    }

    pub fn with_unvisited(mut self, unvisited: usize) -> Self {
        self.unvisited = unvisited;
        self
    }

    fn target(&self) -> String {
        self.start_url
            .clone()
            .or_else(|| self.pages.first().map(|p| p.url.clone()))
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

pub fn generate_report(report: &AuditReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => generate_json_report(report),
        ReportFormat::Csv => Ok(generate_csv_report(report)),
        ReportFormat::Html => Ok(generate_html_report(report)),
        ReportFormat::Markdown => Ok(generate_markdown_report(report)),
    }
}

pub fn generate_text_report(report: &AuditReport) -> String {
    let mut out = String::new();

    out.push_str(RULE);
    out.push_str("                     QUORRA ACCESSIBILITY AUDIT REPORT\n");
    out.push_str(RULE);
    out.push('\n');

    out.push_str(&format!("Target:        {}\n", report.target()));
    out.push_str(&format!(
        "Generated:     {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Session:       {}\n",
        if report.login_used { "Authenticated" } else { "Anonymous" }
    ));
    out.push_str(&format!("Pages Tested:  {}\n", report.summary.pages_tested));
    if report.unvisited > 0 {
        out.push_str(&format!("Not Tested:    {} (page budget reached)\n", report.unvisited));
    }
    out.push('\n');

    out.push_str(RULE);
    out.push_str("SUMMARY\n");
    out.push_str(RULE);
    out.push('\n');

    let summary = &report.summary;
    out.push_str(&format!("Total Violations: {}\n", summary.total_violations));
    if let Some(score) = summary.average_score {
        out.push_str(&format!("Average Score:    {}/100\n", score));
    }
    out.push('\n');

    let impact = &summary.impact;
    for (label, count) in [
        ("[CRITICAL]", impact.critical),
        ("[SERIOUS] ", impact.serious),
        ("[MODERATE]", impact.moderate),
        ("[MINOR]   ", impact.minor),
        ("[UNKNOWN] ", impact.unknown),
    ] {
        if count > 0 {
            out.push_str(&format!("  {} {}\n", label, count));
        }
    }
    if summary.pages_failed > 0 {
        out.push_str(&format!("\n  {} page(s) could not be tested\n", summary.pages_failed));
    }
    out.push('\n');

    out.push_str(RULE);
    out.push_str("PAGES\n");
    out.push_str(RULE);
    out.push('\n');

    for (idx, page) in report.pages.iter().enumerate() {
        out.push_str(&format!("[{}] {}\n", idx + 1, page.url));
        if let Some(title) = &page.title {
            out.push_str(&format!("Title:        {}\n", title));
        }
        out.push_str(&format!("Depth:        {}\n", page.depth));

        if !page.success {
            out.push_str(&format!(
                "Status:       FAILED\n{}",
                wrap_text(page.error.as_deref().unwrap_or("unknown error"), 80, "  ")
            ));
            out.push('\n');
            out.push_str(THIN_RULE);
            out.push('\n');
            continue;
        }

        if let Some(score) = page.score {
            out.push_str(&format!("Score:        {}/100\n", score));
        }
        out.push_str(&format!(
            "Results:      {} violations, {} passes, {} incomplete\n\n",
            page.violations.len(),
            page.passes.len(),
            page.incomplete.len()
        ));

        for violation in &page.violations {
            let impact = violation.impact.map(|i| i.as_str()).unwrap_or("unknown");
            out.push_str(&format!(
                "  - {} [{}] ({} node{})\n",
                violation.id,
                impact.to_uppercase(),
                violation.nodes.len(),
                if violation.nodes.len() == 1 { "" } else { "s" }
            ));
            if !violation.description.is_empty() {
                out.push_str(&wrap_text(&violation.description, 80, "      "));
            }
            if !violation.help_url.is_empty() {
                out.push_str(&format!("      {}\n", violation.help_url));
            }
        }
        out.push('\n');
        out.push_str(THIN_RULE);
        out.push('\n');
    }

    out.push_str(RULE);
    out.push_str("                              End of Report\n");
    out.push_str(RULE);
    out.push_str("\nGenerated by Quorra - authenticated accessibility crawler\n");
    out.push_str("Automated checks find a subset of accessibility issues; test manually too.\n\n");

    out
}

pub fn generate_json_report(report: &AuditReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Quorra",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": report.generated_at.to_rfc3339(),
                "format": "json"
            },
            "session": {
                "target": report.target(),
                "login_used": report.login_used,
                "unvisited": report.unvisited
            },
            "summary": report.summary,
            "pages": report.pages
        }
    });

    serde_json::to_string_pretty(&json_report)
}

/// One row per violation; pages without violations still get a row.
pub fn generate_csv_report(report: &AuditReport) -> String {
    let mut out = String::from(
        "url,title,depth,success,score,rule_id,impact,description,help_url,nodes,error\n",
    );

    for page in &report.pages {
        let title = page.title.as_deref().unwrap_or("");
        let score = page.score.map(|s| s.to_string()).unwrap_or_default();
        let error = page.error.as_deref().unwrap_or("");
        let prefix = format!(
            "{},{},{},{},{}",
            csv_escape(&page.url),
            csv_escape(title),
            page.depth,
            page.success,
            score
        );

        if page.violations.is_empty() {
            out.push_str(&format!("{},,,,,0,{}\n", prefix, csv_escape(error)));
            continue;
        }

        for violation in &page.violations {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                prefix,
                csv_escape(&violation.id),
                violation.impact.map(|i| i.as_str()).unwrap_or(""),
                csv_escape(&violation.description),
                csv_escape(&violation.help_url),
                violation.nodes.len(),
                csv_escape(error)
            ));
        }
    }

    out
}

pub fn generate_markdown_report(report: &AuditReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str("# Quorra Accessibility Audit\n\n");
    out.push_str(&format!("- **Target:** {}\n", report.target()));
    out.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "- **Session:** {}\n",
        if report.login_used { "authenticated" } else { "anonymous" }
    ));
    out.push_str(&format!("- **Pages tested:** {}\n", summary.pages_tested));
    if let Some(score) = summary.average_score {
        out.push_str(&format!("- **Average score:** {}/100\n", score));
    }
    out.push('\n');

    out.push_str("## Violations by impact\n\n");
    out.push_str("| Critical | Serious | Moderate | Minor | Unknown | Total |\n");
    out.push_str("|---:|---:|---:|---:|---:|---:|\n");
    out.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n\n",
        summary.impact.critical,
        summary.impact.serious,
        summary.impact.moderate,
        summary.impact.minor,
        summary.impact.unknown,
        summary.total_violations
    ));

    out.push_str("## Pages\n\n");
    for page in &report.pages {
        out.push_str(&format!("### {}\n\n", page.url));
        if let Some(title) = &page.title {
            out.push_str(&format!("_{}_\n\n", markdown_escape(title)));
        }
        if !page.success {
            out.push_str(&format!(
                "**Failed:** {}\n\n",
                markdown_escape(page.error.as_deref().unwrap_or("unknown error"))
            ));
            continue;
        }
        if page.violations.is_empty() {
            out.push_str("No violations found.\n\n");
            continue;
        }

        out.push_str("| Rule | Impact | Nodes | Description |\n");
        out.push_str("|---|---|---:|---|\n");
        for violation in &page.violations {
            let rule = if violation.help_url.is_empty() {
                format!("`{}`", violation.id)
            } else {
                format!("[`{}`]({})", violation.id, violation.help_url)
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                rule,
                violation.impact.map(|i| i.as_str()).unwrap_or("unknown"),
                violation.nodes.len(),
                markdown_escape(&violation.description)
            ));
        }
        out.push('\n');
    }

    out
}

pub fn generate_html_report(report: &AuditReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!(
        "<title>Accessibility audit: {}</title>\n",
        html_escape(&report.target())
    ));
    out.push_str(
        "<style>body{font-family:system-ui,sans-serif;max-width:60rem;margin:2rem auto;padding:0 1rem}\
         table{border-collapse:collapse;width:100%}th,td{border:1px solid #888;padding:.3rem .5rem;text-align:left}\
         .critical{color:#a00}.serious{color:#b45309}.failed{color:#a00}</style>\n",
    );
    out.push_str("</head>\n<body>\n<main>\n");
    out.push_str("<h1>Accessibility audit</h1>\n<dl>\n");
    out.push_str(&format!("<dt>Target</dt><dd>{}</dd>\n", html_escape(&report.target())));
    out.push_str(&format!(
        "<dt>Generated</dt><dd>{}</dd>\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "<dt>Session</dt><dd>{}</dd>\n",
        if report.login_used { "Authenticated" } else { "Anonymous" }
    ));
    out.push_str(&format!("<dt>Pages tested</dt><dd>{}</dd>\n", summary.pages_tested));
    if let Some(score) = summary.average_score {
        out.push_str(&format!("<dt>Average score</dt><dd>{}/100</dd>\n", score));
    }
    out.push_str("</dl>\n");

    out.push_str("<h2>Violations by impact</h2>\n<table>\n");
    out.push_str("<tr><th scope=\"col\">Critical</th><th scope=\"col\">Serious</th><th scope=\"col\">Moderate</th><th scope=\"col\">Minor</th><th scope=\"col\">Unknown</th></tr>\n");
    out.push_str(&format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n</table>\n",
        summary.impact.critical,
        summary.impact.serious,
        summary.impact.moderate,
        summary.impact.minor,
        summary.impact.unknown
    ));

    out.push_str("<h2>Pages</h2>\n");
    for page in &report.pages {
        out.push_str("<section>\n");
        out.push_str(&format!(
            "<h3><a href=\"{0}\">{0}</a></h3>\n",
            html_escape(&page.url)
        ));
        if let Some(title) = &page.title {
            out.push_str(&format!("<p>{}</p>\n", html_escape(title)));
        }
        if !page.success {
            out.push_str(&format!(
                "<p class=\"failed\">Failed: {}</p>\n</section>\n",
                html_escape(page.error.as_deref().unwrap_or("unknown error"))
            ));
            continue;
        }
        if page.violations.is_empty() {
            out.push_str("<p>No violations found.</p>\n</section>\n");
            continue;
        }

        out.push_str("<table>\n<tr><th scope=\"col\">Rule</th><th scope=\"col\">Impact</th><th scope=\"col\">Nodes</th><th scope=\"col\">Description</th></tr>\n");
        for violation in &page.violations {
            let impact = violation.impact.map(|i| i.as_str()).unwrap_or("unknown");
            out.push_str(&format!(
                "<tr><td><a href=\"{}\">{}</a></td><td class=\"{}\">{}</td><td>{}</td><td>{}</td></tr>\n",
                html_escape(&violation.help_url),
                html_escape(&violation.id),
                impact,
                impact,
                violation.nodes.len(),
                html_escape(&violation.description)
            ));
        }
        out.push_str("</table>\n</section>\n");
    }

    out.push_str("</main>\n</body>\n</html>\n");
    out
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();
    let available = width.saturating_sub(indent.len()).max(1);

    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > available {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn markdown_escape(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
