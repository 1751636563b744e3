use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use quorra_core::audit::{AuditOptions, execute_audit};
use quorra_core::report::{ReportFormat, generate_report, save_report};
use quorra_scanner::analyzer::{AxeAnalyzer, fetch_axe_source};
use quorra_scanner::chromium::{ChromiumConfig, ChromiumDriver};
use quorra_scanner::crawler::CrawlConfig;
use quorra_scanner::login::{LoginConfig, LoginOrchestrator, LoginOutcome};
use quorra_scanner::Driver;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const AXE_FILE_NAME: &str = "axe.min.js";

// Helper functions for the handlers

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// The axe-core script to inject: an explicit path, or the one `init` installed
pub fn resolve_axe_path(explicit: Option<&PathBuf>, config_dir: &str) -> PathBuf {
    match explicit {
        Some(path) => expand_path(&path.to_string_lossy()),
        None => expand_path(config_dir).join(AXE_FILE_NAME),
    }
}

/// Split a comma-separated tag list; `None` when nothing usable was given
pub fn parse_tags(tags: Option<&String>) -> Option<Vec<String>> {
    let tags: Vec<String> = tags?
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    (!tags.is_empty()).then_some(tags)
}

fn non_empty(args: &ArgMatches, id: &str) -> Option<String> {
    args.get_one::<String>(id)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Login parameters from the command line; `None` when no login URL was given
pub fn build_login_config(args: &ArgMatches) -> Result<Option<LoginConfig>> {
    let Some(login_url) = args.get_one::<Url>("login-url") else {
        return Ok(None);
    };

    let username = non_empty(args, "username")
        .context("a username is required to log in (--username or QUORRA_USERNAME)")?;
    let password = args
        .get_one::<String>("password")
        .filter(|p| !p.is_empty())
        .cloned()
        .context("a password is required to log in (--password or QUORRA_PASSWORD)")?;

    Ok(Some(
        LoginConfig::new(login_url.as_str(), username, password)
            .with_username_selector(non_empty(args, "username-selector"))
            .with_password_selector(non_empty(args, "password-selector"))
            .with_submit_selector(non_empty(args, "submit-selector"))
            .with_post_login_url(non_empty(args, "post-login-url")),
    ))
}

pub fn build_crawl_config(args: &ArgMatches) -> CrawlConfig {
    let defaults = CrawlConfig::default();
    CrawlConfig::default()
        .with_max_pages(*args.get_one::<usize>("max-pages").unwrap_or(&defaults.max_pages))
        .with_max_depth(*args.get_one::<usize>("max-depth").unwrap_or(&defaults.max_depth))
        .with_strict_filtering(!args.get_flag("no-strict"))
        .with_strip_query(!args.get_flag("keep-query"))
}

/// Download axe-core into `config_dir`.
///
/// Returns `None` without touching the network when a copy already exists
/// and `force` is off.
pub async fn install_axe(axe_url: &str, config_dir: &Path, force: bool) -> Result<Option<PathBuf>> {
    let target = config_dir.join(AXE_FILE_NAME);
    if target.exists() && !force {
        return Ok(None);
    }

    tokio::fs::create_dir_all(config_dir)
        .await
        .with_context(|| format!("could not create {}", config_dir.display()))?;
    let source = fetch_axe_source(axe_url)
        .await
        .with_context(|| format!("could not download axe-core from {}", axe_url))?;
    tokio::fs::write(&target, source)
        .await
        .with_context(|| format!("could not write {}", target.display()))?;

    Ok(Some(target))
}

async fn connect_driver(args: &ArgMatches) -> Result<ChromiumDriver> {
    if let Some(ws_url) = non_empty(args, "ws-url") {
        return ChromiumDriver::connect(&ws_url)
            .await
            .context("could not connect to the remote browser");
    }

    let mut config = ChromiumConfig::default().with_chrome_path(non_empty(args, "chrome"));
    if args.get_flag("headed") {
        config = config.headed();
    }
    ChromiumDriver::launch(config)
        .await
        .context("could not launch Chrome (install Chromium or pass --ws-url)")
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message);
    spinner
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub async fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  QUORRA INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir = expand_path(
        args.get_one::<String>("PATH")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR),
    );
    let axe_url = args
        .get_one::<Url>("axe-url")
        .map(Url::to_string)
        .unwrap_or_else(|| quorra_scanner::analyzer::DEFAULT_AXE_URL.to_string());
    let force = args.get_flag("force");

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    let progress = spinner(format!("Downloading axe-core from {}", axe_url));
    match install_axe(&axe_url, &config_dir, force).await {
        Ok(Some(path)) => {
            progress.finish_and_clear();
            println!(
                "{} Installed axe-core to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        Ok(None) => {
            progress.finish_and_clear();
            println!("{}", "⚠ WARNING".yellow().bold());
            println!(
                "axe-core is already installed at {}",
                config_dir.join(AXE_FILE_NAME).display().to_string().bright_white()
            );
            println!("Use {} to download it again.", "--force".bright_cyan());
        }
        Err(e) => {
            progress.finish_and_clear();
            return Err(e);
        }
    }

    println!();
    println!("{} Ready. Try: quorra audit --login-url <URL> -u <USER>", "→".blue());
    Ok(())
}

fn print_login_outcome(outcome: &LoginOutcome) {
    println!("{}", "LOGIN CONTROLS".bright_blue().bold());
    for resolution in &outcome.resolutions {
        let score = resolution
            .score
            .map(|s| format!(" (score {})", s))
            .unwrap_or_default();
        println!(
            "  {} {:<9} {} {}{}",
            "✓".green(),
            resolution.role.to_string(),
            resolution.tier.to_string().bright_black(),
            resolution.selector.bright_white(),
            score
        );
    }
    println!();

    println!("{}", "VERIFICATION".bright_blue().bold());
    for signal in &outcome.signals {
        let mark = if signal.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {:<14} {}", mark, signal.kind.to_string(), signal.reason);
    }
    println!("  {} score {}/100", "→".blue(), outcome.score);
    println!();

    if outcome.success {
        println!(
            "{} Logged in; now at {}",
            "✓".green().bold(),
            outcome.current_url.as_deref().unwrap_or("unknown").bright_white()
        );
    } else {
        println!("{} Login not verified: {}", "✗".red().bold(), outcome.reason);
    }
}

pub async fn handle_login(args: &ArgMatches) -> Result<()> {
    let config = build_login_config(args)?.context("--login-url is required")?;
    debug!("Login configuration: {:?}", config);

    let driver = connect_driver(args).await?;
    let mut orchestrator = LoginOrchestrator::new(config);
    let outcome = orchestrator.login(&driver).await;
    driver.close().await?;
    let outcome = outcome.context("login attempt could not be completed")?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_login_outcome(&outcome);
    }

    if !outcome.success {
        bail!("login was not verified: {}", outcome.reason);
    }
    Ok(())
}

pub async fn handle_audit(args: &ArgMatches, quiet: bool) -> Result<()> {
    let login = build_login_config(args)?;
    let start_url = args.get_one::<Url>("start-url").map(Url::to_string);
    if login.is_none() && start_url.is_none() {
        bail!("either --login-url or --start-url is required");
    }

    let format_name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .with_context(|| format!("unknown report format '{}'", format_name))?;

    let config_dir = args
        .get_one::<String>("config-dir")
        .map(String::as_str)
        .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR);
    let axe_path = resolve_axe_path(args.get_one::<PathBuf>("axe"), config_dir);
    let mut analyzer = AxeAnalyzer::from_file(&axe_path).await.with_context(|| {
        format!(
            "could not read axe-core from {} (run `quorra init` first)",
            axe_path.display()
        )
    })?;
    if let Some(tags) = parse_tags(args.get_one::<String>("tags")) {
        analyzer = analyzer.with_tags(tags);
    }

    let mut options = AuditOptions::new()
        .with_start_url(start_url)
        .with_crawl(build_crawl_config(args))
        .with_progress_bars(!quiet);
    if let Some(login) = login {
        options = options.with_login(login);
    }

    let driver = connect_driver(args).await?;
    let report = execute_audit(driver, analyzer, options, None, None)
        .await
        .context("audit failed")?;

    let content = generate_report(&report, format)?;
    match non_empty(args, "output") {
        Some(output) => {
            let path = expand_path(&output);
            save_report(&content, &path)
                .with_context(|| format!("could not save report to {}", path.display()))?;
            if !quiet {
                println!(
                    "{} Report saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bright_white()
                );
            }
        }
        None => println!("{}", content),
    }

    Ok(())
}
