use quorra::commands::command_argument_builder;
use quorra::handlers::*;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn audit_matches(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["quorra", "audit"];
    argv.extend_from_slice(args);
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    matches.subcommand_matches("audit").unwrap().clone()
}

#[test]
fn test_command_builder_is_valid() {
    command_argument_builder().debug_assert();
}

#[test]
fn test_expand_path_without_tilde() {
    assert_eq!(expand_path("/tmp/quorra"), PathBuf::from("/tmp/quorra"));
}

#[test]
fn test_resolve_axe_path_prefers_explicit_file() {
    let explicit = PathBuf::from("/opt/axe/axe.js");
    assert_eq!(
        resolve_axe_path(Some(&explicit), "/etc/quorra"),
        PathBuf::from("/opt/axe/axe.js")
    );
    assert_eq!(
        resolve_axe_path(None, "/etc/quorra"),
        PathBuf::from("/etc/quorra").join(AXE_FILE_NAME)
    );
}

#[test]
fn test_parse_tags() {
    let tags = "wcag2a, wcag2aa ,,best-practice".to_string();
    assert_eq!(
        parse_tags(Some(&tags)),
        Some(vec![
            "wcag2a".to_string(),
            "wcag2aa".to_string(),
            "best-practice".to_string()
        ])
    );
    assert_eq!(parse_tags(Some(&" , ".to_string())), None);
    assert_eq!(parse_tags(None), None);
}

#[test]
fn test_build_login_config_from_flags() {
    let args = audit_matches(&[
        "--login-url",
        "https://ex.com/login",
        "-u",
        "ada@ex.com",
        "-p",
        "hunter2",
        "--submit-selector",
        "  #go  ",
        "--post-login-url",
        "https://ex.com/home",
    ]);

    let config = build_login_config(&args).unwrap().unwrap();

    assert_eq!(config.login_url, "https://ex.com/login");
    assert_eq!(config.username, "ada@ex.com");
    assert_eq!(config.password, "hunter2");
    assert_eq!(config.submit_selector.as_deref(), Some("#go"));
    assert_eq!(config.username_selector, None);
    assert_eq!(config.post_login_url.as_deref(), Some("https://ex.com/home"));
}

#[test]
fn test_build_login_config_without_login_url() {
    let args = audit_matches(&["--start-url", "https://ex.com/"]);
    assert!(build_login_config(&args).unwrap().is_none());
}

#[test]
fn test_audit_requires_login_or_start_url() {
    let result = command_argument_builder().try_get_matches_from(["quorra", "audit"]);
    assert!(result.is_err());
}

#[test]
fn test_build_crawl_config_defaults() {
    let args = audit_matches(&["--start-url", "https://ex.com/"]);
    let config = build_crawl_config(&args);

    assert_eq!(config.max_pages, 10);
    assert_eq!(config.max_depth, 3);
    assert!(config.strict_filtering);
    assert!(config.strip_query);
}

#[test]
fn test_build_crawl_config_overrides() {
    let args = audit_matches(&[
        "--start-url",
        "https://ex.com/",
        "-m",
        "25",
        "-d",
        "1",
        "--no-strict",
        "--keep-query",
    ]);
    let config = build_crawl_config(&args);

    assert_eq!(config.max_pages, 25);
    assert_eq!(config.max_depth, 1);
    assert!(!config.strict_filtering);
    assert!(!config.strip_query);
}

#[test]
fn test_invalid_format_is_rejected_by_parser() {
    let result = command_argument_builder().try_get_matches_from([
        "quorra",
        "audit",
        "--start-url",
        "https://ex.com/",
        "--format",
        "pdf",
    ]);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_install_axe_downloads_into_config_dir() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/axe.min.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("/*! axe v4.10.2 */ var axe = {};"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("quorra");
    let url = format!("{}/axe.min.js", server.uri());

    let installed = install_axe(&url, &config_dir, false).await.unwrap();

    let target = config_dir.join(AXE_FILE_NAME);
    assert_eq!(installed, Some(target.clone()));
    assert!(std::fs::read_to_string(target).unwrap().contains("var axe"));
}

#[tokio::test]
async fn test_install_axe_keeps_existing_copy_without_force() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join(AXE_FILE_NAME);
    std::fs::write(&target, "/* axe */").unwrap();

    // Unreachable URL: nothing is fetched when a copy exists
    let installed = install_axe("http://127.0.0.1:1/axe.min.js", dir.path(), false)
        .await
        .unwrap();

    assert_eq!(installed, None);
    assert_eq!(std::fs::read_to_string(target).unwrap(), "/* axe */");
}

#[tokio::test]
async fn test_install_axe_reports_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/axe.min.js", server.uri());

    let result = install_axe(&url, dir.path(), true).await;

    assert!(result.is_err());
    assert!(!dir.path().join(AXE_FILE_NAME).exists());
}
