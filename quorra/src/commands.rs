use crate::CLAP_STYLING;
use clap::{arg, command};
use quorra_scanner::analyzer::DEFAULT_AXE_URL;
use url::Url;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/quorra/";

/// Browser selection shared by `login` and `audit`.
fn browser_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(--"ws-url" <URL>)
            .required(false)
            .help("DevTools websocket of an already running browser (local or remote grid)")
            .env("QUORRA_WS_URL"),
    )
    .arg(
        arg!(--"headed")
            .required(false)
            .help("Show the browser window instead of running headless")
            .action(clap::ArgAction::SetTrue)
            .conflicts_with("ws-url"),
    )
    .arg(
        arg!(--"chrome" <PATH>)
            .required(false)
            .help("Chrome/Chromium executable (default: auto-detect)")
            .conflicts_with("ws-url"),
    )
}

/// Credentials and optional selector overrides.
fn login_args(cmd: clap::Command, required: bool) -> clap::Command {
    cmd.arg(
        arg!(-l --"login-url" <URL>)
            .required(required)
            .help("Page that shows the login form")
            .value_parser(clap::value_parser!(Url)),
    )
    .arg(
        arg!(-u --"username" <USERNAME>)
            .required(false)
            .help("Account username or email")
            .env("QUORRA_USERNAME"),
    )
    .arg(
        arg!(-p --"password" <PASSWORD>)
            .required(false)
            .help("Account password")
            .env("QUORRA_PASSWORD")
            .hide_env_values(true),
    )
    .arg(
        arg!(--"username-selector" <SELECTOR>)
            .required(false)
            .help("CSS or XPath selector for the username field, tried before detection"),
    )
    .arg(
        arg!(--"password-selector" <SELECTOR>)
            .required(false)
            .help("CSS or XPath selector for the password field, tried before detection"),
    )
    .arg(
        arg!(--"submit-selector" <SELECTOR>)
            .required(false)
            .help("CSS or XPath selector for the submit control, tried before detection"),
    )
    .arg(
        arg!(--"post-login-url" <URL>)
            .required(false)
            .help("URL (or part of one) expected after a successful login")
            .env("QUORRA_POST_LOGIN_URL"),
    )
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("quorra")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("quorra")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Downloads the axe-core accessibility engine into the quorra config directory")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the quorra config directory")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(--"axe-url" <URL>)
                        .required(false)
                        .help("Where to download axe-core from")
                        .value_parser(clap::value_parser!(Url))
                        .default_value(DEFAULT_AXE_URL),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite an existing axe-core download")
                        .required(false),
                ),
        )
        .subcommand(browser_args(login_args(
            command!("login")
                .about("Find, fill and submit a login form, then report whether the login took")
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the login outcome as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
            true,
        )))
        .subcommand(browser_args(login_args(
            command!("audit")
                .about(
                    "Log in (optional), crawl same-origin pages and run axe-core on each. \
                Without --login-url the crawl is anonymous and needs --start-url.",
                )
                .arg(
                    arg!(-s --"start-url" <URL>)
                        .required(false)
                        .help("First page to test (default: the page reached after login)")
                        .value_parser(clap::value_parser!(Url))
                        .required_unless_present("login-url"),
                )
                .arg(
                    arg!(-m --"max-pages" <NUM>)
                        .required(false)
                        .help("Maximum number of pages to test")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(-d --"max-depth" <NUM>)
                        .required(false)
                        .help("Maximum link depth from the start page")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"no-strict")
                        .required(false)
                        .help("Also follow admin, api, logout and download links")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"keep-query")
                        .required(false)
                        .help("Treat URLs differing only in query string as different pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"axe" <PATH>)
                        .required(false)
                        .help("axe-core script to inject (default: <config-dir>/axe.min.js)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-c --"config-dir" <PATH>)
                        .required(false)
                        .help("Location of the quorra config directory")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(--"tags" <TAGS>)
                        .required(false)
                        .help("Comma-separated axe rule tags (default: wcag2a,wcag2aa,wcag21a,wcag21aa,best-practice)"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv, html, markdown")
                        .value_parser(["text", "json", "csv", "html", "markdown", "md"])
                        .default_value("text"),
                ),
            false,
        )))
}
