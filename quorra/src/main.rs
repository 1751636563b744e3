use colored::Colorize;
use quorra::commands::command_argument_builder;
use quorra::handlers::{handle_audit, handle_init, handle_login};
use quorra_core::print_banner;
use tracing_subscriber::EnvFilter;

fn init_logging(quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if quiet { "warn" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    init_logging(quiet);

    let result = match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command).await,
        Some(("login", primary_command)) => handle_login(primary_command).await,
        Some(("audit", primary_command)) => handle_audit(primary_command, quiet).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
