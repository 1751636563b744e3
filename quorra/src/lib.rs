pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    build_crawl_config, build_login_config, expand_path, parse_tags, resolve_axe_path,
};

// Re-export audit functionality from quorra-core
pub use quorra_core::audit::{AuditOptions, execute_audit};
pub use quorra_core::report::{AuditReport, ReportFormat};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
