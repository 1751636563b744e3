pub mod audit;
pub mod report;

use colored::Colorize;

const BANNER: &str = r#"
   ____
  / __ \__  ______  ____________ _
 / / / / / / / __ \/ ___/ ___/ __ `/
/ /_/ / /_/ / /_/ / /  / /  / /_/ /
\___\_\__,_/\____/_/  /_/   \__,_/
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_cyan().bold());
    println!(
        "  {} {}\n",
        "authenticated accessibility crawler".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
}
