//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print output in the specified format.
pub fn print<T: Serialize + std::fmt::Display>(value: &T, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            } else {
                println!("{}", value);
            }
        }
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"status": "success", "message": message})
            );
        }
    }
}

/// Print a labelled value, aligned with the other rows of a section.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<20} {}", format!("{}:", label), value);
}

/// Like [`print_row`], with `-` standing in for an unset value.
pub fn print_opt_row(label: &str, value: Option<&str>) {
    print_row(label, value.filter(|v| !v.is_empty()).unwrap_or("-"));
}

/// Print a section heading underlined to the row width.
pub fn print_heading(text: &str) {
    println!("\n{}\n{}", text, "-".repeat(50));
}

/// Show only enough of a secret to tell two apart.
pub fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 8 {
        return "*".repeat(count.max(4));
    }
    let head: String = value.chars().take(4).collect();
    format!("{head}****")
}
