// Terminal output helpers shared by the publish commands

use colored::Colorize;
use std::time::Duration;

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_warning(message: &str) {
    eprintln!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// One summary line per executed operation
pub fn print_operation_line(success: bool, target: &str, action: &str, duration: Duration) {
    let status = if success { "✅" } else { "❌" };
    let rounded = Duration::from_millis(duration.as_millis() as u64);
    println!(
        "   {} {} ({}, {})",
        status,
        target,
        action,
        humantime::format_duration(rounded)
    );
}
