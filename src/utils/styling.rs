//! Terminal styling for command output

use std::path::Path;

use console::{style, Emoji};

pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static TARGET: Emoji<'_, '_> = Emoji("🎯 ", "");
pub static CLOCK: Emoji<'_, '_> = Emoji("🕒 ", "");

/// Print the application banner
pub fn print_banner(version: &str, command: &str) {
    println!();
    println!(
        "    {} {}",
        style("tempfit").cyan().bold(),
        style(format!("v{}", version)).dim()
    );
    println!(
        "    {}",
        style(format!("temporal modeling: {}", command)).dim()
    );
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print the input, response and split the run is working on
pub fn print_run_card(input: &Path, response: &str, split: &str) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    println!("    ┌{}┐", line);
    println!("    │ {:<w$}│", style("Run").cyan().bold(), w = box_width - 3);
    println!("    ├{}┤", line);
    println!("    │  {}Input:    {:<38}│", FOLDER, truncate_path(input, 37));
    println!("    │  {}Response: {:<38}│", TARGET, truncate_string(response, 37));
    println!("    │  {}Split:    {:<38}│", CLOCK, truncate_string(split, 37));
    println!("    └{}┘", line);
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

pub fn print_info(message: &str) {
    println!("    {}{}", INFO, message);
}

/// Print a labelled value, e.g. `Test MSE: 4.2031`
pub fn print_metric(label: &str, value: f64) {
    println!("      {}: {}", label, style(format!("{:.4}", value)).yellow().bold());
}

pub fn print_completion(command: &str) {
    println!();
    println!(
        "    {}{}",
        ROCKET,
        style(format!("tempfit {} complete!", command)).green().bold()
    );
    println!();
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    truncate_string(&path.display().to_string(), max_len)
}

/// Keep the tail of long strings, which for paths is the informative part
fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
