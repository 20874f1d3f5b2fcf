//! Styled terminal lines. Styling is dropped when `NO_COLOR` is set.

use console::style;

/// Check if color output is disabled via `NO_COLOR` env var.
#[must_use]
pub fn is_color_disabled() -> bool {
    std::env::var("NO_COLOR").is_ok()
}

/// Section header, e.g. `=== Run ===`.
#[must_use]
pub fn header(text: &str) -> String {
    let plain = format!("=== {text} ===");
    if is_color_disabled() {
        plain
    } else {
        style(plain).bold().cyan().to_string()
    }
}

/// An aligned `label: value` line.
#[must_use]
pub fn field(label: &str, value: &str) -> String {
    let label = format!("{label:<14}");
    if is_color_disabled() {
        format!("  {label} {value}")
    } else {
        format!("  {} {value}", style(label).dim())
    }
}

/// A line marking a finished stage.
#[must_use]
pub fn stage_done(stage: &str, elapsed: &str) -> String {
    if is_color_disabled() {
        format!("[OK] {stage} ({elapsed})")
    } else {
        format!("{} {stage} {}", style("[OK]").green().bold(), style(format!("({elapsed})")).dim())
    }
}

/// Print a success message.
pub fn print_success(text: &str) {
    if is_color_disabled() {
        println!("[OK] {text}");
    } else {
        println!("{} {text}", style("[OK]").green().bold());
    }
}

/// Print an error message to stderr.
pub fn print_error(text: &str) {
    if is_color_disabled() {
        eprintln!("[ERROR] {text}");
    } else {
        eprintln!("{} {text}", style("[ERROR]").red().bold());
    }
}
