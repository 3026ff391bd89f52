/// User Interface Module
///
/// Terminal output helpers for the CLI: progress bars for shard transfer,
/// colored status lines, and simple table/list formatting.
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

/// Progress bar for a single upload or download task.
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new_upload(total_shards: u64) -> Self {
        let bar = ProgressBar::new(total_shards);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} shards ({msg})")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message("uploading");
        Self { bar }
    }

    pub fn new_download(total_shards: u64) -> Self {
        let bar = ProgressBar::new(total_shards);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} shards ({msg})")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message("downloading");
        Self { bar }
    }

    pub fn set_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Tracks progress bars for several concurrently-running tasks at once.
pub struct MultiOperationProgress {
    multi: MultiProgress,
    operations: Vec<ProgressBar>,
}

impl MultiOperationProgress {
    pub fn new() -> Self {
        Self { multi: MultiProgress::new(), operations: Vec::new() }
    }

    pub fn add_operation(&mut self, name: &str, total: u64) -> usize {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_prefix(name.to_string());

        let index = self.operations.len();
        self.operations.push(pb);
        index
    }

    pub fn update_operation(&self, index: usize, position: u64, message: &str) {
        if let Some(pb) = self.operations.get(index) {
            pb.set_position(position);
            pb.set_message(message.to_string());
        }
    }

    pub fn finish_operation(&self, index: usize, message: &str) {
        if let Some(pb) = self.operations.get(index) {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn clear(&self) {
        self.multi.clear().unwrap_or(());
    }
}

impl Default for MultiOperationProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Interactive y/n confirmation prompt.
pub fn confirm_action(message: &str, default: bool) -> bool {
    let default_char = if default { "Y/n" } else { "y/N" };
    print!("{} {} [{}]: ", "?".yellow().bold(), message, default_char);
    io::stdout().flush().unwrap();

    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(_) => {
            let input = input.trim().to_lowercase();
            if input.is_empty() {
                default
            } else {
                matches!(input.as_str(), "y" | "yes")
            }
        }
        Err(_) => default,
    }
}

pub fn print_section(title: &str) {
    println!();
    println!("{}", format!("\u{25b6} {}", title).bold().bright_blue());
    println!("{}", "\u{2500}".repeat(title.len() + 2).bright_blue());
}

/// Display operation status with an icon matched to the status string.
pub fn print_operation_status(operation: &str, status: &str, details: Option<&str>) {
    let (icon, color) = match status.to_lowercase().as_str() {
        "success" | "completed" | "ok" => ("\u{2713}", Color::Green),
        "error" | "failed" | "fail" => ("\u{2717}", Color::Red),
        "warning" | "warn" => ("\u{26a0}", Color::Yellow),
        "info" | "running" | "in_progress" => ("\u{2139}", Color::Cyan),
        "pending" | "waiting" => ("\u{23f3}", Color::Yellow),
        _ => ("\u{2022}", Color::White),
    };

    let status_text = format!("{} {}", icon, operation).color(color).bold();
    if let Some(details) = details {
        println!("  {} {}", status_text, details.dimmed());
    } else {
        println!("  {}", status_text);
    }
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {}: {}", key.bold().bright_white(), value.bright_green());
}

/// Display a table of rows with auto-sized columns.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if headers.is_empty() || rows.is_empty() {
        return;
    }

    let mut col_widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < col_widths.len() {
                col_widths[i] = col_widths[i].max(cell.len());
            }
        }
    }

    print!("  ");
    for (i, header) in headers.iter().enumerate() {
        print!("{:<width$}", header.bold().bright_cyan(), width = col_widths[i] + 2);
    }
    println!();

    print!("  ");
    for width in &col_widths {
        print!("{}", "\u{2500}".repeat(width + 2));
    }
    println!();

    for row in rows {
        print!("  ");
        for (i, cell) in row.iter().enumerate() {
            if i < col_widths.len() {
                print!("{:<width$}", cell, width = col_widths[i] + 2);
            }
        }
        println!();
    }
    println!();
}

pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["\u{280b}", "\u{2819}", "\u{2839}", "\u{2838}", "\u{283c}", "\u{2834}", "\u{2826}", "\u{2827}", "\u{2807}", "\u{280f}"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a byte count in human-readable units.
pub fn format_file_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if size == 0 {
        return "0 B".to_string();
    }

    let mut size_f = size as f64;
    let mut unit_index = 0;
    while size_f >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size_f /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size_f, UNITS[unit_index])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else if secs < 86400 {
        format!("{} hours", secs / 3600)
    } else {
        format!("{} days", secs / 86400)
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "\u{2705}".green(), message);
}

pub fn print_error(message: &str) {
    println!("{} {}", "\u{274c}".red(), message.red());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "\u{26a0}\u{fe0f}".yellow(), message.yellow());
}

pub fn print_info(message: &str) {
    println!("{} {}", "\u{2139}\u{fe0f}".blue(), message);
}

pub fn print_separator() {
    println!("{}", "\u{2500}".repeat(50).dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_file_size_across_unit_boundaries() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn formats_duration_across_unit_boundaries() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30 seconds");
        assert_eq!(format_duration(Duration::from_secs(90)), "1 minutes");
        assert_eq!(format_duration(Duration::from_secs(3700)), "1 hours");
        assert_eq!(format_duration(Duration::from_secs(90000)), "1 days");
    }
}
