//! Formatting utilities for CLI output.

use crate::config_store::ConfigRecord;

/// ANSI color codes for terminal output
pub struct Colors;

impl Colors {
    /// Reset all formatting
    pub const RESET: &'static str = "\x1b[0m";
    /// Bold text
    pub const BOLD: &'static str = "\x1b[1m";
    /// Dim text
    pub const DIM: &'static str = "\x1b[2m";
    /// Red color
    pub const RED: &'static str = "\x1b[31m";
    /// Cyan color
    pub const CYAN: &'static str = "\x1b[36m";
}

/// Formats field labels with styling
pub fn format_label(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::CYAN, text, Colors::RESET)
}

/// Formats secondary text with muted styling
pub fn format_description(text: &str) -> String {
    format!("{}{}{}", Colors::DIM, text, Colors::RESET)
}

/// Formats error messages with red styling
pub fn format_error(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::RED, text, Colors::RESET)
}

/// Formats a stored record for output.
///
/// Prints pretty JSON, or `null` when nothing is stored, so the output of
/// `get` can be fed straight back into `save`.
///
/// # Examples
///
/// ```
/// use hlp_config::cli::formatting::format_record;
///
/// assert_eq!(format_record(None), "null");
/// assert_eq!(format_record(Some(&serde_json::json!(1))), "1");
/// ```
pub fn format_record(record: Option<&ConfigRecord>) -> String {
    match record {
        Some(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        None => "null".to_string(),
    }
}
