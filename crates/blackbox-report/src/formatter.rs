//! Plain-text rendering of log messages

use blackbox_core::{LogKind, LogMessage};
use chrono::Local;

/// Renders one message as a line of text for bug reports and exports.
pub trait LogFormatter: Send + Sync {
    fn format_message(&self, message: &LogMessage) -> String;
}

/// The standard formatter: a local-time timestamp, a prefix marking errors
/// and separators, then the message text with its parameters.
#[derive(Debug, Clone)]
pub struct DefaultLogFormatter {
    error_prefix: String,
    separator_prefix: String,
}

impl Default for DefaultLogFormatter {
    fn default() -> Self {
        Self {
            error_prefix: "ERROR: ".to_string(),
            separator_prefix: "----- ".to_string(),
        }
    }
}

impl DefaultLogFormatter {
    /// Create a formatter with the standard prefixes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to Error-kind messages instead of `"ERROR: "`.
    pub fn with_error_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.error_prefix = prefix.into();
        self
    }

    /// Prepend `prefix` to Separator-kind messages instead of `"----- "`.
    pub fn with_separator_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.separator_prefix = prefix.into();
        self
    }

    /// The string prepended to Error-kind messages.
    pub fn error_prefix(&self) -> &str {
        &self.error_prefix
    }

    /// The string prepended to Separator-kind messages.
    pub fn separator_prefix(&self) -> &str {
        &self.separator_prefix
    }
}

impl LogFormatter for DefaultLogFormatter {
    fn format_message(&self, message: &LogMessage) -> String {
        let time = message
            .date
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.3f");
        let prefix = match message.kind {
            LogKind::Error => self.error_prefix.as_str(),
            LogKind::Separator => self.separator_prefix.as_str(),
            LogKind::Default | LogKind::Screenshot => "",
        };
        format!("[{}] {}{}", time, prefix, message)
    }
}
