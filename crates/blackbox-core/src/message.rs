//! The immutable value broadcast through the system

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogKind {
    /// Ordinary diagnostic message
    #[default]
    Default,
    /// Visual divider between groups of messages
    Separator,
    /// Something went wrong
    Error,
    /// Message carrying a captured screenshot
    Screenshot,
}

/// One log entry as seen by every observer.
///
/// Messages are immutable once constructed. Timestamps carry millisecond
/// precision, matching the persisted representation, so a message compares
/// equal to itself after an archive round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    /// When the message was logged
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    /// The text of the message
    pub text: String,
    /// Optional encoded bitmap, typically on [`LogKind::Screenshot`] messages
    pub image: Option<Bytes>,
    /// Message category
    pub kind: LogKind,
    /// Key/value details persisted alongside the text
    pub parameters: BTreeMap<String, String>,
    /// Scratch data for observers. Never persisted and ignored by equality.
    #[serde(skip)]
    pub user_info: BTreeMap<String, serde_json::Value>,
}

impl LogMessage {
    /// Create a message stamped with the current time.
    pub fn new(text: impl Into<String>, kind: LogKind) -> Self {
        Self::with_details(text, None, kind, BTreeMap::new())
    }

    /// Create a message with an image and parameters, stamped with the
    /// current time.
    pub fn with_details(
        text: impl Into<String>,
        image: Option<Bytes>,
        kind: LogKind,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        Self::at(Utc::now(), text, image, kind, parameters, BTreeMap::new())
    }

    /// Create a message at an explicit date. All other constructors route
    /// through here; the date is truncated to millisecond precision.
    pub fn at(
        date: DateTime<Utc>,
        text: impl Into<String>,
        image: Option<Bytes>,
        kind: LogKind,
        parameters: BTreeMap<String, String>,
        user_info: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let date = DateTime::from_timestamp_millis(date.timestamp_millis()).unwrap_or(date);
        Self {
            date,
            text: text.into(),
            image,
            kind,
            parameters,
            user_info,
        }
    }

    /// A copy of this message carrying extra observer-local scratch data.
    pub fn with_user_info(mut self, user_info: BTreeMap<String, serde_json::Value>) -> Self {
        self.user_info = user_info;
        self
    }
}

impl PartialEq for LogMessage {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
            && self.text == other.text
            && self.image == other.image
            && self.kind == other.kind
            && self.parameters == other.parameters
    }
}

impl Eq for LogMessage {}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        for (key, value) in &self.parameters {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}
