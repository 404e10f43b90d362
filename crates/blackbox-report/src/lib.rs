//! # blackbox-report
//!
//! Turns the messages in a blackbox log store into bug-report material:
//! plain-text renderings, `logs.txt` and `screenshot.png` attachments, and
//! the "most recent errors" digest reporters put at the top of a ticket.
//!
//! Attachment generation never mutates a store; it works from snapshots.

pub mod attachment;
pub mod formatter;

// Re-exports
pub use attachment::{
    BugReportAttachment, StoreAttachments, attachment_for_latest_screenshot,
    attachment_for_messages, attachments_for_store, latest_image, recent_errors_text,
};
pub use formatter::{DefaultLogFormatter, LogFormatter};
