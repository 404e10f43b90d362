//! Bug-report attachments assembled from log messages

use blackbox_core::{LogKind, LogMessage, LogStore};
use bytes::Bytes;

use crate::formatter::LogFormatter;

/// One file attached to an outgoing bug report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugReportAttachment {
    /// File name including extension.
    pub file_name: String,
    /// Raw file content.
    pub data: Bytes,
    /// MIME type of `data`.
    pub mime_type: String,
}

/// The attachments generated from one log store.
#[derive(Debug, Clone, Default)]
pub struct StoreAttachments {
    /// Textual rendering of every message in the store.
    pub logs: Option<BugReportAttachment>,
    /// The most recent screenshot, when requested and present.
    pub latest_screenshot: Option<BugReportAttachment>,
}

/// Render `messages` into a `text/plain` attachment, one line per message.
///
/// Returns `None` when there are no messages. The file is named `logs.txt`,
/// prefixed with `{store_name}_` when a non-empty name is given.
pub fn attachment_for_messages(
    messages: &[LogMessage],
    formatter: &dyn LogFormatter,
    store_name: Option<&str>,
) -> Option<BugReportAttachment> {
    if messages.is_empty() {
        return None;
    }

    let text = messages
        .iter()
        .map(|message| formatter.format_message(message))
        .collect::<Vec<_>>()
        .join("\n");

    Some(BugReportAttachment {
        file_name: prefixed_file_name(store_name, "logs.txt"),
        data: Bytes::from(text.into_bytes()),
        mime_type: "text/plain".to_string(),
    })
}

/// Extract the most recent screenshot in `messages` as an `image/png`
/// attachment named `screenshot.png`, prefixed with `{store_name}_` when a
/// non-empty name is given.
///
/// Returns `None` when no Screenshot-kind message carries an image.
pub fn attachment_for_latest_screenshot(
    messages: &[LogMessage],
    store_name: Option<&str>,
) -> Option<BugReportAttachment> {
    let image = messages
        .iter()
        .rev()
        .filter(|message| message.kind == LogKind::Screenshot)
        .find_map(|message| message.image.clone())?;

    Some(BugReportAttachment {
        file_name: prefixed_file_name(store_name, "screenshot.png"),
        data: image,
        mime_type: "image/png".to_string(),
    })
}

/// The most recent `count` Error-kind messages, formatted one per line,
/// oldest first. Empty when there are none.
pub fn recent_errors_text(
    messages: &[LogMessage],
    formatter: &dyn LogFormatter,
    count: usize,
) -> String {
    let errors: Vec<_> = messages
        .iter()
        .filter(|message| message.kind == LogKind::Error)
        .collect();
    let skip = errors.len().saturating_sub(count);

    errors[skip..]
        .iter()
        .map(|message| formatter.format_message(message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The most recent image in `messages`, regardless of message kind.
pub fn latest_image(messages: &[LogMessage]) -> Option<Bytes> {
    messages.iter().rev().find_map(|message| message.image.clone())
}

/// Retrieve the messages in `store` and generate its attachments in one
/// step, for bug reporters that work directly from stores.
pub async fn attachments_for_store(
    store: &LogStore,
    formatter: &dyn LogFormatter,
    include_latest_screenshot: bool,
) -> StoreAttachments {
    let messages = store.retrieve_all().await;
    let name = Some(store.name());

    StoreAttachments {
        logs: attachment_for_messages(&messages, formatter, name),
        latest_screenshot: include_latest_screenshot
            .then(|| attachment_for_latest_screenshot(&messages, name))
            .flatten(),
    }
}

fn prefixed_file_name(store_name: Option<&str>, base: &str) -> String {
    match store_name {
        Some(name) if !name.is_empty() => format!("{}_{}", name, base),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::DefaultLogFormatter;

    /// Formatter that renders just the text, keeping expectations literal.
    struct TextOnly;

    impl LogFormatter for TextOnly {
        fn format_message(&self, message: &LogMessage) -> String {
            message.text.clone()
        }
    }

    fn message(text: &str, kind: LogKind) -> LogMessage {
        LogMessage::new(text, kind)
    }

    fn screenshot(data: &'static [u8]) -> LogMessage {
        LogMessage::with_details(
            "screenshot",
            Some(Bytes::from_static(data)),
            LogKind::Screenshot,
            Default::default(),
        )
    }

    #[test]
    fn test_logs_attachment_absent_when_empty() {
        assert!(attachment_for_messages(&[], &TextOnly, Some("test")).is_none());
    }

    #[test]
    fn test_logs_attachment_joins_formatted_messages() {
        let messages = vec![
            message("Message A", LogKind::Default),
            message("Message B", LogKind::Default),
            message("Message C", LogKind::Default),
        ];

        let attachment = attachment_for_messages(&messages, &TextOnly, None).unwrap();

        assert_eq!(&attachment.data[..], b"Message A\nMessage B\nMessage C");
        assert_eq!(attachment.mime_type, "text/plain");
    }

    #[test]
    fn test_logs_attachment_file_name_prefixing() {
        let messages = vec![message("Message", LogKind::Default)];

        let unnamed = attachment_for_messages(&messages, &TextOnly, None).unwrap();
        let empty = attachment_for_messages(&messages, &TextOnly, Some("")).unwrap();
        let named = attachment_for_messages(&messages, &TextOnly, Some("Test")).unwrap();

        assert_eq!(unnamed.file_name, "logs.txt");
        assert_eq!(empty.file_name, "logs.txt");
        assert_eq!(named.file_name, "Test_logs.txt");
    }

    #[test]
    fn test_screenshot_attachment_file_name_prefixing() {
        let messages = vec![screenshot(b"\x89PNG")];

        let unnamed = attachment_for_latest_screenshot(&messages, None).unwrap();
        let empty = attachment_for_latest_screenshot(&messages, Some("")).unwrap();
        let named = attachment_for_latest_screenshot(&messages, Some("Test")).unwrap();

        assert_eq!(unnamed.file_name, "screenshot.png");
        assert_eq!(empty.file_name, "screenshot.png");
        assert_eq!(named.file_name, "Test_screenshot.png");
        assert_eq!(named.mime_type, "image/png");
    }

    #[test]
    fn test_screenshot_attachment_picks_latest_carrying_an_image() {
        let messages = vec![
            screenshot(b"old"),
            message("in between", LogKind::Default),
            screenshot(b"new"),
            // Screenshot-kind without an image must be passed over.
            message("empty capture", LogKind::Screenshot),
        ];

        let attachment = attachment_for_latest_screenshot(&messages, None).unwrap();
        assert_eq!(&attachment.data[..], b"new");
    }

    #[test]
    fn test_screenshot_attachment_absent_without_images() {
        let messages = vec![
            message("text", LogKind::Default),
            message("empty capture", LogKind::Screenshot),
        ];
        assert!(attachment_for_latest_screenshot(&messages, None).is_none());
    }

    #[test]
    fn test_recent_errors_text_keeps_last_n_oldest_first() {
        let messages = vec![
            message("error 1", LogKind::Error),
            message("fine", LogKind::Default),
            message("error 2", LogKind::Error),
            message("error 3", LogKind::Error),
        ];

        assert_eq!(
            recent_errors_text(&messages, &TextOnly, 2),
            "error 2\nerror 3"
        );
        assert_eq!(
            recent_errors_text(&messages, &TextOnly, 10),
            "error 1\nerror 2\nerror 3"
        );
        assert_eq!(recent_errors_text(&messages, &TextOnly, 0), "");
    }

    #[test]
    fn test_recent_errors_text_empty_without_errors() {
        let messages = vec![message("fine", LogKind::Default)];
        assert_eq!(recent_errors_text(&messages, &TextOnly, 3), "");
    }

    #[test]
    fn test_latest_image_ignores_kind() {
        let with_image = LogMessage::with_details(
            "inline image",
            Some(Bytes::from_static(b"jpeg")),
            LogKind::Default,
            Default::default(),
        );
        let messages = vec![screenshot(b"png"), with_image];

        assert_eq!(latest_image(&messages), Some(Bytes::from_static(b"jpeg")));
        assert_eq!(latest_image(&[]), None);
    }

    #[tokio::test]
    async fn test_attachments_for_store_round_trip() {
        use blackbox_core::LogObserver;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let store = LogStore::builder("Test")
            .path(dir.path().join("test.data"))
            .build()
            .await
            .unwrap();
        store.observe(&message("hello", LogKind::Default)).await;
        store.observe(&screenshot(b"\x89PNG")).await;

        let attachments = attachments_for_store(&store, &DefaultLogFormatter::new(), true).await;

        let logs = attachments.logs.unwrap();
        assert_eq!(logs.file_name, "Test_logs.txt");
        let text = std::str::from_utf8(&logs.data).unwrap();
        assert!(text.contains("hello"));

        let shot = attachments.latest_screenshot.unwrap();
        assert_eq!(shot.file_name, "Test_screenshot.png");
        assert_eq!(&shot.data[..], b"\x89PNG");

        let without = attachments_for_store(&store, &DefaultLogFormatter::new(), false).await;
        assert!(without.latest_screenshot.is_none());
    }
}
