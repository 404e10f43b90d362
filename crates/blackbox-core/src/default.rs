//! The process-wide distributor and the free logging functions
//!
//! Most applications log through one distributor. [`default_distributor`]
//! lazily creates it with a default store backed by `blackbox.data` in the
//! OS temporary directory, and the free functions below route through it, so
//! `blackbox_core::log("...")` persists somewhere with no wiring at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::distributor::LogDistributor;
use crate::message::LogKind;

static DEFAULT_DISTRIBUTOR: RwLock<Option<Arc<LogDistributor>>> = RwLock::new(None);

/// The process-wide distributor, created on first access.
///
/// Must be called within a tokio runtime the first time; afterwards the
/// cached handle is returned from anywhere.
pub fn default_distributor() -> Arc<LogDistributor> {
    if let Some(distributor) = &*DEFAULT_DISTRIBUTOR.read() {
        return distributor.clone();
    }

    let mut slot = DEFAULT_DISTRIBUTOR.write();
    if let Some(distributor) = &*slot {
        return distributor.clone();
    }
    let distributor = LogDistributor::builder()
        .default_store_path(std::env::temp_dir().join("blackbox.data"))
        .build();
    *slot = Some(distributor.clone());
    distributor
}

/// The process-wide distributor, if one has been created.
///
/// Unlike [`default_distributor`] this never creates it, so it is safe to
/// call outside a tokio runtime.
pub fn try_default_distributor() -> Option<Arc<LogDistributor>> {
    DEFAULT_DISTRIBUTOR.read().clone()
}

/// Drop the process-wide distributor so the next access creates a fresh one.
///
/// For tests. Callers wanting the old distributor's writes on disk flush its
/// stores first.
pub fn reset_default_distributor() {
    *DEFAULT_DISTRIBUTOR.write() = None;
}

/// Log plain text through the process-wide distributor.
pub fn log(text: impl Into<String>) {
    default_distributor().log(text);
}

/// Log text under an explicit kind through the process-wide distributor.
pub fn log_with_kind(text: impl Into<String>, kind: LogKind) {
    default_distributor().log_with_kind(text, kind);
}

/// Log a fully specified message through the process-wide distributor.
pub fn log_detailed(
    text: impl Into<String>,
    image: Option<Bytes>,
    kind: LogKind,
    parameters: BTreeMap<String, String>,
) {
    default_distributor().log_detailed(text, image, kind, parameters);
}

/// Log an encoded screenshot through the process-wide distributor.
pub fn log_screenshot(image: Bytes) {
    default_distributor().log_screenshot(image);
}

/// Log a visual divider through the process-wide distributor.
pub fn log_separator() {
    default_distributor().log_separator();
}

/// Log error text through the process-wide distributor.
pub fn log_error(text: impl Into<String>) {
    default_distributor().log_error(text);
}
