//! # blackbox-core
//!
//! Thread-safe log distribution and bounded persistent log stores.
//!
//! Producers hand [`LogMessage`]s to a [`LogDistributor`], which broadcasts
//! them in submission order to every registered [`LogObserver`]. The standard
//! observer is [`LogStore`]: a bounded in-memory ring mirrored into a
//! crash-tolerant on-disk archive, so the recent history of a session
//! survives restarts and can be attached to bug reports.
//!
//! ## Example
//!
//! ```rust,ignore
//! use blackbox_core::{LogStore, log, log_error};
//!
//! #[tokio::main]
//! async fn main() {
//!     // The free functions route through a process-wide distributor with
//!     // a default store, so this already persists.
//!     log("app started");
//!     log_error("flux capacitor offline");
//!
//!     // Read back what the default store holds, oldest first.
//!     if let Some(store) = blackbox_core::default_distributor().default_store().await {
//!         for message in store.retrieve_all().await {
//!             println!("{} {}", message.date, message);
//!         }
//!         store.wait_until_fully_flushed().await;
//!     }
//! }
//! ```

pub mod default;
pub mod distributor;
pub mod error;
pub mod message;
pub mod observer;
pub mod panic_hook;
pub mod store;

// Re-exports
pub use default::{
    default_distributor, log, log_detailed, log_error, log_screenshot, log_separator,
    log_with_kind, reset_default_distributor, try_default_distributor,
};
pub use distributor::{LogDistributor, LogDistributorBuilder, MessageFactory, ObserverId};
pub use error::{ArchiveError, BlackboxError, StoreError};
pub use message::{LogKind, LogMessage};
pub use observer::LogObserver;
pub use panic_hook::{disable_log_on_panic, enable_log_on_panic};
pub use store::{LogFilter, LogStore, LogStoreBuilder};
