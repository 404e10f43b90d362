//! Bounded in-memory log repository with archive-backed persistence
//!
//! A [`LogStore`] is the standard [`LogObserver`]: it keeps the most recent
//! messages in a ring, mirrors the filtered stream into a bounded on-disk
//! [`Archive`], and reloads that archive on startup so prior-session history
//! is part of the first snapshot.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use blackbox_archive::Archive;
use parking_lot::RwLock;
use tracing::warn;

use crate::distributor::LogDistributor;
use crate::error::StoreError;
use crate::message::{LogKind, LogMessage};
use crate::observer::LogObserver;

/// In-memory ring cap when none is configured.
pub const DEFAULT_MAX_MESSAGE_COUNT: usize = 2000;

/// Persisted cap when none is configured.
pub const DEFAULT_MAX_PERSISTED_COUNT: u64 = 500;

/// Predicate deciding whether a store keeps a message.
pub type LogFilter = Arc<dyn Fn(&LogMessage) -> bool + Send + Sync>;

/// A bounded repository of recent log messages.
///
/// Register it with a distributor via
/// [`add_observer`](LogDistributor::add_observer) and keep the returned
/// `Arc` alive; the distributor only holds it weakly.
pub struct LogStore {
    name: String,
    max_message_count: usize,
    archive: Archive<LogMessage>,
    messages: RwLock<VecDeque<LogMessage>>,
    filter: RwLock<Option<LogFilter>>,
    echo_to_console: AtomicBool,
    prefix_name_when_echoing: AtomicBool,
    distributor: RwLock<Option<Weak<LogDistributor>>>,
}

impl LogStore {
    /// Start configuring a store named `name`.
    ///
    /// The name labels this store in echoes and bug-report attachments, and
    /// is the stem of the default file name.
    pub fn builder(name: impl Into<String>) -> LogStoreBuilder {
        LogStoreBuilder::new(name)
    }

    /// Display label for this store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing archive file.
    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    /// In-memory ring cap.
    pub fn max_message_count(&self) -> usize {
        self.max_message_count
    }

    /// Number of messages retained on disk after a trim.
    pub fn max_persisted_count(&self) -> u64 {
        self.archive.trimmed_object_count()
    }

    /// Keep only messages `filter` accepts, starting with the next one
    /// observed.
    pub fn set_filter(&self, filter: impl Fn(&LogMessage) -> bool + Send + Sync + 'static) {
        *self.filter.write() = Some(Arc::new(filter));
    }

    /// Go back to keeping every message.
    pub fn clear_filter(&self) {
        *self.filter.write() = None;
    }

    /// Also write accepted messages to the process's diagnostic sink.
    /// Off by default.
    pub fn set_echo_to_console(&self, echo: bool) {
        self.echo_to_console.store(echo, Ordering::Relaxed);
    }

    /// Prefix echoed messages with this store's name. On by default.
    pub fn set_prefix_name_when_echoing(&self, prefix: bool) {
        self.prefix_name_when_echoing.store(prefix, Ordering::Relaxed);
    }

    /// The current ring, oldest first, after draining the distributor so
    /// that every message logged before this call is included.
    ///
    /// Must not be called from within an observer callback, which runs on
    /// the dispatch context being drained; use [`snapshot`](Self::snapshot)
    /// there.
    pub async fn retrieve_all(&self) -> Vec<LogMessage> {
        let distributor = self.distributor.read().as_ref().and_then(Weak::upgrade);
        if let Some(distributor) = distributor {
            distributor.distribute_all_pending().await;
        }
        self.snapshot()
    }

    /// The current ring, oldest first, without draining anything.
    pub fn snapshot(&self) -> Vec<LogMessage> {
        self.messages.read().iter().cloned().collect()
    }

    /// Empty the ring and the backing archive. Returns once both are empty.
    ///
    /// Messages still queued in the distributor reappear afterwards; drain
    /// it first for a clean cut.
    pub async fn clear(&self) {
        self.messages.write().clear();
        if let Err(error) = self.archive.clear().await {
            warn!(store = %self.name, error = %error, "Failed to clear archive");
        }
    }

    /// Shutdown barrier. Resolves once every message logged before this
    /// call has been observed and synced to the archive file.
    pub async fn wait_until_fully_flushed(&self) {
        let distributor = self.distributor.read().as_ref().and_then(Weak::upgrade);
        if let Some(distributor) = distributor {
            distributor.distribute_all_pending().await;
        }
        if let Err(error) = self.archive.flush().await {
            warn!(store = %self.name, error = %error, "Failed to flush archive");
        }
    }

    fn accepts(&self, message: &LogMessage) -> bool {
        // Clone the filter out so user code never runs under the lock.
        let filter = self.filter.read().clone();
        match filter {
            Some(filter) => filter(message),
            None => true,
        }
    }

    fn echo(&self, message: &LogMessage) {
        if !self.echo_to_console.load(Ordering::Relaxed) {
            return;
        }
        let prefixed = self.prefix_name_when_echoing.load(Ordering::Relaxed);
        match (message.kind, prefixed) {
            (LogKind::Error, true) => {
                tracing::error!(target: "blackbox::echo", "{}: {}", self.name, message)
            }
            (LogKind::Error, false) => tracing::error!(target: "blackbox::echo", "{}", message),
            (_, true) => tracing::info!(target: "blackbox::echo", "{}: {}", self.name, message),
            (_, false) => tracing::info!(target: "blackbox::echo", "{}", message),
        }
    }
}

#[async_trait]
impl LogObserver for LogStore {
    async fn observe(&self, message: &LogMessage) {
        if !self.accepts(message) {
            return;
        }
        self.echo(message);

        {
            let mut messages = self.messages.write();
            messages.push_back(message.clone());
            while messages.len() > self.max_message_count {
                messages.pop_front();
            }
        }

        if let Err(error) = self.archive.append(message) {
            warn!(store = %self.name, error = %error, "Failed to enqueue message for persistence");
        }
    }

    fn attach_distributor(&self, distributor: Weak<LogDistributor>) {
        *self.distributor.write() = Some(distributor);
    }

    fn detach_distributor(&self) {
        *self.distributor.write() = None;
    }
}

/// Configures a [`LogStore`].
pub struct LogStoreBuilder {
    name: String,
    path: Option<PathBuf>,
    max_message_count: usize,
    max_persisted_count: u64,
    filter: Option<LogFilter>,
    echo_to_console: bool,
    prefix_name_when_echoing: bool,
}

impl LogStoreBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            max_message_count: DEFAULT_MAX_MESSAGE_COUNT,
            max_persisted_count: DEFAULT_MAX_PERSISTED_COUNT,
            filter: None,
            echo_to_console: false,
            prefix_name_when_echoing: true,
        }
    }

    /// Back the store with the file at `path` instead of
    /// `{name}.data` in the OS temporary directory.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Cap the in-memory ring at `count` messages.
    pub fn max_message_count(mut self, count: usize) -> Self {
        self.max_message_count = count;
        self
    }

    /// Keep at least `count` messages on disk across restarts. The file may
    /// temporarily hold up to twice this before a trim.
    pub fn max_persisted_count(mut self, count: u64) -> Self {
        self.max_persisted_count = count;
        self
    }

    /// Keep only messages `filter` accepts.
    pub fn filter(mut self, filter: impl Fn(&LogMessage) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Also write accepted messages to the process's diagnostic sink.
    pub fn echo_to_console(mut self, echo: bool) -> Self {
        self.echo_to_console = echo;
        self
    }

    /// Prefix echoed messages with the store's name.
    pub fn prefix_name_when_echoing(mut self, prefix: bool) -> Self {
        self.prefix_name_when_echoing = prefix;
        self
    }

    /// Open the backing archive, reload prior-session history into the
    /// ring, and return the store.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if either cap is zero. Both are configuration bugs.
    pub async fn build(self) -> Result<Arc<LogStore>, StoreError> {
        assert!(self.max_message_count > 0, "max_message_count must be nonzero");
        assert!(
            self.max_persisted_count > 0,
            "max_persisted_count must be nonzero"
        );

        let path = self
            .path
            .unwrap_or_else(|| std::env::temp_dir().join(format!("{}.data", self.name)));
        let archive = Archive::open(
            &path,
            self.max_persisted_count.saturating_mul(2),
            self.max_persisted_count,
        )
        .await?;

        // Prime the ring before this store observes anything.
        let mut messages = VecDeque::new();
        for message in archive.read_all().await? {
            messages.push_back(message);
            if messages.len() > self.max_message_count {
                messages.pop_front();
            }
        }

        Ok(Arc::new(LogStore {
            name: self.name,
            max_message_count: self.max_message_count,
            archive,
            messages: RwLock::new(messages),
            filter: RwLock::new(self.filter),
            echo_to_console: AtomicBool::new(self.echo_to_console),
            prefix_name_when_echoing: AtomicBool::new(self.prefix_name_when_echoing),
            distributor: RwLock::new(None),
        }))
    }
}
