//! Thread-safe fan-out of log messages to registered observers
//!
//! A [`LogDistributor`] owns a dispatch task fed by an unbounded command
//! channel. Every submission, registration change, and barrier flows through
//! that one channel, so any two observers see the same messages in the same
//! order, and an observer deterministically either sees or does not see a
//! message relative to its own registration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::message::{LogKind, LogMessage};
use crate::observer::LogObserver;
use crate::store::LogStore;

/// Name given to a lazily created default store, and stem of its file name.
const DEFAULT_STORE_NAME: &str = "blackbox";

/// Hook run over every message built by the convenience logging methods
/// before it is distributed. [`LogDistributor::distribute`] bypasses it.
pub type MessageFactory = Arc<dyn Fn(LogMessage) -> LogMessage + Send + Sync>;

/// Token identifying one observer registration, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

enum Command {
    Distribute(LogMessage),
    AddObserver(ObserverId, Weak<dyn LogObserver>),
    RemoveObserver(ObserverId),
    SetDefaultStore(Option<Arc<LogStore>>),
    EnsureDefaultStore(oneshot::Sender<Option<Arc<LogStore>>>),
    Barrier(oneshot::Sender<()>),
}

/// The publish/subscribe hub for log messages.
///
/// Handles are `Send + Sync`; producers call from any thread. Observers are
/// held weakly and invoked one at a time on the dispatch task, in submission
/// order. Dropping the last handle shuts the task down after it drains
/// outstanding work.
pub struct LogDistributor {
    tx: mpsc::UnboundedSender<Command>,
    message_factory: RwLock<Option<MessageFactory>>,
}

impl LogDistributor {
    /// Create a distributor with no message factory and no default store.
    ///
    /// Must be called within a tokio runtime.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Start configuring a distributor.
    pub fn builder() -> LogDistributorBuilder {
        LogDistributorBuilder::new()
    }

    /// Broadcast `message` to every registered observer, exactly as given.
    ///
    /// Returns as soon as the message is enqueued; delivery happens on the
    /// dispatch task. The message factory is not applied here.
    pub fn distribute(&self, message: LogMessage) {
        self.send(Command::Distribute(message));
    }

    /// Log plain text.
    pub fn log(&self, text: impl Into<String>) {
        self.log_with_kind(text, LogKind::Default);
    }

    /// Log text under an explicit kind.
    pub fn log_with_kind(&self, text: impl Into<String>, kind: LogKind) {
        self.distribute_built(LogMessage::new(text, kind));
    }

    /// Log a fully specified message.
    pub fn log_detailed(
        &self,
        text: impl Into<String>,
        image: Option<Bytes>,
        kind: LogKind,
        parameters: BTreeMap<String, String>,
    ) {
        self.distribute_built(LogMessage::with_details(text, image, kind, parameters));
    }

    /// Log an encoded screenshot.
    pub fn log_screenshot(&self, image: Bytes) {
        self.distribute_built(LogMessage::with_details(
            "screenshot",
            Some(image),
            LogKind::Screenshot,
            BTreeMap::new(),
        ));
    }

    /// Log a visual divider between groups of messages.
    pub fn log_separator(&self) {
        self.log_with_kind("", LogKind::Separator);
    }

    /// Log error text.
    pub fn log_error(&self, text: impl Into<String>) {
        self.log_with_kind(text, LogKind::Error);
    }

    /// Replace the message factory applied by the convenience logging
    /// methods. `None` removes it.
    pub fn set_message_factory(&self, factory: Option<MessageFactory>) {
        *self.message_factory.write() = factory;
    }

    /// Register `observer` for future broadcasts.
    ///
    /// Only a weak handle is kept; a dropped observer is pruned on the next
    /// broadcast. The returned token identifies this registration to
    /// [`remove_observer`](Self::remove_observer). Messages enqueued before
    /// this call are not delivered to `observer`.
    ///
    /// The attach hook runs before this returns, so a store can drain the
    /// distributor from the moment it is added.
    pub fn add_observer<O>(self: &Arc<Self>, observer: &Arc<O>) -> ObserverId
    where
        O: LogObserver + 'static,
    {
        let id = ObserverId::next();
        observer.attach_distributor(Arc::downgrade(self));
        let weak = Arc::downgrade(observer);
        let observer: Weak<dyn LogObserver> = weak;
        self.send(Command::AddObserver(id, observer));
        id
    }

    /// Unregister the observer added under `id`. Messages enqueued after
    /// this call are not delivered to it.
    pub fn remove_observer(&self, id: ObserverId) {
        self.send(Command::RemoveObserver(id));
    }

    /// Replace or disable this distributor's default store.
    ///
    /// `None` disables it. Either way, lazy creation of a built-in default
    /// store is turned off. The previous default store, if any, stops
    /// observing once this call is processed; the new one is attached
    /// before this returns, like [`add_observer`](Self::add_observer).
    pub fn set_default_store(self: &Arc<Self>, store: Option<Arc<LogStore>>) {
        if let Some(store) = &store {
            store.attach_distributor(Arc::downgrade(self));
        }
        self.send(Command::SetDefaultStore(store));
    }

    /// The store the convenience logging methods persist into.
    ///
    /// Creates the store on first access when this distributor was built
    /// with a default store path and none has been set explicitly. Returns
    /// `None` when the default store is disabled or failed to open.
    pub async fn default_store(&self) -> Option<Arc<LogStore>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::EnsureDefaultStore(reply_tx));
        reply_rx.await.ok().flatten()
    }

    /// Resolve once every message submitted before this call has been
    /// delivered to every observer registered at its submission.
    ///
    /// Guarantees delivery only; archive writes triggered by delivery are
    /// asynchronous and covered by the store flush instead. Must not be
    /// awaited from within an observer callback, which runs on the dispatch
    /// task this barrier waits for.
    pub async fn distribute_all_pending(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Barrier(reply_tx));
        let _ = reply_rx.await;
    }

    fn distribute_built(&self, message: LogMessage) {
        self.distribute(self.apply_factory(message));
    }

    fn apply_factory(&self, message: LogMessage) -> LogMessage {
        // Clone the factory out so user code never runs under the lock.
        let factory = self.message_factory.read().clone();
        match factory {
            Some(factory) => factory(message),
            None => message,
        }
    }

    fn send(&self, command: Command) {
        // Fails only if the dispatch task died, e.g. an observer panicked.
        if self.tx.send(command).is_err() {
            warn!("Dispatch task is gone, dropping command");
        }
    }
}

/// Configures a [`LogDistributor`].
#[derive(Default)]
pub struct LogDistributorBuilder {
    message_factory: Option<MessageFactory>,
    default_store_path: Option<PathBuf>,
}

impl LogDistributorBuilder {
    /// Create a builder with no factory and no default store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every convenience-built message through `factory` before
    /// distribution.
    pub fn message_factory(
        mut self,
        factory: impl Fn(LogMessage) -> LogMessage + Send + Sync + 'static,
    ) -> Self {
        self.message_factory = Some(Arc::new(factory));
        self
    }

    /// Lazily open a default store backed by `path` the first time a message
    /// is distributed or the store is asked for.
    pub fn default_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_store_path = Some(path.into());
        self
    }

    /// Build the distributor and spawn its dispatch task.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Arc<LogDistributor> {
        Arc::new_cyclic(|distributor: &Weak<LogDistributor>| {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = DispatchWorker {
                distributor: distributor.clone(),
                observers: Vec::new(),
                default_store: None,
                lazy_store_path: self.default_store_path,
            };
            tokio::spawn(worker.run(rx));

            LogDistributor {
                tx,
                message_factory: RwLock::new(self.message_factory),
            }
        })
    }
}

struct DispatchWorker {
    distributor: Weak<LogDistributor>,
    observers: Vec<(ObserverId, Weak<dyn LogObserver>)>,
    default_store: Option<(ObserverId, Arc<LogStore>)>,
    /// Present until the built-in default store is created or customized.
    lazy_store_path: Option<PathBuf>,
}

impl DispatchWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Distribute(message) => {
                    self.ensure_default_store().await;
                    self.broadcast(&message).await;
                }
                Command::AddObserver(id, observer) => self.observers.push((id, observer)),
                Command::RemoveObserver(id) => self.remove(id),
                Command::SetDefaultStore(store) => self.set_default_store(store),
                Command::EnsureDefaultStore(reply) => {
                    self.ensure_default_store().await;
                    let store = self.default_store.as_ref().map(|(_, store)| store.clone());
                    let _ = reply.send(store);
                }
                Command::Barrier(reply) => {
                    let _ = reply.send(());
                }
            }
        }

        debug!("Dispatch task exiting");
    }

    async fn broadcast(&mut self, message: &LogMessage) {
        let mut saw_dropped = false;
        for (_, observer) in &self.observers {
            match observer.upgrade() {
                Some(observer) => observer.observe(message).await,
                None => saw_dropped = true,
            }
        }

        if saw_dropped {
            let before = self.observers.len();
            self.observers
                .retain(|(_, observer)| observer.strong_count() > 0);
            debug!(
                pruned = before - self.observers.len(),
                "Pruned dropped observers"
            );
        }
    }

    fn remove(&mut self, id: ObserverId) {
        let Some(index) = self.observers.iter().position(|(oid, _)| *oid == id) else {
            return;
        };
        let (_, observer) = self.observers.remove(index);
        if let Some(observer) = observer.upgrade() {
            observer.detach_distributor();
        }
    }

    /// Open the built-in default store if one is still pending. A single
    /// failed attempt disables it.
    async fn ensure_default_store(&mut self) {
        if self.default_store.is_some() {
            return;
        }
        let Some(path) = self.lazy_store_path.take() else {
            return;
        };

        match LogStore::builder(DEFAULT_STORE_NAME).path(&path).build().await {
            Ok(store) => self.attach_default_store(store),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to open default log store"
                );
            }
        }
    }

    fn attach_default_store(&mut self, store: Arc<LogStore>) {
        let id = ObserverId::next();
        store.attach_distributor(self.distributor.clone());
        let weak = Arc::downgrade(&store);
        let observer: Weak<dyn LogObserver> = weak;
        self.observers.push((id, observer));
        self.default_store = Some((id, store));
    }

    fn set_default_store(&mut self, store: Option<Arc<LogStore>>) {
        self.lazy_store_path = None;
        if let Some((id, store)) = self.default_store.take() {
            // Remove first so the detach hook still finds a live observer.
            self.remove(id);
            drop(store);
        }
        if let Some(store) = store {
            self.attach_default_store(store);
        }
    }
}
