//! The seam between the distributor and its consumers

use std::sync::Weak;

use async_trait::async_trait;

use crate::distributor::LogDistributor;
use crate::message::LogMessage;

/// A consumer of distributed log messages.
///
/// `observe` is invoked on the distributor's dispatch context, one message at
/// a time, in submission order. Implementations must not block the context on
/// their own I/O; hand slow work to another task instead.
///
/// Observers are held weakly by the distributor. One that has been dropped is
/// pruned on the next broadcast, so unregistering is only needed for timely
/// reclamation.
#[async_trait]
pub trait LogObserver: Send + Sync {
    /// Handle one broadcast message.
    async fn observe(&self, message: &LogMessage);

    /// Called when this observer is registered with a distributor. Stores
    /// keep the handle so flushing can drain the distributor first.
    fn attach_distributor(&self, _distributor: Weak<LogDistributor>) {}

    /// Called when this observer is removed from a distributor.
    fn detach_distributor(&self) {}
}
