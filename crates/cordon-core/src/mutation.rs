//! Change feed for document mutations.
//!
//! The [`MutationFeed`] is the subscription primitive the engine consumes:
//! structural changes (nodes added) and attribute changes (with the old
//! value) are collected by the document and delivered to subscribers in
//! batches at a queue checkpoint, never re-entrantly inside the mutating
//! call. This mirrors the browser `MutationObserver` contract the engine
//! was designed against.
//!
//! Subscribing returns a [`SubscriptionId`] handle; dropping a consumer
//! without unsubscribing leaks only the callback slot, and re-subscribing
//! is always safe: each subscription is independent and misses no batches
//! delivered after it was created.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::document::ElementId;

new_key_type! {
    /// A unique identifier for a mutation-feed subscription.
    ///
    /// Returned by [`MutationFeed::subscribe`]; pass it to
    /// [`MutationFeed::unsubscribe`] to stop receiving batches.
    pub struct SubscriptionId;
}

/// A single observed document mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// One or more nodes were inserted into the tree.
    ///
    /// `added` lists the roots of the inserted subtrees; descendants are
    /// not listed individually (consumers walk them as needed). Non-element
    /// nodes may appear here and must be ignored by consumers that only
    /// care about elements.
    ChildrenAdded {
        /// Roots of the inserted subtrees, in insertion order.
        added: Vec<ElementId>,
    },
    /// An attribute changed on an element.
    AttributeChanged {
        /// The element whose attribute changed.
        target: ElementId,
        /// The attribute name.
        name: String,
        /// The attribute value before the change; `None` if it was absent.
        old_value: Option<String>,
    },
}

/// A subscriber callback invoked with each delivered batch.
type Subscriber = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// The mutation change feed.
///
/// Cheap to clone; all clones share the same subscriber table. The document
/// owns one feed and delivers batches into it; any number of engine
/// instances (or diagnostics) may subscribe concurrently.
#[derive(Clone, Default)]
pub struct MutationFeed {
    subscribers: Arc<Mutex<SlotMap<SubscriptionId, Subscriber>>>,
}

impl MutationFeed {
    /// Create a feed with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback to receive mutation batches.
    ///
    /// Returns a [`SubscriptionId`] used to unsubscribe later. The callback
    /// may itself mutate the document; the resulting records are delivered
    /// in a later batch, not recursively.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[MutationRecord]) + Send + Sync + 'static,
    {
        self.subscribers.lock().insert(Arc::new(callback))
    }

    /// Remove a subscription.
    ///
    /// Returns `true` if the subscription existed and was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().remove(id).is_some()
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver a batch to every subscriber.
    ///
    /// Callbacks are invoked outside the subscriber lock, so a callback may
    /// subscribe or unsubscribe without deadlocking; such changes take
    /// effect for the *next* batch.
    #[tracing::instrument(skip_all, target = "cordon_core::mutation", level = "trace")]
    pub fn deliver(&self, batch: &[MutationRecord]) {
        if batch.is_empty() {
            return;
        }
        let subscribers: Vec<Subscriber> = self.subscribers.lock().values().cloned().collect();
        tracing::trace!(
            target: "cordon_core::mutation",
            records = batch.len(),
            subscribers = subscribers.len(),
            "delivering mutation batch"
        );
        for subscriber in subscribers {
            subscriber(batch);
        }
    }
}

impl fmt::Debug for MutationFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationFeed")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
