//! Abstract tree-mutation notifications.
//!
//! The engine never touches a concrete DOM API. Instead, render surfaces
//! deliver batches of [`MutationRecord`]s, a minimal notification shape
//! that any host environment's tree-observation mechanism (a browser
//! `MutationObserver`, a native widget tree, a headless test surface)
//! can be adapted to.
//!
//! Batches are delivered in order to subscribers registered through a
//! [`MutationRegistry`], which render surface implementations embed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Opaque host-assigned handle to one node of the render surface's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u64);

impl NodeRef {
    /// Wrap a host-assigned raw node id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw node id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Granularity of one mutation notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added to or removed from the target node.
    ChildList,

    /// The target node's character data changed.
    CharacterData,

    /// An attribute changed on the target node.
    Attributes,
}

/// One raw mutation notification, in delivery order within its batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// What kind of mutation occurred.
    pub kind: MutationKind,

    /// The node the mutation happened on. For removed text nodes this
    /// node may no longer have a live tree position; the surface keeps
    /// its last-known ancestry resolvable.
    pub target: NodeRef,

    /// Nodes added by this mutation.
    pub added: Vec<NodeRef>,

    /// Nodes removed by this mutation.
    pub removed: Vec<NodeRef>,

    /// The removed/added nodes' next sibling at mutation time, when the
    /// host mechanism reports one. Used to position removals whose
    /// subject is no longer in the tree.
    pub next_sibling: Option<NodeRef>,
}

impl MutationRecord {
    /// A child-list mutation with no added or removed nodes filled in.
    pub fn child_list(target: NodeRef) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            next_sibling: None,
        }
    }

    /// A character-data mutation on `target`.
    pub fn character_data(target: NodeRef) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            next_sibling: None,
        }
    }

    /// An attribute mutation on `target`.
    pub fn attributes(target: NodeRef) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            next_sibling: None,
        }
    }
}

/// A unique identifier for a mutation subscription.
pub type SubscriptionId = u64;

/// Callback type for mutation batches.
///
/// Callbacks receive the ordered batch and should not block for extended
/// periods.
pub type MutationBatchCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// Thread-safe registry for mutation-batch subscriptions.
///
/// Render surface implementations embed one of these and call
/// [`emit`](MutationRegistry::emit) after every tree change, the way a
/// host observation mechanism would deliver a settled batch.
pub struct MutationRegistry {
    /// Map of subscription IDs to callbacks.
    callbacks: RwLock<HashMap<SubscriptionId, MutationBatchCallback>>,
    /// Counter for generating unique subscription IDs.
    next_id: AtomicU64,
}

impl MutationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to mutation batches.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: MutationBatchCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.insert(id, callback);
        id
    }

    /// Unsubscribe from mutation batches.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.remove(&id).is_some()
    }

    /// Emit one batch to all registered callbacks.
    ///
    /// Callbacks are invoked synchronously in an undefined order.
    /// If a callback panics, it does not affect other callbacks.
    pub fn emit(&self, batch: &[MutationRecord]) {
        if batch.is_empty() {
            return;
        }
        let callbacks = self.callbacks.read().unwrap();
        for callback in callbacks.values() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(batch);
            }));
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let callbacks = self.callbacks.read().unwrap();
        callbacks.len()
    }

    /// Check if there are any active subscriptions.
    pub fn has_subscribers(&self) -> bool {
        let callbacks = self.callbacks.read().unwrap();
        !callbacks.is_empty()
    }
}

impl Default for MutationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MutationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let callbacks = self.callbacks.read().unwrap();
        f.debug_struct("MutationRegistry")
            .field("subscriber_count", &callbacks.len())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_batch() -> Vec<MutationRecord> {
        vec![MutationRecord::character_data(NodeRef::new(7))]
    }

    #[test]
    fn test_subscribe_and_emit() {
        let registry = MutationRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _id = registry.subscribe(Arc::new(move |batch| {
            counter_clone.fetch_add(batch.len(), Ordering::SeqCst);
        }));

        assert_eq!(registry.subscriber_count(), 1);

        registry.emit(&sample_batch());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = MutationRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let id = registry.subscribe(Arc::new(move |_batch| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(!registry.has_subscribers());

        registry.emit(&sample_batch());

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_batch_not_delivered() {
        let registry = MutationRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        registry.subscribe(Arc::new(move |_batch| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&[]);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_panic_isolation() {
        let registry = MutationRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.subscribe(Arc::new(|_| {
            panic!("Test panic");
        }));

        let counter_clone = Arc::clone(&counter);
        registry.subscribe(Arc::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&sample_batch());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unique_subscription_ids() {
        let registry = MutationRegistry::new();

        let id1 = registry.subscribe(Arc::new(|_| {}));
        let id2 = registry.subscribe(Arc::new(|_| {}));

        assert_ne!(id1, id2);
    }
}
