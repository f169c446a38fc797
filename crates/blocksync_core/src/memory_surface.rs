//! In-memory render surface implementation for testing.
//!
//! This provides [`InMemorySurface`], a headless implementation of
//! [`RenderSurface`] for unit tests and development. It keeps an ordered
//! block list backed by a miniature node tree (one wrapper element with
//! one content child per block, all parented under a region root), and
//! delivers a batched mutation notification after every change, the
//! same shape a host adapter around a real observation mechanism would
//! produce. Detached nodes keep their last-known parent links so the
//! translator's ancestry walk behaves like it does against a real tree.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::error::{BlocksyncError, Result};
use crate::mutation::{
    MutationBatchCallback, MutationRecord, MutationRegistry, NodeRef, SubscriptionId,
};
use crate::surface::{BlockHandle, BoxFuture, RenderSurface};
use crate::types::{BlockId, SavedBlock};

/// One displayed block.
#[derive(Debug, Clone)]
struct RenderedBlock {
    handle: BlockHandle,
    wrapper: NodeRef,
    content: NodeRef,
    block_type: String,
    data: Value,
}

#[derive(Debug)]
struct SurfaceState {
    region: NodeRef,
    blocks: Vec<RenderedBlock>,
    /// Child -> parent links. Entries survive detachment so removed
    /// nodes keep a last-known ancestry.
    parents: HashMap<NodeRef, NodeRef>,
    /// Every node ever created as a block wrapper, attached or not.
    wrappers: HashSet<NodeRef>,
    /// Correlation ids attached to wrapper elements.
    assigned: HashMap<NodeRef, BlockId>,
}

/// Headless in-memory render surface.
///
/// Thread-safe via `RwLock`; all display state is lost when dropped.
pub struct InMemorySurface {
    state: RwLock<SurfaceState>,
    subscribers: MutationRegistry,
    next_id: AtomicU64,
    ready_error: Option<String>,
}

impl InMemorySurface {
    /// Create an empty surface that reports ready immediately.
    pub fn new() -> Self {
        let next_id = AtomicU64::new(1);
        let region = NodeRef::new(next_id.fetch_add(1, Ordering::SeqCst));
        Self {
            state: RwLock::new(SurfaceState {
                region,
                blocks: Vec::new(),
                parents: HashMap::new(),
                wrappers: HashSet::new(),
                assigned: HashMap::new(),
            }),
            subscribers: MutationRegistry::new(),
            next_id,
            ready_error: None,
        }
    }

    /// Create a surface whose readiness signal fails with `reason`.
    pub fn with_ready_error(reason: impl Into<String>) -> Self {
        let mut surface = Self::new();
        surface.ready_error = Some(reason.into());
        surface
    }

    fn fresh_node(&self) -> NodeRef {
        NodeRef::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn fresh_handle(&self) -> BlockHandle {
        BlockHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// The editing region's root node.
    pub fn region_node(&self) -> NodeRef {
        self.state.read().unwrap().region
    }

    /// Wrapper element of the block at `index`.
    pub fn wrapper_node(&self, index: usize) -> Option<NodeRef> {
        let state = self.state.read().unwrap();
        state.blocks.get(index).map(|block| block.wrapper)
    }

    /// Content node of the block at `index`.
    pub fn content_node(&self, index: usize) -> Option<NodeRef> {
        let state = self.state.read().unwrap();
        state.blocks.get(index).map(|block| block.content)
    }

    /// Current payload of the block at `index`.
    pub fn block_data(&self, index: usize) -> Option<Value> {
        let state = self.state.read().unwrap();
        state.blocks.get(index).map(|block| block.data.clone())
    }

    /// Detach the content node of the block at `index`, replacing it
    /// with a fresh one. The detached node keeps its last-known parent
    /// link, like a text node removed from a live tree. Returns the
    /// detached node; no notification is emitted.
    pub fn detach_content(&self, index: usize) -> Option<NodeRef> {
        let replacement = self.fresh_node();
        let mut state = self.state.write().unwrap();
        let wrapper = state.blocks.get(index)?.wrapper;
        state.parents.insert(replacement, wrapper);
        let block = state.blocks.get_mut(index)?;
        let detached = block.content;
        block.content = replacement;
        Some(detached)
    }

    /// Deliver a raw batch to subscribers, as a host adapter would.
    pub fn emit_batch(&self, batch: &[MutationRecord]) {
        self.subscribers.emit(batch);
    }

    // ==================== User Actions ====================
    //
    // A user action lands on the surface exactly like a programmatic
    // change; the observation stream does not distinguish them. These
    // exist so tests read as what they simulate.

    /// Simulate the user creating a block at `index`.
    pub fn user_insert_block(&self, index: usize, block_type: &str, data: Value) -> Option<BlockHandle> {
        self.insert_block(block_type, data, None, index)
    }

    /// Simulate the user editing the block at `index` in place.
    pub fn user_edit_block(&self, index: usize, data: Value) {
        let content = {
            let mut state = self.state.write().unwrap();
            let Some(block) = state.blocks.get_mut(index) else {
                return;
            };
            block.data = data;
            block.content
        };
        self.subscribers
            .emit(&[MutationRecord::character_data(content)]);
    }

    /// Simulate the user deleting the block at `index`.
    pub fn user_remove_block(&self, index: usize) {
        self.delete_block(index);
    }
}

impl Default for InMemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemorySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap();
        f.debug_struct("InMemorySurface")
            .field("block_count", &state.blocks.len())
            .field("subscriber_count", &self.subscribers.subscriber_count())
            .finish()
    }
}

impl RenderSurface for InMemorySurface {
    fn ready(&self) -> BoxFuture<'_, Result<()>> {
        let result = match &self.ready_error {
            Some(reason) => Err(BlocksyncError::SurfaceReady(reason.clone())),
            None => Ok(()),
        };
        Box::pin(async move { result })
    }

    fn block_count(&self) -> usize {
        self.state.read().unwrap().blocks.len()
    }

    fn block_handle(&self, index: usize) -> Option<BlockHandle> {
        let state = self.state.read().unwrap();
        state.blocks.get(index).map(|block| block.handle)
    }

    fn index_of(&self, handle: &BlockHandle) -> Option<usize> {
        let state = self.state.read().unwrap();
        state.blocks.iter().position(|block| block.handle == *handle)
    }

    fn insert_block(
        &self,
        block_type: &str,
        data: Value,
        _caret: Option<u32>,
        index: usize,
    ) -> Option<BlockHandle> {
        let wrapper = self.fresh_node();
        let content = self.fresh_node();
        let handle = self.fresh_handle();

        let (region, next_sibling) = {
            let mut state = self.state.write().unwrap();
            let region = state.region;
            state.parents.insert(wrapper, region);
            state.parents.insert(content, wrapper);
            state.wrappers.insert(wrapper);

            let at = index.min(state.blocks.len());
            state.blocks.insert(
                at,
                RenderedBlock {
                    handle,
                    wrapper,
                    content,
                    block_type: block_type.to_string(),
                    data,
                },
            );
            let next_sibling = state.blocks.get(at + 1).map(|block| block.wrapper);
            (region, next_sibling)
        };

        // The batch a tree observer would deliver: the wrapper joining
        // the region, then the block's content being built inside it.
        let mut region_record = MutationRecord::child_list(region);
        region_record.added.push(wrapper);
        region_record.next_sibling = next_sibling;
        let mut inner_record = MutationRecord::child_list(wrapper);
        inner_record.added.push(content);
        self.subscribers.emit(&[region_record, inner_record]);

        Some(handle)
    }

    fn delete_block(&self, index: usize) {
        let emitted = {
            let mut state = self.state.write().unwrap();
            if index >= state.blocks.len() {
                log::warn!(
                    "[InMemorySurface] delete index {} out of range (len {})",
                    index,
                    state.blocks.len()
                );
                None
            } else {
                let removed = state.blocks.remove(index);
                // parents and wrappers keep their entries: the detached
                // wrapper retains last-known ancestry.
                let next_sibling = state.blocks.get(index).map(|block| block.wrapper);
                let mut record = MutationRecord::child_list(state.region);
                record.removed.push(removed.wrapper);
                record.next_sibling = next_sibling;
                Some(record)
            }
        };
        if let Some(record) = emitted {
            self.subscribers.emit(&[record]);
        }
    }

    fn save_block(&self, index: usize) -> BoxFuture<'_, Result<SavedBlock>> {
        let result = {
            let state = self.state.read().unwrap();
            match state.blocks.get(index) {
                Some(block) => Ok(SavedBlock {
                    tool: block.block_type.clone(),
                    data: block.data.clone(),
                }),
                None => Err(BlocksyncError::Save {
                    index,
                    reason: "no block at index".to_string(),
                }),
            }
        };
        Box::pin(async move { result })
    }

    fn assign_block_id(&self, index: usize, id: BlockId) {
        let mut state = self.state.write().unwrap();
        if let Some(wrapper) = state.blocks.get(index).map(|block| block.wrapper) {
            state.assigned.insert(wrapper, id);
        }
    }

    fn assigned_id(&self, element: &NodeRef) -> Option<BlockId> {
        let state = self.state.read().unwrap();
        state.assigned.get(element).copied()
    }

    fn block_elements(&self) -> Vec<NodeRef> {
        let state = self.state.read().unwrap();
        state.blocks.iter().map(|block| block.wrapper).collect()
    }

    fn resolve_block_element(&self, node: &NodeRef) -> Option<NodeRef> {
        let state = self.state.read().unwrap();
        let mut current = *node;
        loop {
            if state.wrappers.contains(&current) {
                return Some(current);
            }
            current = *state.parents.get(&current)?;
        }
    }

    fn is_block_wrapper(&self, node: &NodeRef) -> bool {
        self.state.read().unwrap().wrappers.contains(node)
    }

    fn observe_mutations(&self, callback: MutationBatchCallback) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    fn unobserve_mutations(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationKind;
    use crate::surface::block_on_test;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn collect_batches(surface: &InMemorySurface) -> Arc<Mutex<Vec<Vec<MutationRecord>>>> {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let batches_clone = Arc::clone(&batches);
        surface.observe_mutations(Arc::new(move |batch| {
            batches_clone.lock().unwrap().push(batch.to_vec());
        }));
        batches
    }

    #[test]
    fn test_ready_resolves() {
        let surface = InMemorySurface::new();
        assert!(block_on_test(surface.ready()).is_ok());
    }

    #[test]
    fn test_ready_error() {
        let surface = InMemorySurface::with_ready_error("holder missing");
        let err = block_on_test(surface.ready()).unwrap_err();
        assert!(err.to_string().contains("holder missing"));
    }

    #[test]
    fn test_insert_and_query() {
        let surface = InMemorySurface::new();
        let handle = surface
            .user_insert_block(0, "paragraph", json!({"text": "hi"}))
            .unwrap();

        assert_eq!(surface.block_count(), 1);
        assert_eq!(surface.block_handle(0), Some(handle));
        assert_eq!(surface.index_of(&handle), Some(0));
        assert_eq!(surface.block_data(0), Some(json!({"text": "hi"})));
    }

    #[test]
    fn test_insert_emits_observable_batch() {
        let surface = InMemorySurface::new();
        let batches = collect_batches(&surface);

        surface.user_insert_block(0, "paragraph", json!({}));

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, MutationKind::ChildList);
        assert_eq!(batch[0].target, surface.region_node());
        assert_eq!(batch[0].added, vec![surface.wrapper_node(0).unwrap()]);
        assert_eq!(batch[1].target, surface.wrapper_node(0).unwrap());
    }

    #[test]
    fn test_delete_emits_removal_with_next_sibling() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "paragraph", json!({"text": "a"}));
        surface.user_insert_block(1, "paragraph", json!({"text": "b"}));
        let removed_wrapper = surface.wrapper_node(0).unwrap();
        let survivor = surface.wrapper_node(1).unwrap();

        let batches = collect_batches(&surface);
        surface.user_remove_block(0);

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let record = &batches[0][0];
        assert_eq!(record.removed, vec![removed_wrapper]);
        assert_eq!(record.next_sibling, Some(survivor));
        assert_eq!(surface.block_count(), 1);
    }

    #[test]
    fn test_edit_emits_character_data() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "paragraph", json!({"text": "a"}));
        let content = surface.content_node(0).unwrap();

        let batches = collect_batches(&surface);
        surface.user_edit_block(0, json!({"text": "ab"}));

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].kind, MutationKind::CharacterData);
        assert_eq!(batches[0][0].target, content);
        assert_eq!(surface.block_data(0), Some(json!({"text": "ab"})));
    }

    #[test]
    fn test_save_block() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "header", json!({"text": "Title"}));

        let saved = block_on_test(surface.save_block(0)).unwrap();
        assert_eq!(saved.tool, "header");
        assert_eq!(saved.data, json!({"text": "Title"}));
    }

    #[test]
    fn test_save_removed_block_fails() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "paragraph", json!({}));
        surface.user_remove_block(0);

        assert!(block_on_test(surface.save_block(0)).is_err());
    }

    #[test]
    fn test_resolution_walks_to_wrapper() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "paragraph", json!({}));
        let wrapper = surface.wrapper_node(0).unwrap();
        let content = surface.content_node(0).unwrap();

        assert_eq!(surface.resolve_block_element(&content), Some(wrapper));
        assert_eq!(surface.resolve_block_element(&wrapper), Some(wrapper));
        assert_eq!(surface.resolve_block_element(&surface.region_node()), None);
    }

    #[test]
    fn test_detached_wrapper_is_still_a_wrapper() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "paragraph", json!({}));
        let wrapper = surface.wrapper_node(0).unwrap();
        surface.user_remove_block(0);

        assert!(surface.is_block_wrapper(&wrapper));
        assert!(surface.block_elements().is_empty());
    }

    #[test]
    fn test_assigned_id_round_trip() {
        let surface = InMemorySurface::new();
        surface.user_insert_block(0, "paragraph", json!({}));
        let wrapper = surface.wrapper_node(0).unwrap();
        let id = BlockId::new();

        surface.assign_block_id(0, id);
        assert_eq!(surface.assigned_id(&wrapper), Some(id));
    }

    #[test]
    fn test_unobserve_stops_delivery() {
        let surface = InMemorySurface::new();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let batches_clone = Arc::clone(&batches);
        let sub = surface.observe_mutations(Arc::new(move |batch| {
            batches_clone.lock().unwrap().push(batch.to_vec());
        }));

        assert!(surface.unobserve_mutations(sub));
        surface.user_insert_block(0, "paragraph", json!({}));

        assert!(batches.lock().unwrap().is_empty());
    }
}
