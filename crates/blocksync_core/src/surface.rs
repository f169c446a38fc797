//! Render surface abstraction.
//!
//! The render surface is supplied externally: it owns block rendering,
//! caret handling, and per-block serialization. The engine drives it
//! exclusively through [`RenderSurface`], which captures the capability
//! set the synchronization algorithm needs: positional block access,
//! insert/delete, asynchronous save, and an observable editing region.
//!
//! ## Object safety
//!
//! `RenderSurface` is designed to be object-safe so it can be used
//! behind `dyn RenderSurface`. To enable this, async methods return
//! boxed futures.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::Result;
use crate::mutation::{MutationBatchCallback, NodeRef, SubscriptionId};
use crate::types::{BlockId, SavedBlock};

/// A boxed future for object-safe async methods.
///
/// On native targets, futures are `Send` for compatibility with
/// multi-threaded runtimes.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed future for object-safe async methods.
///
/// WASM version without `Send` requirement - JavaScript is single-threaded.
#[cfg(target_arch = "wasm32")]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

#[cfg(test)]
pub(crate) fn block_on_test<F: Future>(f: F) -> F::Output {
    futures_lite::future::block_on(f)
}

/// Opaque handle to one block currently displayed on the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle(u64);

impl BlockHandle {
    /// Wrap a surface-assigned raw handle.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Capability set required from a render surface.
///
/// Implementations adapt a concrete editing host (a browser block
/// editor, a native widget, the in-memory surface shipped with this
/// crate) to the synchronization engine. All positional indices refer to
/// the surface's current display order.
pub trait RenderSurface: Send + Sync {
    /// One-time readiness signal.
    ///
    /// Resolves once the surface can accept block operations, and
    /// immediately on every later call. A readiness failure is the only
    /// user-visible error of the binding.
    fn ready(&self) -> BoxFuture<'_, Result<()>>;

    /// Number of blocks currently displayed.
    fn block_count(&self) -> usize;

    /// Handle of the block displayed at `index`.
    fn block_handle(&self, index: usize) -> Option<BlockHandle>;

    /// Current display index of `handle`, if it is still displayed.
    fn index_of(&self, handle: &BlockHandle) -> Option<usize>;

    /// Insert a new block of `block_type` with `data` at `index`.
    ///
    /// `caret` optionally positions the caret inside the new block.
    /// Returns the new block's handle, or `None` if the surface refused
    /// the insert.
    fn insert_block(
        &self,
        block_type: &str,
        data: Value,
        caret: Option<u32>,
        index: usize,
    ) -> Option<BlockHandle>;

    /// Delete the block displayed at `index`.
    fn delete_block(&self, index: usize);

    /// Serialize the block at `index` through its save contract.
    ///
    /// May legitimately fail when the block raced with removal; callers
    /// skip the change rather than propagate.
    fn save_block(&self, index: usize) -> BoxFuture<'_, Result<SavedBlock>>;

    /// Attach a record id to the wrapper of the block at `index`, for
    /// later correlation of mutation notifications with records.
    fn assign_block_id(&self, index: usize, id: BlockId);

    /// The record id previously attached to `element`, if any.
    fn assigned_id(&self, element: &NodeRef) -> Option<BlockId>;

    /// The ordered block-wrapper elements of the editing region.
    fn block_elements(&self) -> Vec<NodeRef>;

    /// Nearest enclosing block wrapper of `node`, walking up the tree.
    ///
    /// For nodes with no live tree position (removed text nodes lose
    /// their ancestry) the walk starts from the node's last-known
    /// parent. Returns `None` when the node is outside the editing
    /// region.
    fn resolve_block_element(&self, node: &NodeRef) -> Option<NodeRef>;

    /// Whether `node` is itself a block wrapper element.
    fn is_block_wrapper(&self, node: &NodeRef) -> bool;

    /// Subscribe to batched mutation notifications for the editing
    /// region.
    fn observe_mutations(&self, callback: MutationBatchCallback) -> SubscriptionId;

    /// Remove a mutation subscription.
    ///
    /// Returns `true` if the subscription was found and removed.
    fn unobserve_mutations(&self, id: SubscriptionId) -> bool;
}
