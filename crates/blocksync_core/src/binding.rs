//! Bidirectional binding between a render surface and a shared sequence.
//!
//! This module provides [`EditorBinding`], the synchronization context
//! pairing one render surface with one shared block sequence. Each
//! binding owns its own identity map and reentrancy guard; bindings
//! never share state, so multiple documents open at once cannot
//! cross-contaminate.
//!
//! # Data flow
//!
//! Local edit → mutation batch → translation → local applier →
//! (guarded) sequence mutation. Remote edit → deep-change notification →
//! remote applier → (guarded) surface mutation. Both appliers check the
//! guard before acting: a notification that arrives while the guard is
//! held is the echo of the other applier's own mutation.
//!
//! Because both notification streams are delivered asynchronously by
//! their subsystems, the guard alone cannot suppress every echo: a
//! guarded mutation can produce a notification delivered after the
//! guard has exited. Each applier is therefore also idempotent against
//! late echoes, correlating blocks with record ids attached to their
//! wrapper elements.

use std::sync::{Arc, Mutex};

use yrs::{Subscription, TransactionMut};

use crate::error::Result;
use crate::guard::ReentrancyGuard;
use crate::identity::IdentityMap;
use crate::mutation::{MutationRecord, SubscriptionId};
use crate::sequence::BlockSequence;
use crate::surface::RenderSurface;
use crate::translate::translate;
use crate::types::{BlockRecord, ChangeDescriptor, ChangeOrigin, ChangeType};

/// A live binding between one render surface and one shared sequence.
///
/// Created with [`bind`](EditorBinding::bind); dropping the binding
/// detaches both subscriptions and stops synchronization.
pub struct EditorBinding {
    inner: Arc<BindingInner>,
    /// Deep-change subscription; dropping it detaches the remote applier.
    _sequence_sub: Subscription,
    mutation_sub: SubscriptionId,
}

/// State shared with the observer callbacks.
struct BindingInner {
    surface: Arc<dyn RenderSurface>,
    sequence: Arc<BlockSequence>,
    map: Mutex<IdentityMap>,
    guard: ReentrancyGuard,
}

impl EditorBinding {
    /// Bind `surface` and `sequence` together.
    ///
    /// Waits for the surface's readiness signal, renders any existing
    /// sequence content wholesale, then attaches the deep-change
    /// subscription and, after a second ready wait, the mutation
    /// subscription. The ordering matters: the mutation observer must
    /// attach after initial content is rendered, or the bootstrap render
    /// would be misinterpreted as a user edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface fails to become ready. Everything
    /// past bootstrap is best-effort continuous sync and surfaces no
    /// errors to the caller.
    pub async fn bind(
        surface: Arc<dyn RenderSurface>,
        sequence: Arc<BlockSequence>,
    ) -> Result<Self> {
        surface.ready().await?;

        let inner = Arc::new(BindingInner {
            surface,
            sequence,
            map: Mutex::new(IdentityMap::new()),
            guard: ReentrancyGuard::new(),
        });

        // Bootstrap render runs before any observer attaches, so it is
        // implicitly guarded.
        inner.render_initial();

        let sequence_sub = {
            let weak = Arc::downgrade(&inner);
            inner.sequence.observe_deep(move |txn| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_remote(txn);
                }
            })
        };

        inner.surface.ready().await?;
        let mutation_sub = {
            let weak = Arc::downgrade(&inner);
            inner.surface.observe_mutations(Arc::new(move |batch| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                // Suppression window: batches emitted synchronously by a
                // guarded mutation are not translated at all.
                if !inner.guard.is_idle() {
                    return;
                }
                let descriptors = translate(inner.surface.as_ref(), batch);
                if !descriptors.is_empty() {
                    futures_lite::future::block_on(inner.apply_local(descriptors));
                }
            }))
        };

        Ok(Self {
            inner,
            _sequence_sub: sequence_sub,
            mutation_sub,
        })
    }

    /// The bound shared sequence.
    pub fn sequence(&self) -> &Arc<BlockSequence> {
        &self.inner.sequence
    }

    /// The bound render surface.
    pub fn surface(&self) -> &Arc<dyn RenderSurface> {
        &self.inner.surface
    }

    /// Whether no apply pass is currently in flight.
    pub fn is_idle(&self) -> bool {
        self.inner.guard.is_idle()
    }

    /// Number of guarded apply sections entered so far.
    ///
    /// A single user action accounts for exactly one guarded run.
    pub fn guarded_runs(&self) -> u64 {
        self.inner.guard.runs()
    }

    /// Translate and apply one mutation batch.
    ///
    /// The binding wires this into the surface's subscription on its
    /// own; async hosts that deliver batches themselves can drive it
    /// directly instead.
    pub async fn apply_mutations(&self, batch: &[MutationRecord]) {
        let descriptors = translate(self.inner.surface.as_ref(), batch);
        if !descriptors.is_empty() {
            self.inner.apply_local(descriptors).await;
        }
    }
}

impl Drop for EditorBinding {
    fn drop(&mut self) {
        self.inner.surface.unobserve_mutations(self.mutation_sub);
    }
}

impl std::fmt::Debug for EditorBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorBinding")
            .field("sequence_len", &self.inner.sequence.len())
            .field("mapped", &self.inner.map.lock().unwrap().len())
            .field("idle", &self.inner.guard.is_idle())
            .finish()
    }
}

impl BindingInner {
    /// Wholesale render of pre-existing sequence content, seeding the
    /// identity map so the first diff starts from a correct baseline.
    fn render_initial(&self) {
        let records = self.sequence.to_records();
        if records.is_empty() {
            return;
        }
        log::debug!("[EditorBinding] bootstrap render of {} block(s)", records.len());
        let mut map = self.map.lock().unwrap();
        for (index, record) in records.into_iter().enumerate() {
            match self
                .surface
                .insert_block(&record.block_type, record.data.clone(), None, index)
            {
                Some(handle) => {
                    self.surface.assign_block_id(index, record.id);
                    map.insert(record.id, handle);
                }
                None => {
                    log::warn!(
                        "[EditorBinding] surface refused bootstrap insert at {}",
                        index
                    );
                }
            }
        }
    }

    /// Remote applier: re-diff the materialized sequence against the
    /// identity map and reconcile the surface.
    fn apply_remote(&self, txn: &TransactionMut) {
        let ran = self.guard.run(ChangeOrigin::Remote, || {
            let records = self.sequence.records_in(txn);
            let mut map = self.map.lock().unwrap();
            let diff = map.diff(records.iter().map(|record| record.id));
            if diff.is_empty() {
                return;
            }
            log::debug!(
                "[EditorBinding] remote diff: {} added, {} removed",
                diff.added.len(),
                diff.removed.len()
            );

            // Removals first so insert positions computed from the
            // materialized sequence land on the settled layout.
            for id in &diff.removed {
                let Some(handle) = map.remove(id) else { continue };
                match self.surface.index_of(&handle) {
                    Some(index) => self.surface.delete_block(index),
                    None => {
                        log::warn!("[EditorBinding] removed record's block already gone: {}", id)
                    }
                }
            }

            for id in &diff.added {
                let Some(index) = records.iter().position(|record| record.id == *id) else {
                    continue;
                };
                let record = &records[index];
                match self.surface.insert_block(
                    &record.block_type,
                    record.data.clone(),
                    None,
                    index,
                ) {
                    Some(handle) => {
                        self.surface.assign_block_id(index, record.id);
                        map.insert(record.id, handle);
                    }
                    None => {
                        log::warn!("[EditorBinding] surface refused remote insert at {}", index)
                    }
                }
            }
        });
        if ran.is_none() {
            // Notification produced by our own guarded mutation.
            log::trace!("[EditorBinding] deep-change ignored inside guarded apply");
        }
    }

    /// Local applier: consume one translation pass in order, awaiting
    /// each block's serialization before the next so the indices stay
    /// honest while the surface keeps mutating.
    async fn apply_local(&self, descriptors: Vec<ChangeDescriptor>) {
        if let Some(origin) = self.guard.current() {
            log::debug!(
                "[EditorBinding] ignoring {} descriptor(s) observed during {} apply",
                descriptors.len(),
                origin
            );
            return;
        }
        for descriptor in descriptors {
            self.apply_descriptor(descriptor).await;
        }
    }

    async fn apply_descriptor(&self, descriptor: ChangeDescriptor) {
        let ChangeDescriptor {
            change_type,
            index,
            element,
        } = descriptor;

        match change_type {
            ChangeType::Add => {
                // Late echo of a remote insert: the wrapper already
                // correlates with a live record.
                if let Some(id) = self.surface.assigned_id(&element)
                    && self.map.lock().unwrap().contains(&id)
                {
                    log::debug!("[EditorBinding] add echo for mapped record {}, skipping", id);
                    return;
                }
                let Some(saved) = self.save_or_skip(index).await else {
                    return;
                };
                let record = BlockRecord::new(saved.tool, saved.data);
                let ran = self.guard.run(ChangeOrigin::Local, || {
                    self.surface.assign_block_id(index, record.id);
                    self.sequence.insert(index, std::slice::from_ref(&record));
                    if let Some(handle) = self.surface.block_handle(index) {
                        self.map.lock().unwrap().insert(record.id, handle);
                    }
                });
                if ran.is_none() {
                    log::warn!("[EditorBinding] dropped local add at {}: apply in flight", index);
                }
            }
            ChangeType::Remove => {
                // Late echo of a remote removal: the wrapper's record is
                // already gone from the map.
                if let Some(id) = self.surface.assigned_id(&element)
                    && !self.map.lock().unwrap().contains(&id)
                {
                    log::debug!(
                        "[EditorBinding] remove echo for unmapped record {}, skipping",
                        id
                    );
                    return;
                }
                let ran = self.guard.run(ChangeOrigin::Local, || {
                    let records = self.sequence.to_records();
                    let Some(record) = records.get(index) else {
                        log::warn!(
                            "[EditorBinding] stale remove index {} (len {})",
                            index,
                            records.len()
                        );
                        return;
                    };
                    let id = record.id;
                    self.sequence.remove(index);
                    self.map.lock().unwrap().remove(&id);
                });
                if ran.is_none() {
                    log::warn!(
                        "[EditorBinding] dropped local remove at {}: apply in flight",
                        index
                    );
                }
            }
            ChangeType::Update => {
                let Some(saved) = self.save_or_skip(index).await else {
                    return;
                };
                // Update is delete+insert of a freshly identified
                // record, not an in-place patch; peers re-render it as a
                // simultaneous remove and add.
                let record = BlockRecord::new(saved.tool, saved.data);
                let ran = self.guard.run(ChangeOrigin::Local, || {
                    let records = self.sequence.to_records();
                    let Some(old) = records.get(index) else {
                        log::warn!(
                            "[EditorBinding] stale update index {} (len {})",
                            index,
                            records.len()
                        );
                        return;
                    };
                    let old_id = old.id;
                    self.map.lock().unwrap().remove(&old_id);
                    self.sequence.remove(index);
                    self.sequence.insert(index, std::slice::from_ref(&record));
                    self.surface.assign_block_id(index, record.id);
                    if let Some(handle) = self.surface.block_handle(index) {
                        self.map.lock().unwrap().insert(record.id, handle);
                    }
                });
                if ran.is_none() {
                    log::warn!(
                        "[EditorBinding] dropped local update at {}: apply in flight",
                        index
                    );
                }
            }
        }
    }

    /// Serialize the block at `index`, skipping the descriptor when the
    /// save contract fails (the block may have raced with removal).
    async fn save_or_skip(&self, index: usize) -> Option<crate::types::SavedBlock> {
        match self.surface.save_block(index).await {
            Ok(saved) => Some(saved),
            Err(e) => {
                log::warn!("[EditorBinding] skipping unserializable block: {}", e);
                None
            }
        }
    }
}
