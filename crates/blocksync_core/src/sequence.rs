//! Shared block sequence.
//!
//! This module provides [`BlockSequence`], which wraps a yrs [`Doc`] to
//! hold the replicated, ordered list of block records.
//!
//! # Structure
//!
//! The document contains a single Y.Array called "blocks"; each entry is
//! a shared map with the record's id, type and payload, the payload
//! stored as nested shared types (see [`crate::convert`]):
//!
//! ```text
//! Y.Doc
//! └── Y.Array "blocks"
//!     ├── Y.Map { id: "…", type: "paragraph", data: Y.Map { text: Y.Text } }
//!     └── …
//! ```
//!
//! # Synchronization
//!
//! Merge semantics and replication belong to yrs. Use
//! [`encode_state_vector`](BlockSequence::encode_state_vector),
//! [`encode_state_as_update`](BlockSequence::encode_state_as_update) and
//! [`apply_update`](BlockSequence::apply_update) to exchange state with
//! peers; the deep-change stream fires after any local or remote
//! mutation, and observers re-diff the materialized contents rather than
//! trusting delta details.

use std::collections::HashMap;
use std::sync::Arc;

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::types::ToJson;
use yrs::{
    Any, Array, ArrayRef, DeepObservable, Doc, In, MapPrelim, ReadTxn, StateVector, Subscription,
    Transact, TransactionMut, Update,
};

use crate::convert::{json_to_shared, shared_to_json};
use crate::error::{BlocksyncError, Result};
use crate::types::BlockRecord;

/// The name of the Y.Array containing block records.
const BLOCKS_ARRAY_NAME: &str = "blocks";

/// The replicated, ordered sequence of block records.
///
/// This wraps a yrs [`Doc`] and provides positional access plus the
/// deep-change notification stream the binding subscribes to.
pub struct BlockSequence {
    /// The underlying yrs document
    doc: Doc,

    /// Reference to the blocks array (cached for efficiency)
    blocks: ArrayRef,
}

impl BlockSequence {
    /// Create a new empty block sequence.
    pub fn new() -> Self {
        Self::with_doc(Doc::new())
    }

    /// Wrap an existing document, e.g. one already attached to a
    /// replication provider.
    pub fn with_doc(doc: Doc) -> Self {
        let blocks = doc.get_or_insert_array(BLOCKS_ARRAY_NAME);
        Self { doc, blocks }
    }

    /// Get the underlying yrs document.
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Number of records in the sequence.
    pub fn len(&self) -> usize {
        let txn = self.doc.transact();
        self.blocks.len(&txn) as usize
    }

    /// Whether the sequence holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ==================== Materialization ====================

    /// Materialize the current contents as an ordered list of records.
    pub fn to_records(&self) -> Vec<BlockRecord> {
        let txn = self.doc.transact();
        self.records_in(&txn)
    }

    /// Materialize through an existing transaction.
    ///
    /// Observers must read through the transaction they were delivered;
    /// opening a fresh one inside a deep-change callback would deadlock.
    pub fn records_in<T: ReadTxn>(&self, txn: &T) -> Vec<BlockRecord> {
        let Any::Array(items) = self.blocks.to_json(txn) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match record_from_any(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("[BlockSequence] skipping sequence entry: {}", e);
                    None
                }
            })
            .collect()
    }

    // ==================== Positional Mutation ====================

    /// Insert records at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, records: &[BlockRecord]) {
        let mut txn = self.doc.transact_mut();
        let len = self.blocks.len(&txn) as usize;
        let mut at = index.min(len);
        for record in records {
            self.blocks.insert(&mut txn, at as u32, record_to_prelim(record));
            at += 1;
        }
    }

    /// Delete the record at `index`.
    ///
    /// Out-of-range indices are ignored with a warning; a missed event
    /// must not halt future synchronization.
    pub fn remove(&self, index: usize) {
        let mut txn = self.doc.transact_mut();
        let len = self.blocks.len(&txn) as usize;
        if index < len {
            self.blocks.remove(&mut txn, index as u32);
        } else {
            log::warn!(
                "[BlockSequence] remove index {} out of range (len {})",
                index,
                len
            );
        }
    }

    // ==================== Observation ====================

    /// Observe deep changes to the sequence, including nested payloads.
    ///
    /// The callback fires after any local or remote mutation and
    /// receives the committing transaction; materialize through it with
    /// [`records_in`](Self::records_in).
    pub fn observe_deep<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TransactionMut) + Send + Sync + 'static,
    {
        self.blocks.observe_deep(move |txn, _events| {
            callback(txn);
        })
    }

    // ==================== Sync Operations ====================

    /// Encode the current state vector for sync.
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the full state as an update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the diff between current state and a remote state vector.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| BlocksyncError::Crdt(format!("Failed to decode state vector: {}", e)))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Apply an update from a remote peer.
    ///
    /// Observers fire as part of the applying transaction.
    pub fn apply_update(&self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| BlocksyncError::Crdt(format!("Failed to decode update: {}", e)))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| BlocksyncError::Crdt(format!("Failed to apply update: {}", e)))
    }
}

impl Default for BlockSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BlockSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSequence")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Build the nested shared-type prelim for one record.
fn record_to_prelim(record: &BlockRecord) -> In {
    let mut fields: HashMap<Arc<str>, In> = HashMap::new();
    fields.insert(Arc::from("id"), In::Any(Any::from(record.id.to_string())));
    fields.insert(
        Arc::from("type"),
        In::Any(Any::from(record.block_type.clone())),
    );
    fields.insert(Arc::from("data"), json_to_shared(&record.data));
    In::Map(MapPrelim::from_iter(fields))
}

/// Decode one materialized sequence entry back into a record.
fn record_from_any(any: &Any) -> Result<BlockRecord> {
    let value = shared_to_json(any);
    serde_json::from_value(value).map_err(|e| BlocksyncError::MalformedRecord(e.to_string()))
}
