//! Core types for block synchronization.
//!
//! This module defines the data structures shared by both sync directions:
//! block records as they live in the shared sequence, and the semantic
//! change descriptors produced from raw mutation notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mutation::NodeRef;

/// Synthetic identifier attached to every block record at creation time.
///
/// Identity of a record is this id and nothing else: two records with
/// identical type and data are distinct entities when their ids differ.
/// The id is minted once, carried through every copy of the record, and
/// used as the sole key of the identity map. Structural content never
/// participates in diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Uuid);

impl BlockId {
    /// Mint a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for BlockId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One block's persisted content, as stored in the shared sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Identity of this record (see [`BlockId`]).
    pub id: BlockId,

    /// Tool identifier of the block, e.g. "paragraph" or "header".
    #[serde(rename = "type")]
    pub block_type: String,

    /// Opaque structured payload owned by the block's tool.
    pub data: serde_json::Value,
}

impl BlockRecord {
    /// Create a record with a freshly minted id.
    pub fn new(block_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: BlockId::new(),
            block_type: block_type.into(),
            data,
        }
    }

    /// Create a record carrying an existing id.
    pub fn with_id(id: BlockId, block_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id,
            block_type: block_type.into(),
            data,
        }
    }
}

/// Result of the render surface's per-block save contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedBlock {
    /// Tool identifier reported by the block.
    pub tool: String,

    /// Serialized block payload.
    pub data: serde_json::Value,
}

/// Classification of one local block-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// A block appeared on the render surface.
    Add,

    /// A block (or content within it) was removed.
    Remove,

    /// A block's content changed in place.
    Update,
}

/// One semantic block-level change, produced per qualifying mutation
/// notification and consumed immediately by the local applier.
///
/// Descriptors are ephemeral and never deduplicated: several
/// notifications mapping to the same block yield several descriptors,
/// and the applier tolerates the redundancy.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDescriptor {
    /// What kind of change this is.
    pub change_type: ChangeType,

    /// The block's positional index at translation time.
    pub index: usize,

    /// The block wrapper element the change resolved to.
    pub element: NodeRef,
}

/// Which applier currently holds the reentrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Change initiated by the local user through the render surface.
    Local,

    /// Change received from the shared sequence (a remote peer).
    Remote,
}

impl std::fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOrigin::Local => write!(f, "local"),
            ChangeOrigin::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for ChangeOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ChangeOrigin::Local),
            "remote" => Ok(ChangeOrigin::Remote),
            _ => Err(format!("Unknown change origin: {}", s)),
        }
    }
}
