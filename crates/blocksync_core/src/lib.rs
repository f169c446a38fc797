#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Binding between a render surface and a shared sequence
pub mod binding;

/// JSON ↔ shared-structure conversion
pub mod convert;

/// Error (common error types)
pub mod error;

/// Reentrancy guard (feedback-loop suppression)
pub mod guard;

/// Identity map between records and rendered blocks
pub mod identity;

/// In-memory render surface for tests and development
pub mod memory_surface;

/// Abstract tree-mutation notifications
pub mod mutation;

/// Shared block sequence (CRDT-backed)
pub mod sequence;

/// Render surface abstraction
pub mod surface;

/// Mutation-to-change translation
pub mod translate;

/// Core types (records, descriptors, origins)
pub mod types;

pub use binding::EditorBinding;
pub use error::{BlocksyncError, Result};
pub use guard::ReentrancyGuard;
pub use identity::{IdentityMap, SequenceDiff};
pub use memory_surface::InMemorySurface;
pub use mutation::{
    MutationBatchCallback, MutationKind, MutationRecord, MutationRegistry, NodeRef, SubscriptionId,
};
pub use sequence::BlockSequence;
pub use surface::{BlockHandle, BoxFuture, RenderSurface};
pub use translate::translate;
pub use types::{BlockId, BlockRecord, ChangeDescriptor, ChangeOrigin, ChangeType, SavedBlock};
