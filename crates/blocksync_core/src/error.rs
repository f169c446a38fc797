use thiserror::Error;

/// Unified error type for blocksync operations
#[derive(Debug, Error)]
pub enum BlocksyncError {
    /// The render surface never became ready. This is the only failure a
    /// caller of [`EditorBinding::bind`](crate::EditorBinding::bind) sees;
    /// everything past bootstrap is best-effort continuous sync.
    #[error("render surface failed to become ready: {0}")]
    SurfaceReady(String),

    /// A block's save contract failed, e.g. the block raced with removal
    /// before serialization ran. The local applier skips the descriptor
    /// rather than propagating this.
    #[error("failed to save block at index {index}: {reason}")]
    Save {
        /// Display index the save was issued against.
        index: usize,
        /// Why the surface could not serialize the block.
        reason: String,
    },

    /// A shared-sequence entry did not decode into a block record.
    #[error("malformed block record: {0}")]
    MalformedRecord(String),

    /// Error from the underlying CRDT engine (update decode/apply).
    #[error("CRDT error: {0}")]
    Crdt(String),
}

/// Result type alias for blocksync operations
pub type Result<T> = std::result::Result<T, BlocksyncError>;
