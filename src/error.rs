use std::time::Duration;
use thiserror::Error;
use crate::extent::Axis;




/**
 * Error to represent a failed AMR operation. Everything here is a
 * precondition violation or a communication failure: the operation that
 * returned it was abandoned. Per-block problems that leave the rest of a
 * hierarchy usable are reported through `ghost::StripReport` and
 * `ghost::BlankReport` instead.
 */
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid extent {0:?}: a minimum exceeds its maximum")]
    InvalidExtent([i64; 6]),

    #[error("no global extent has been set")]
    NoGlobalExtent,

    #[error("the extent has not been partitioned")]
    NotPartitioned,

    #[error("partition index {index} out of range (0..{count})")]
    PartitionOutOfRange { index: usize, count: usize },

    #[error("extent {extent:?} cannot be bisected into {requested} partitions")]
    ExtentTooSmall { extent: [i64; 6], requested: usize },

    #[error("{num_levels} levels requested but {given} per-level block counts given")]
    LevelCountMismatch { num_levels: usize, given: usize },

    #[error("level {level} out of range ({num_levels} levels)")]
    LevelOutOfRange { level: usize, num_levels: usize },

    #[error("block {index} out of range on level {level} ({count} blocks)")]
    BlockOutOfRange { level: usize, index: usize, count: usize },

    #[error("composite index {index} out of range ({count} blocks)")]
    CompositeIndexOutOfRange { index: usize, count: usize },

    #[error("refinement ratio must be at least 2, got {0}")]
    InvalidRefinementRatio(i64),

    #[error("inconsistent metadata for block ({level}, {block}): {reason}")]
    InconsistentMetadata { level: usize, block: usize, reason: String },

    #[error("field array '{name}' holds {len} values, expected {expected}")]
    FieldSizeMismatch { name: String, len: usize, expected: usize },

    #[error("field array '{0}' has zero components")]
    ZeroComponents(String),

    #[error("the hierarchy has no cells along axis {0:?}")]
    DegenerateAxis(Axis),

    #[error("owner map covers {len} blocks, the hierarchy has {expected}")]
    OwnerMapMismatch { len: usize, expected: usize },

    #[error("no communicator has been configured")]
    NoCommunicator,

    #[error("communication failure: {0}")]
    Communication(String),

    #[error("timed out after {0:?} waiting on a collective")]
    CollectiveTimeout(Duration),

    #[error("failed to allocate {0} values for a trimmed grid")]
    Allocation(usize),

    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),
}




pub type Result<T, E = Error> = std::result::Result<T, E>;
