//! Error types for settings, partitioning and placement

use thiserror::Error;

use crate::sim::PartitionId;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors for the motion engine.
///
/// Everything here is raised while building a session or placing a trial,
/// never mid-frame. Numerical edge cases inside the engine are resolved by
/// fallback rules instead of errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings that cannot describe a runnable experiment.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Partition split producing an empty grid or zero-size cells.
    #[error("degenerate partition grid: {0}")]
    DegeneratePartition(String),

    /// The occupancy grid ran out of legal cells during placement.
    #[error(
        "placement exhausted in partition {partition}: placed {placed} of {requested} stimuli"
    )]
    PlacementExhausted {
        partition: PartitionId,
        placed: usize,
        requested: usize,
    },

    /// Trial data was requested before any trial was started.
    #[error("no trial has been started")]
    NoTrial,

    /// Settings file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
