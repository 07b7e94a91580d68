//! Crate-wide error type.
//!
//! Input-consistency problems (mismatched lengths, malformed region labels,
//! bad configuration) are fatal and surface before any sampling begins.
//! Numeric problems inside a block (non-positive-definite information,
//! overflow-prone proposals, a non-converging mode search) are *not* errors
//! at this level: the worker handles them by rejecting the block.

use thiserror::Error;

/// Error type for invalid inputs and failed runs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("counts have length {counts} but region labels have length {regions}")]
    LengthMismatch { counts: usize, regions: usize },

    #[error("template must have odd length >= 1, got {0}")]
    BadTemplate(usize),

    #[error("region labels must be dense and zero-based: no position has label {0}")]
    RegionGap(usize),

    #[error("region {0} is not a contiguous span of positions")]
    RegionNotContiguous(usize),

    #[error("count at position {0} is negative or non-finite")]
    BadCount(usize),

    #[error("initial theta at position {0} is not finite")]
    NonFiniteTheta(usize),

    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error("block width {block_width} must exceed twice the template half-width {half_width}")]
    BlockTooNarrow {
        block_width: usize,
        half_width: usize,
    },

    #[error("worker channel disconnected mid-run")]
    WorkerDisconnected,

    #[error("mode search did not converge within {0} Newton iterations")]
    NoConvergence(usize),

    #[error("sigmasq draw for region {0} is not finite")]
    DegenerateDraw(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
