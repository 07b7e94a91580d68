//! The coordinator/worker command protocol.
//!
//! Commands travel over one channel per worker; results come back over a
//! single shared channel. The tag space is closed: workers decode commands
//! with an exhaustive match, and an unexpected channel closure terminates the
//! worker loop.

use ndarray::Array1;
use std::sync::Arc;

/// A command from the coordinator to one worker.
#[derive(Debug, Clone)]
pub enum Command {
    /// Replace all local parameter snapshots at the start of a sweep.
    Sync {
        theta: Arc<Array1<f64>>,
        mu: Arc<Array1<f64>>,
        sigmasq: Arc<Array1<f64>>,
    },
    /// Sample the block whose output range begins at `start`.
    Work { start: usize },
    /// Refresh the stale theta snapshot mid-sweep.
    Update { theta: Arc<Array1<f64>> },
    /// Terminate the worker loop.
    Stop,
}

/// A completed block, sent from a worker to the coordinator.
///
/// The coordinator resolves the target range from its assignment table, not
/// from this message, so results may arrive in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockResult {
    /// Index of the sending worker.
    pub worker: usize,
    /// Values for the block's non-overlapping output range.
    pub values: Vec<f64>,
    /// Whether the proposal was accepted; rejected blocks carry the prior
    /// values unchanged.
    pub accepted: bool,
}
