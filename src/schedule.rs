//! Block covering schedules for the distributed theta update.
//!
//! A single fixed partition leaves the positions near every block edge
//! permanently under-sampled: the interior subset of a block excludes its
//! outer `w` positions. The double scan runs two interleaved partitions,
//! offset by half a block width, so every non-boundary position is strictly
//! interior to at least one block. The combined start list is permuted with
//! the coordinator's seeded RNG each iteration to avoid ordering artifacts.

use rand::seq::SliceRandom;
use rand::Rng;

/// Start offsets of the two interleaved scans over `[0, len)`.
pub fn double_scan(len: usize, block_width: usize) -> Vec<usize> {
    let mut starts: Vec<usize> = (0..len).step_by(block_width).collect();
    starts.extend((block_width / 2..len).step_by(block_width));
    starts
}

/// Double-scan starts, permuted uniformly at random.
pub fn shuffled_schedule<R: Rng>(len: usize, block_width: usize, rng: &mut R) -> Vec<usize> {
    let mut starts = double_scan(len, block_width);
    starts.shuffle(rng);
    starts
}

/// The non-overlapping output range of the block starting at `start`.
pub fn output_range(start: usize, block_width: usize, len: usize) -> std::ops::Range<usize> {
    start..(start + block_width).min(len)
}

/// The range of positions strictly interior to the block at `start`, i.e.
/// those whose likelihood terms are unaffected by edge truncation. Positions
/// within `w` of the global boundary count as interior at that boundary.
pub fn interior_range(
    start: usize,
    block_width: usize,
    len: usize,
    half_width: usize,
) -> std::ops::Range<usize> {
    let end = (start + block_width).min(len);
    let lo = if start == 0 { 0 } else { start + half_width };
    let hi = if end == len { len } else { end - half_width };
    lo..hi.max(lo)
}
