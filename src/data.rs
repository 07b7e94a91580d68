//! Observed data and the region partition.
//!
//! [`SequenceData`] bundles the per-position read counts, the convolution
//! template and the region labeling, validated once at construction. Region
//! labels must be dense, zero-based and contiguous; the contiguous index
//! ranges are collapsed here and reused unchanged for the whole run.

use ndarray::Array1;

use crate::error::{Error, Result};

/// A contiguous region sharing one `(mu, sigmasq)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: usize,
    /// Start of the region's contiguous index range.
    pub start: usize,
    /// One past the end of the region's index range.
    pub end: usize,
}

impl Region {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Immutable observed data for one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceData {
    /// Read-center counts per position.
    pub y: Array1<f64>,
    /// Odd-length convolution kernel applied to `exp(theta)`.
    pub template: Array1<f64>,
    /// Region label per position.
    pub region_types: Vec<usize>,
    /// Contiguous regions, indexed by region id.
    pub regions: Vec<Region>,
}

impl SequenceData {
    /// Validates and assembles the observed data.
    ///
    /// Fails on length mismatches, even-length templates, negative or
    /// non-finite counts, label gaps, and non-contiguous regions. None of
    /// these are handled defensively later; this is the single gate.
    pub fn new(
        y: Array1<f64>,
        template: Array1<f64>,
        region_types: Vec<usize>,
    ) -> Result<Self> {
        if y.len() != region_types.len() {
            return Err(Error::LengthMismatch {
                counts: y.len(),
                regions: region_types.len(),
            });
        }
        if template.is_empty() || template.len() % 2 == 0 {
            return Err(Error::BadTemplate(template.len()));
        }
        for (i, &c) in y.iter().enumerate() {
            if !c.is_finite() || c < 0.0 {
                return Err(Error::BadCount(i));
            }
        }

        let n_regions = region_types.iter().max().map_or(0, |&m| m + 1);
        let mut regions = Vec::with_capacity(n_regions);
        for id in 0..n_regions {
            let mut first = None;
            let mut last = 0;
            let mut count = 0usize;
            for (i, &r) in region_types.iter().enumerate() {
                if r == id {
                    first.get_or_insert(i);
                    last = i;
                    count += 1;
                }
            }
            let start = first.ok_or(Error::RegionGap(id))?;
            if last - start + 1 != count {
                return Err(Error::RegionNotContiguous(id));
            }
            regions.push(Region {
                id,
                start,
                end: last + 1,
            });
        }

        Ok(Self {
            y,
            template,
            region_types,
            regions,
        })
    }

    /// Sequence length `L`.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Template half-width `w`.
    pub fn half_width(&self) -> usize {
        self.template.len() / 2
    }

    pub fn n_regions(&self) -> usize {
        self.regions.len()
    }

    /// Region ids, dense and zero-based by construction.
    pub fn region_ids(&self) -> Vec<usize> {
        self.regions.iter().map(|r| r.id).collect()
    }
}
