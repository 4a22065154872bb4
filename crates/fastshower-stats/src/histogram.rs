//! Fixed-binning histograms.
//!
//! Bins are half-open `[lower, upper)`: a value exactly on an interior edge
//! lands in the upper bin, values below the range in the underflow and
//! values at or above the upper limit in the overflow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Errors raised when combining histograms.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistogramError {
    #[error("histogram '{name}': binning differs, cannot merge")]
    BinningMismatch { name: String },
    #[error("histogram '{name}' needs at least one bin and lower < upper")]
    BadAxis { name: String },
}

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

/// Where a value falls on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinIndex {
    Underflow,
    Bin(usize),
    Overflow,
}

/// Uniform binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub bins: usize,
    pub lower: f64,
    pub upper: f64,
    /// Optional per-bin labels (engine or volume names).
    pub labels: Vec<String>,
}

impl Axis {
    pub fn new(bins: usize, lower: f64, upper: f64) -> Self {
        Self {
            bins,
            lower,
            upper,
            labels: Vec::new(),
        }
    }

    /// Unit-width bins `[0, 1), [1, 2), ...` labelled by name.
    pub fn labelled(labels: Vec<String>) -> Self {
        let bins = labels.len().max(1);
        Self {
            bins,
            lower: 0.0,
            upper: bins as f64,
            labels,
        }
    }

    fn is_valid(&self) -> bool {
        self.bins > 0 && self.lower < self.upper
    }

    pub fn width(&self) -> f64 {
        (self.upper - self.lower) / self.bins as f64
    }

    pub fn low_edge(&self, bin: usize) -> f64 {
        if bin >= self.bins {
            return self.upper;
        }
        self.lower + (self.upper - self.lower) * bin as f64 / self.bins as f64
    }

    pub fn centre(&self, bin: usize) -> f64 {
        self.low_edge(bin) + 0.5 * self.width()
    }

    /// Locate a value. NaN counts as overflow.
    pub fn find_bin(&self, x: f64) -> BinIndex {
        if x < self.lower {
            return BinIndex::Underflow;
        }
        if !(x < self.upper) {
            return BinIndex::Overflow;
        }
        let scaled = (x - self.lower) * self.bins as f64 / (self.upper - self.lower);
        let mut bin = (scaled.floor() as usize).min(self.bins - 1);
        // Correct rounding at the edges so the half-open rule holds exactly.
        if bin + 1 < self.bins && x >= self.low_edge(bin + 1) {
            bin += 1;
        } else if bin > 0 && x < self.low_edge(bin) {
            bin -= 1;
        }
        BinIndex::Bin(bin)
    }

    /// Same number of bins and range; labels are ignored.
    pub fn same_binning(&self, other: &Axis) -> bool {
        self.bins == other.bins && self.lower == other.lower && self.upper == other.upper
    }
}

// ---------------------------------------------------------------------------
// H1
// ---------------------------------------------------------------------------

/// One-dimensional histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct H1 {
    pub name: String,
    pub title: String,
    pub axis: Axis,
    pub contents: Vec<f64>,
    pub underflow: f64,
    pub overflow: f64,
    pub entries: u64,
    /// Sums over in-range fills for mean and RMS.
    sum_w: f64,
    sum_wx: f64,
    sum_wx2: f64,
}

impl H1 {
    pub fn new(name: &str, title: &str, bins: usize, lower: f64, upper: f64) -> Self {
        Self::with_axis(name, title, Axis::new(bins, lower, upper))
    }

    pub fn with_axis(name: &str, title: &str, axis: Axis) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            contents: vec![0.0; axis.bins],
            axis,
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
            sum_wx2: 0.0,
        }
    }

    /// Check the axis; histograms read from files may be malformed.
    pub fn validate(&self) -> Result<(), HistogramError> {
        if !self.axis.is_valid() || self.contents.len() != self.axis.bins {
            return Err(HistogramError::BadAxis {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        self.entries += 1;
        match self.axis.find_bin(x) {
            BinIndex::Underflow => self.underflow += w,
            BinIndex::Overflow => self.overflow += w,
            BinIndex::Bin(bin) => {
                self.contents[bin] += w;
                self.sum_w += w;
                self.sum_wx += w * x;
                self.sum_wx2 += w * x * x;
            }
        }
    }

    pub fn content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 {
            return 0.0;
        }
        self.sum_wx / self.sum_w
    }

    pub fn std_dev(&self) -> f64 {
        if self.sum_w == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_wx2 / self.sum_w - mean * mean).max(0.0).sqrt()
    }

    /// Index of the highest bin.
    pub fn maximum_bin(&self) -> usize {
        self.contents
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
            .0
    }

    /// Add another histogram with identical binning.
    pub fn merge(&mut self, other: &H1) -> Result<(), HistogramError> {
        if !self.axis.same_binning(&other.axis) {
            return Err(HistogramError::BinningMismatch {
                name: self.name.clone(),
            });
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        self.sum_w += other.sum_w;
        self.sum_wx += other.sum_wx;
        self.sum_wx2 += other.sum_wx2;
        Ok(())
    }

    /// Histogram of a per-event count sequence: unit bins from 0, content =
    /// number of events with that count.
    pub fn multiplicity(name: &str, title: &str, values: &[u32]) -> Self {
        let max = values.iter().copied().max().unwrap_or(0) as usize;
        let mut hist = Self::new(name, title, max + 1, 0.0, (max + 1) as f64);
        for &v in values {
            hist.fill(v as f64);
        }
        hist
    }
}

// ---------------------------------------------------------------------------
// H2
// ---------------------------------------------------------------------------

/// Two-dimensional histogram, row-major over (x, y).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct H2 {
    pub name: String,
    pub title: String,
    pub x: Axis,
    pub y: Axis,
    pub contents: Vec<f64>,
    /// Weight of fills outside either axis.
    pub out_of_range: f64,
    pub entries: u64,
}

impl H2 {
    pub fn new(name: &str, title: &str, x: Axis, y: Axis) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            contents: vec![0.0; x.bins * y.bins],
            x,
            y,
            out_of_range: 0.0,
            entries: 0,
        }
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        self.entries += 1;
        match (self.x.find_bin(x), self.y.find_bin(y)) {
            (BinIndex::Bin(i), BinIndex::Bin(j)) => self.contents[i * self.y.bins + j] += 1.0,
            _ => self.out_of_range += 1.0,
        }
    }

    pub fn content(&self, i: usize, j: usize) -> f64 {
        if i >= self.x.bins || j >= self.y.bins {
            return 0.0;
        }
        self.contents[i * self.y.bins + j]
    }

    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    pub fn merge(&mut self, other: &H2) -> Result<(), HistogramError> {
        if !self.x.same_binning(&other.x) || !self.y.same_binning(&other.y) {
            return Err(HistogramError::BinningMismatch {
                name: self.name.clone(),
            });
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        self.out_of_range += other.out_of_range;
        self.entries += other.entries;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpeciesCounts
// ---------------------------------------------------------------------------

/// Counts keyed by PDG code, iterated in ascending code order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesCounts {
    pub name: String,
    pub counts: BTreeMap<i32, u64>,
}

impl SpeciesCounts {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counts: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, pdg: i32) {
        *self.counts.entry(pdg).or_default() += 1;
    }

    pub fn get(&self, pdg: i32) -> u64 {
        self.counts.get(&pdg).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &SpeciesCounts) {
        for (&pdg, &n) in &other.counts {
            *self.counts.entry(pdg).or_default() += n;
        }
    }

    /// Copy keeping only `|pdg| <= limit`. A negative limit keeps nothing.
    pub fn filtered(&self, limit: i32) -> Self {
        Self {
            name: self.name.clone(),
            counts: self
                .counts
                .iter()
                .filter(|(pdg, _)| i64::from(pdg.unsigned_abs()) <= i64::from(limit))
                .map(|(&pdg, &n)| (pdg, n))
                .collect(),
        }
    }
}
