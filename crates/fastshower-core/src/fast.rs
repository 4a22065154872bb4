//! The fast parametric engine.
//!
//! Instead of stepping, the fast engine answers a handed-off track with one
//! stochastic response: a particle multiplicity drawn from a cumulative
//! table built from a previous run, and a single Gaussian energy hit. The
//! track ends in the fast engine.

use serde::{Deserialize, Serialize};

use crate::id::Pdg;
use crate::rng::SimRng;
use crate::track::TrackState;

// ---------------------------------------------------------------------------
// CumulativeTable
// ---------------------------------------------------------------------------

/// Errors raised when a probability table cannot be built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("histogram has no bins")]
    Empty,
    #[error("bin {bin} has negative content {value}")]
    Negative { bin: usize, value: f64 },
    #[error("bin {bin} content is not finite")]
    NotFinite { bin: usize },
    #[error("passed histogram was empty (all bins zero)")]
    ZeroSum,
}

/// Cumulative bin edges of a discrete distribution: `[0, c1, ..., 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeTable {
    edges: Vec<f64>,
}

impl CumulativeTable {
    /// Normalize bin contents into cumulative edges. The last edge is
    /// exactly 1.
    pub fn from_bin_contents(contents: &[f64]) -> Result<Self, TableError> {
        if contents.is_empty() {
            return Err(TableError::Empty);
        }
        for (bin, &value) in contents.iter().enumerate() {
            if !value.is_finite() {
                return Err(TableError::NotFinite { bin });
            }
            if value < 0.0 {
                return Err(TableError::Negative { bin, value });
            }
        }
        let sum: f64 = contents.iter().sum();
        if sum <= 0.0 {
            return Err(TableError::ZeroSum);
        }

        let mut edges = Vec::with_capacity(contents.len() + 1);
        edges.push(0.0);
        let mut running = 0.0;
        for &value in contents {
            running += value;
            edges.push((running / sum).min(1.0));
        }
        if let Some(last) = edges.last_mut() {
            *last = 1.0;
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin index for a uniform draw `u`: the bin with
    /// `edges[i] <= u < edges[i + 1]`. Values outside `[0, 1)` clamp.
    pub fn sample(&self, u: f64) -> usize {
        let upper = self.edges.partition_point(|&edge| edge <= u);
        upper.saturating_sub(1).min(self.n_bins() - 1)
    }
}

// ---------------------------------------------------------------------------
// FastShower
// ---------------------------------------------------------------------------

/// Parameters of the parametric response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastShowerParams {
    /// Rest mass of the synthesized particles, GeV.
    pub mass: f64,
    /// Mean fraction of the entry kinetic energy deposited.
    pub deposit_fraction: f64,
    /// Stochastic resolution, GeV^(1/2).
    pub resolution: f64,
    /// Only this species produces a hit; any species when `None`.
    pub trigger_species: Option<Pdg>,
}

impl Default for FastShowerParams {
    fn default() -> Self {
        Self {
            mass: 0.510_999_06e-3,
            deposit_fraction: 0.9,
            resolution: 0.1,
            trigger_species: None,
        }
    }
}

/// What the fast engine synthesized for one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastResponse {
    pub multiplicity: u32,
    /// Deposited energy, GeV; zero when no hit was produced.
    pub edep: f64,
    pub hit: bool,
}

/// Fast parametric engine.
#[derive(Debug, Clone)]
pub struct FastShower {
    table: CumulativeTable,
    params: FastShowerParams,
}

impl FastShower {
    pub fn new(table: CumulativeTable, params: FastShowerParams) -> Self {
        Self { table, params }
    }

    pub fn table(&self) -> &CumulativeTable {
        &self.table
    }

    /// Synthesize the response to a track from its entry state.
    pub fn process(&self, state: &TrackState, rng: &mut SimRng) -> FastResponse {
        if let Some(trigger) = self.params.trigger_species {
            if state.pdg() != trigger {
                return FastResponse {
                    multiplicity: 0,
                    edep: 0.0,
                    hit: false,
                };
            }
        }

        let ekin = state.kinetic_energy();
        let mut multiplicity = self.table.sample(rng.uniform()) as u32;
        if self.params.mass > 0.0 {
            let affordable = (state.track.momentum.t / self.params.mass).floor();
            multiplicity = multiplicity.min(affordable.max(0.0) as u32);
        }

        let mean = self.params.deposit_fraction * ekin;
        let sigma = self.params.resolution * ekin.sqrt();
        let edep = rng.normal(mean, sigma).clamp(0.0, ekin);
        FastResponse {
            multiplicity,
            edep,
            hit: true,
        }
    }
}
