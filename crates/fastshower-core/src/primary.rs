//! Primary particle generation.

use crate::config::PrimaryConfig;
use crate::geometry::Geometry;
use crate::id::{Pdg, TrackId};
use crate::rng::SimRng;
use crate::stack::TrackStack;
use crate::track::{FourVector, NewTrack, Process};

/// Shoots primaries from the world's -x face along +x.
#[derive(Debug, Clone)]
pub struct PrimaryGenerator {
    pub species: Pdg,
    /// Kinetic energy, GeV.
    pub kinetic_energy: f64,
    pub per_event: u32,
    /// Half-width of uniform smearing in y and z, cm.
    pub transverse_spread: f64,
}

impl From<&PrimaryConfig> for PrimaryGenerator {
    fn from(config: &PrimaryConfig) -> Self {
        Self {
            species: config.species,
            kinetic_energy: config.kinetic_energy,
            per_event: config.per_event,
            transverse_spread: config.transverse_spread,
        }
    }
}

impl PrimaryGenerator {
    /// Push this event's primaries. Returns their ids.
    pub fn generate(
        &self,
        stack: &mut TrackStack,
        geometry: &Geometry,
        rng: &mut SimRng,
    ) -> Vec<TrackId> {
        let mass = self.species.mass();
        let energy = self.kinetic_energy + mass;
        let p = (energy * energy - mass * mass).max(0.0).sqrt();
        let x = -geometry.world_size_x() / 2.0;
        // Keep smeared points strictly inside the calorimeter face.
        let limit = (geometry.calor_size_yz() / 2.0) * (1.0 - 1e-9);
        let spread = self.transverse_spread.min(limit);

        (0..self.per_event)
            .map(|_| {
                let (y, z) = if spread > 0.0 {
                    (
                        spread * (2.0 * rng.uniform() - 1.0),
                        spread * (2.0 * rng.uniform() - 1.0),
                    )
                } else {
                    (0.0, 0.0)
                };
                stack.push_track(NewTrack::new(
                    None,
                    self.species,
                    FourVector::new(p, 0.0, 0.0, energy),
                    FourVector::new(x, y, z, 0.0),
                    Process::Primary,
                ))
            })
            .collect()
    }
}
