//! Particles in flight.
//!
//! A [`Track`] is the record pushed onto the stack when a particle is
//! created. A [`TrackState`] is the live snapshot an engine transports: the
//! track with its current kinematics plus step bookkeeping. The snapshot is
//! exactly what crosses engines on a hand-off.

use serde::{Deserialize, Serialize};

use crate::id::{Pdg, TrackId, VolumeId};

// ---------------------------------------------------------------------------
// FourVector
// ---------------------------------------------------------------------------

/// A Lorentz four-vector. For momenta `(px, py, pz, E)` in GeV, for
/// positions `(x, y, z, t)` in cm and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl FourVector {
    pub fn new(x: f64, y: f64, z: f64, t: f64) -> Self {
        Self { x, y, z, t }
    }

    /// The spatial part.
    pub fn vec3(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Magnitude of the spatial part.
    pub fn mag3(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit direction of the spatial part, or `None` for a null vector.
    pub fn direction(&self) -> Option<[f64; 3]> {
        let mag = self.mag3();
        if mag <= 0.0 {
            return None;
        }
        Some([self.x / mag, self.y / mag, self.z / mag])
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// The process that created a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Process {
    Primary,
    Bremsstrahlung,
    PairProduction,
    Ionisation,
    Decay,
    FastSimulation,
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// A particle as recorded on the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    /// `None` for primaries.
    pub parent: Option<TrackId>,
    pub pdg: Pdg,
    pub momentum: FourVector,
    pub position: FourVector,
    pub polarization: [f64; 3],
    pub weight: f64,
    pub process: Process,
    pub to_be_tracked: bool,
}

impl Track {
    /// Parent sequence number with the conventional `-1` for primaries.
    pub fn parent_number(&self) -> i64 {
        self.parent.map(|p| p.0 as i64).unwrap_or(-1)
    }

    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    /// Kinetic energy in GeV (never negative).
    pub fn kinetic_energy(&self) -> f64 {
        (self.momentum.t - self.pdg.mass()).max(0.0)
    }
}

/// Everything needed to push a new particle; the stack assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub parent: Option<TrackId>,
    pub pdg: Pdg,
    pub momentum: FourVector,
    pub position: FourVector,
    pub polarization: [f64; 3],
    pub weight: f64,
    pub process: Process,
    pub to_be_tracked: bool,
}

impl NewTrack {
    /// A to-be-tracked particle with unit weight and no polarization.
    pub fn new(
        parent: Option<TrackId>,
        pdg: Pdg,
        momentum: FourVector,
        position: FourVector,
        process: Process,
    ) -> Self {
        Self {
            parent,
            pdg,
            momentum,
            position,
            polarization: [0.0; 3],
            weight: 1.0,
            process,
            to_be_tracked: true,
        }
    }

    /// Build a secondary from a kinetic energy and a unit direction.
    pub fn secondary(
        parent: TrackId,
        pdg: Pdg,
        kinetic_energy: f64,
        direction: [f64; 3],
        position: FourVector,
        process: Process,
    ) -> Self {
        let mass = pdg.mass();
        let energy = kinetic_energy + mass;
        let p = (energy * energy - mass * mass).max(0.0).sqrt();
        let momentum = FourVector::new(p * direction[0], p * direction[1], p * direction[2], energy);
        Self::new(Some(parent), pdg, momentum, position, process)
    }
}

// ---------------------------------------------------------------------------
// TrackState
// ---------------------------------------------------------------------------

/// The live transport snapshot of a track.
///
/// Owned by exactly one engine at a time. On a hand-off the snapshot moves
/// into a transfer request unchanged, so the receiving engine resumes from
/// the same momentum, position and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub track: Track,
    /// Number of completed steps.
    pub step_number: u32,
    /// Accumulated path length in cm.
    pub length: f64,
    /// Volume the track currently sits in, if it has been located.
    pub volume: Option<VolumeId>,
    /// The previous step ended on a volume boundary, so the next step is an
    /// entering step.
    pub on_boundary: bool,
    /// Set once the track must receive no further steps.
    pub stopped: bool,
}

impl TrackState {
    /// Start transporting a freshly popped track.
    pub fn new(track: Track) -> Self {
        Self {
            track,
            step_number: 0,
            length: 0.0,
            volume: None,
            on_boundary: false,
            stopped: false,
        }
    }

    pub fn id(&self) -> TrackId {
        self.track.id
    }

    pub fn pdg(&self) -> Pdg {
        self.track.pdg
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.track.kinetic_energy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_of_null_vector_is_none() {
        assert!(FourVector::default().direction().is_none());
        let d = FourVector::new(3.0, 0.0, 4.0, 0.0).direction().unwrap();
        assert!((d[0] - 0.6).abs() < 1e-12);
        assert!((d[2] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn secondary_momentum_matches_energy() {
        let new = NewTrack::secondary(
            TrackId(0),
            Pdg::ELECTRON,
            1.0,
            [1.0, 0.0, 0.0],
            FourVector::default(),
            Process::PairProduction,
        );
        let m = Pdg::ELECTRON.mass();
        let e = new.momentum.t;
        let p = new.momentum.mag3();
        assert!((e - (1.0 + m)).abs() < 1e-12);
        assert!((e * e - p * p - m * m).abs() < 1e-9);
        assert_eq!(new.parent, Some(TrackId(0)));
    }

    #[test]
    fn primary_parent_number_is_minus_one() {
        let track = Track {
            id: TrackId(0),
            parent: None,
            pdg: Pdg::GAMMA,
            momentum: FourVector::new(1.0, 0.0, 0.0, 1.0),
            position: FourVector::default(),
            polarization: [0.0; 3],
            weight: 1.0,
            process: Process::Primary,
            to_be_tracked: true,
        };
        assert_eq!(track.parent_number(), -1);
        assert!(track.is_primary());
        assert!((track.kinetic_energy() - 1.0).abs() < 1e-12);
    }
}
