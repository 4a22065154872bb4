//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::dispatcher::StepContext;
use crate::geometry::{CalorimeterConfig, Geometry};
use crate::id::{EngineId, Pdg, TrackId, VolumeId};
use crate::registry::VolumeAssignment;
use crate::track::{FourVector, NewTrack, Process, Track, TrackState};

// ===========================================================================
// Tracks
// ===========================================================================

/// Momentum four-vector along +x for the given kinetic energy.
pub fn momentum_along_x(pdg: Pdg, kinetic_energy: f64) -> FourVector {
    let mass = pdg.mass();
    let energy = kinetic_energy + mass;
    let p = (energy * energy - mass * mass).max(0.0).sqrt();
    FourVector::new(p, 0.0, 0.0, energy)
}

/// A primary stack entry moving along +x from `position`.
pub fn new_primary(pdg: Pdg, kinetic_energy: f64, position: [f64; 3]) -> NewTrack {
    NewTrack::new(
        None,
        pdg,
        momentum_along_x(pdg, kinetic_energy),
        FourVector::new(position[0], position[1], position[2], 0.0),
        Process::Primary,
    )
}

/// A primary track with id 0 moving along +x from `position`.
pub fn track_at(pdg: Pdg, kinetic_energy: f64, position: [f64; 3]) -> Track {
    let new = new_primary(pdg, kinetic_energy, position);
    Track {
        id: TrackId(0),
        parent: None,
        pdg: new.pdg,
        momentum: new.momentum,
        position: new.position,
        polarization: new.polarization,
        weight: new.weight,
        process: new.process,
        to_be_tracked: new.to_be_tracked,
    }
}

/// A primary track with id 0 at the origin.
pub fn primary_track(pdg: Pdg, kinetic_energy: f64) -> Track {
    track_at(pdg, kinetic_energy, [0.0; 3])
}

pub fn make_state(track: Track) -> TrackState {
    TrackState::new(track)
}

// ===========================================================================
// Geometry and dispatch
// ===========================================================================

pub fn default_geometry() -> Geometry {
    Geometry::new(&CalorimeterConfig::default()).expect("default geometry is valid")
}

/// `{"ABSO": engine 1, "GAPX": engine 0}`.
pub fn split_assignment() -> VolumeAssignment {
    [
        ("ABSO".to_string(), EngineId(1)),
        ("GAPX".to_string(), EngineId(0)),
    ]
    .into_iter()
    .collect()
}

/// A plain step context: engine 0, track 0, electron, no boundary flags,
/// a step that stays inside `volume_name`.
pub fn step_context(volume_name: &str) -> StepContext<'_> {
    StepContext {
        engine: EngineId(0),
        track: TrackId(0),
        pdg: Pdg::ELECTRON,
        volume: Some(VolumeId(0)),
        volume_name,
        current_volume: Some(volume_name),
        step_number: 1,
        track_length: 0.1,
        position: FourVector::new(0.0, 0.0, 0.0, 0.0),
        momentum: FourVector::new(0.1, 0.0, 0.0, 0.1),
        is_entering: false,
        is_exiting: false,
    }
}
