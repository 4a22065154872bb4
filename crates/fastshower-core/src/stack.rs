//! Per-event particle stack.
//!
//! Every pushed particle is recorded (for end-of-event counting); those
//! flagged `to_be_tracked` are also placed on a LIFO of pending work.

use crate::id::{Pdg, TrackId};
use crate::track::{NewTrack, Track};

/// The particle stack of one event.
#[derive(Debug, Default)]
pub struct TrackStack {
    /// All particles created in this event, indexed by `TrackId`.
    particles: Vec<Track>,
    /// Ids of particles still waiting for transport (LIFO).
    pending: Vec<TrackId>,
}

impl TrackStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new particle and, if requested, queue it for transport.
    /// Returns the assigned sequence number.
    pub fn push_track(&mut self, new: NewTrack) -> TrackId {
        let id = TrackId(self.particles.len() as u32);
        if new.to_be_tracked {
            self.pending.push(id);
        }
        self.particles.push(Track {
            id,
            parent: new.parent,
            pdg: new.pdg,
            momentum: new.momentum,
            position: new.position,
            polarization: new.polarization,
            weight: new.weight,
            process: new.process,
            to_be_tracked: new.to_be_tracked,
        });
        id
    }

    /// Pop the next particle to transport.
    pub fn pop_next_track(&mut self) -> Option<Track> {
        let id = self.pending.pop()?;
        self.particles.get(id.0 as usize).cloned()
    }

    pub fn particle(&self, id: TrackId) -> Option<&Track> {
        self.particles.get(id.0 as usize)
    }

    /// Total number of particles created in this event.
    pub fn n_tracks(&self) -> usize {
        self.particles.len()
    }

    pub fn n_pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of particles of the given species created in this event.
    pub fn number_of_particles(&self, pdg: Pdg) -> usize {
        self.particles.iter().filter(|t| t.pdg == pdg).count()
    }

    pub fn particles(&self) -> &[Track] {
        &self.particles
    }

    /// Drop all particles; called at the end of each event.
    pub fn reset(&mut self) {
        self.particles.clear();
        self.pending.clear();
    }
}
