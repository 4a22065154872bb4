//! Typed transport events.
//!
//! The dispatcher and the application emit [`Event`]s into an
//! [`EventBuffer`]; the tally accumulator consumes them.

use serde::{Deserialize, Serialize};

use crate::id::{EngineId, Pdg, TrackId, VolumeId};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Something worth tallying that happened during transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A completed step, emitted for every dispatcher call. `volume` is
    /// where the step was taken, `None` outside the world.
    Step {
        engine: EngineId,
        pdg: Pdg,
        volume: Option<VolumeId>,
        position: [f64; 3],
    },
    /// A track started transport (emitted once per track, not on resume).
    TrackStarted {
        pdg: Pdg,
        vertex: [f64; 3],
        momentum: [f64; 3],
    },
    /// A track left the detector and entered the outer volume.
    BoundaryCrossed {
        pdg: Pdg,
        position: [f64; 3],
        energy: f64,
    },
    /// Ownership of a track moved between engines.
    TrackTransferred {
        track: TrackId,
        from: EngineId,
        to: EngineId,
    },
    /// A track was stopped on entering the outer volume.
    TrackStopped { track: TrackId, pdg: Pdg },
    /// The fast engine synthesized a response for a track.
    FastResponse {
        engine: EngineId,
        pdg: Pdg,
        multiplicity: u32,
        edep: f64,
    },
}

/// Discriminant tag for event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Step,
    TrackStarted,
    BoundaryCrossed,
    TrackTransferred,
    TrackStopped,
    FastResponse,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Step { .. } => EventKind::Step,
            Event::TrackStarted { .. } => EventKind::TrackStarted,
            Event::BoundaryCrossed { .. } => EventKind::BoundaryCrossed,
            Event::TrackTransferred { .. } => EventKind::TrackTransferred,
            Event::TrackStopped { .. } => EventKind::TrackStopped,
            Event::FastResponse { .. } => EventKind::FastResponse,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// Events collected since the last drain.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<Event>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over events from oldest to newest.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Remove and return all events, oldest first.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Event> {
        self.events.drain(..)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(pdg: Pdg) -> Event {
        Event::Step {
            engine: EngineId(0),
            pdg,
            volume: Some(VolumeId(3)),
            position: [0.0; 3],
        }
    }

    #[test]
    fn push_and_drain_in_order() {
        let mut buffer = EventBuffer::new();
        buffer.push(step(Pdg::ELECTRON));
        buffer.push(Event::TrackStopped {
            track: TrackId(1),
            pdg: Pdg::GAMMA,
        });
        assert_eq!(buffer.len(), 2);
        let kinds: Vec<EventKind> = buffer.drain().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Step, EventKind::TrackStopped]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_drops_pending() {
        let mut buffer = EventBuffer::new();
        buffer.push(step(Pdg::GAMMA));
        buffer.push(Event::TrackTransferred {
            track: TrackId(0),
            from: EngineId(0),
            to: EngineId(1),
        });
        assert_eq!(buffer.iter().nth(1).map(Event::kind), Some(EventKind::TrackTransferred));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
