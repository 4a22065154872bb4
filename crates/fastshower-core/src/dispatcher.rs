//! The per-step decision function.
//!
//! Every engine calls [`StepDispatcher::dispatch`] after advancing a track
//! by one step. The dispatcher tallies the step, keeps the one-shot
//! boundary flag of each track, stops uninteresting tracks on entering the
//! outer volume, and answers with a hand-off when the volume the track has
//! just moved into belongs to another engine.
//!
//! The dispatcher never touches an engine. Its only outputs are the events
//! it pushes and the returned [`StepAction`]; the manager owns everything
//! that follows.

use std::collections::HashMap;

use tracing::debug;

use crate::config::BoundaryConfig;
use crate::engine::StepReport;
use crate::event::{Event, EventBuffer};
use crate::geometry::{Geometry, OUTSIDE_WORLD};
use crate::id::{EngineId, Pdg, TrackId, VolumeId};
use crate::registry::VolumeAssignment;
use crate::track::{FourVector, TrackState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which volumes arm and consume the boundary flag, and which species
/// survive entering the outer volume.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryPolicy {
    pub detector_volumes: Vec<String>,
    pub outer_volume: String,
    pub target_species: Option<Pdg>,
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        Self::from(&BoundaryConfig::default())
    }
}

impl From<&BoundaryConfig> for BoundaryPolicy {
    fn from(config: &BoundaryConfig) -> Self {
        Self {
            detector_volumes: config.detector_volumes.clone(),
            outer_volume: config.outer_volume.clone(),
            target_species: config.target_species,
        }
    }
}

/// Everything the dispatcher consults; fixed for the run.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub split: bool,
    pub assignment: VolumeAssignment,
    pub boundary: BoundaryPolicy,
}

impl DispatchConfig {
    /// Engine that owns the named volume, when splitting is on.
    pub fn owner(&self, volume_name: &str) -> Option<EngineId> {
        if !self.split {
            return None;
        }
        self.assignment.get(volume_name)
    }
}

// ---------------------------------------------------------------------------
// Per-step input and output
// ---------------------------------------------------------------------------

/// The engine's view of a completed step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub engine: EngineId,
    pub track: TrackId,
    pub pdg: Pdg,
    /// Volume the step was taken in; `None` if the track started outside
    /// the world.
    pub volume: Option<VolumeId>,
    /// Name of `volume`, or [`OUTSIDE_WORLD`].
    pub volume_name: &'a str,
    /// Volume the track is in after the step; `None` once it has left the
    /// world. Ownership is resolved here.
    pub current_volume: Option<&'a str>,
    pub step_number: u32,
    pub track_length: f64,
    pub position: FourVector,
    pub momentum: FourVector,
    /// First step in this volume after crossing into it.
    pub is_entering: bool,
    /// The step ended on the boundary of this volume.
    pub is_exiting: bool,
}

impl<'a> StepContext<'a> {
    /// Context for a step an engine has just reported.
    pub fn from_step(
        engine: EngineId,
        state: &TrackState,
        report: &StepReport,
        geometry: &'a Geometry,
    ) -> Self {
        Self {
            engine,
            track: state.id(),
            pdg: state.pdg(),
            volume: report.volume,
            volume_name: report
                .volume
                .map_or(OUTSIDE_WORLD, |volume| geometry.volume_name(volume)),
            current_volume: state.volume.map(|volume| geometry.volume_name(volume)),
            step_number: state.step_number,
            track_length: state.length,
            position: state.track.position,
            momentum: state.track.momentum,
            is_entering: report.is_entering,
            is_exiting: report.is_exiting,
        }
    }
}

/// What the engine must do with the track after this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    /// Terminal: the track receives no further steps.
    Stop,
    /// Suspend the track and hand it to the target engine.
    Transfer(EngineId),
}

/// Per-track state that lives across dispatcher calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TrackTransient {
    /// Armed on exiting a detector volume, consumed on entering the outer one.
    has_left: bool,
}

// ---------------------------------------------------------------------------
// StepDispatcher
// ---------------------------------------------------------------------------

/// Stateful step dispatcher; one per event loop.
#[derive(Debug, Default)]
pub struct StepDispatcher {
    config: DispatchConfig,
    transient: HashMap<TrackId, TrackTransient>,
    crossings: u32,
}

impl StepDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            transient: HashMap::new(),
            crossings: 0,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Decide what happens after one step.
    pub fn dispatch(&mut self, ctx: &StepContext<'_>, events: &mut EventBuffer) -> StepAction {
        events.push(Event::Step {
            engine: ctx.engine,
            pdg: ctx.pdg,
            volume: ctx.volume,
            position: ctx.position.vec3(),
        });

        if let Some(current) = ctx.current_volume {
            if let Some(target) = self.config.owner(current) {
                if target != ctx.engine {
                    debug!(
                        track = ctx.track.0,
                        from = ctx.engine.0,
                        to = target.0,
                        volume = current,
                        "transfer track"
                    );
                    events.push(Event::TrackTransferred {
                        track: ctx.track,
                        from: ctx.engine,
                        to: target,
                    });
                    return StepAction::Transfer(target);
                }
            }
        }

        let policy = &self.config.boundary;
        if ctx.is_exiting && policy.detector_volumes.iter().any(|v| v == ctx.volume_name) {
            self.transient.entry(ctx.track).or_default().has_left = true;
        }

        if ctx.is_entering && ctx.volume_name == policy.outer_volume {
            if let Some(state) = self.transient.get_mut(&ctx.track) {
                if state.has_left {
                    state.has_left = false;
                    self.crossings += 1;
                    events.push(Event::BoundaryCrossed {
                        pdg: ctx.pdg,
                        position: ctx.position.vec3(),
                        energy: ctx.momentum.t,
                    });
                }
            }
            if let Some(target) = policy.target_species {
                if ctx.pdg != target {
                    events.push(Event::TrackStopped {
                        track: ctx.track,
                        pdg: ctx.pdg,
                    });
                    return StepAction::Stop;
                }
            }
        }

        StepAction::Continue
    }

    /// Forget a finished track.
    pub fn finish_track(&mut self, track: TrackId) {
        self.transient.remove(&track);
    }

    /// Clear per-event state. Returns the crossings recorded in the event.
    pub fn end_event(&mut self) -> u32 {
        self.transient.clear();
        std::mem::take(&mut self.crossings)
    }

    /// Crossings recorded so far in the current event.
    pub fn crossings(&self) -> u32 {
        self.crossings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn ctx<'a>(engine: u32, volume_name: &'a str) -> StepContext<'a> {
        StepContext {
            engine: EngineId(engine),
            track: TrackId(0),
            pdg: Pdg::ELECTRON,
            volume: Some(VolumeId(0)),
            volume_name,
            current_volume: Some(volume_name),
            step_number: 1,
            track_length: 0.1,
            position: FourVector::new(1.0, 2.0, 3.0, 0.0),
            momentum: FourVector::new(0.5, 0.0, 0.0, 0.5),
            is_entering: false,
            is_exiting: false,
        }
    }

    fn split_dispatcher() -> StepDispatcher {
        let assignment: VolumeAssignment = [
            ("ABSO".to_string(), EngineId(1)),
            ("GAPX".to_string(), EngineId(0)),
        ]
        .into_iter()
        .collect();
        StepDispatcher::new(DispatchConfig {
            split: true,
            assignment,
            boundary: BoundaryPolicy::default(),
        })
    }

    fn has_left(dispatcher: &StepDispatcher, track: u32) -> Option<bool> {
        dispatcher.transient.get(&TrackId(track)).map(|t| t.has_left)
    }

    fn kinds(events: &EventBuffer) -> Vec<EventKind> {
        events.iter().map(Event::kind).collect()
    }

    #[test]
    fn engine_zero_in_absorber_transfers_to_one() {
        let mut dispatcher = split_dispatcher();
        let mut events = EventBuffer::new();
        let mut step = ctx(0, "ABSO");
        // Even with boundary flags set nothing else may happen.
        step.is_exiting = true;
        let action = dispatcher.dispatch(&step, &mut events);
        assert_eq!(action, StepAction::Transfer(EngineId(1)));
        assert_eq!(kinds(&events), vec![EventKind::Step, EventKind::TrackTransferred]);
        assert_eq!(has_left(&dispatcher, 0), None);
    }

    #[test]
    fn handoff_follows_the_volume_entered() {
        let mut dispatcher = split_dispatcher();
        let mut events = EventBuffer::new();

        // A step taken in the gap that lands in the absorber.
        let mut step = ctx(0, "GAPX");
        step.current_volume = Some("ABSO");
        step.is_exiting = true;
        assert_eq!(dispatcher.dispatch(&step, &mut events), StepAction::Transfer(EngineId(1)));

        // A step taken in the absorber that stays there is not handed back.
        let mut inside = ctx(1, "ABSO");
        inside.current_volume = Some("ABSO");
        assert_eq!(dispatcher.dispatch(&inside, &mut events), StepAction::Continue);

        // Leaving the world never hands off.
        let mut gone = ctx(1, "GAPX");
        gone.current_volume = None;
        assert_eq!(dispatcher.dispatch(&gone, &mut events), StepAction::Continue);
    }

    #[test]
    fn outside_world_step_is_counted() {
        let mut dispatcher = split_dispatcher();
        let mut events = EventBuffer::new();
        let mut step = ctx(0, OUTSIDE_WORLD);
        step.volume = None;
        step.current_volume = None;
        assert_eq!(dispatcher.dispatch(&step, &mut events), StepAction::Continue);
        assert!(matches!(
            events.iter().next(),
            Some(Event::Step { volume: None, .. })
        ));
    }

    #[test]
    fn owner_lookup_needs_split() {
        let mut dispatcher = split_dispatcher();
        assert_eq!(dispatcher.config().owner("ABSO"), Some(EngineId(1)));
        assert_eq!(dispatcher.config().owner("WRLD"), None);
        dispatcher.config.split = false;
        assert_eq!(dispatcher.config().owner("ABSO"), None);
    }

    #[test]
    fn owner_engine_continues() {
        let mut dispatcher = split_dispatcher();
        let mut events = EventBuffer::new();
        assert_eq!(dispatcher.dispatch(&ctx(1, "ABSO"), &mut events), StepAction::Continue);
        assert_eq!(dispatcher.dispatch(&ctx(0, "GAPX"), &mut events), StepAction::Continue);
        assert_eq!(dispatcher.dispatch(&ctx(1, "WRLD"), &mut events), StepAction::Continue);
        assert_eq!(kinds(&events), vec![EventKind::Step; 3]);
    }

    #[test]
    fn no_transfer_without_split() {
        let mut dispatcher = split_dispatcher();
        dispatcher.config.split = false;
        let mut events = EventBuffer::new();
        assert_eq!(dispatcher.dispatch(&ctx(0, "ABSO"), &mut events), StepAction::Continue);
    }

    #[test]
    fn exit_then_entry_counts_one_crossing() {
        let mut dispatcher = StepDispatcher::new(DispatchConfig::default());
        let mut events = EventBuffer::new();

        let mut exit = ctx(0, "GAPX");
        exit.is_exiting = true;
        dispatcher.dispatch(&exit, &mut events);
        assert_eq!(has_left(&dispatcher, 0), Some(true));

        let mut enter = ctx(0, "WRLD");
        enter.is_entering = true;
        dispatcher.dispatch(&enter, &mut events);
        // Further steps in the world are not entering steps.
        for _ in 0..5 {
            dispatcher.dispatch(&ctx(0, "WRLD"), &mut events);
        }
        assert_eq!(dispatcher.crossings(), 1);
        assert_eq!(has_left(&dispatcher, 0), Some(false));
        assert_eq!(dispatcher.end_event(), 1);
        assert_eq!(dispatcher.crossings(), 0);
    }

    #[test]
    fn entering_without_exit_is_not_a_crossing() {
        let mut dispatcher = StepDispatcher::new(DispatchConfig::default());
        let mut events = EventBuffer::new();
        let mut enter = ctx(0, "WRLD");
        enter.is_entering = true;
        dispatcher.dispatch(&enter, &mut events);
        assert_eq!(dispatcher.crossings(), 0);
        assert!(!kinds(&events).contains(&EventKind::BoundaryCrossed));
    }

    #[test]
    fn exit_then_stop_is_not_a_crossing() {
        let mut dispatcher = StepDispatcher::new(DispatchConfig::default());
        let mut events = EventBuffer::new();
        let mut exit = ctx(0, "ABSO");
        exit.is_exiting = true;
        dispatcher.dispatch(&exit, &mut events);
        dispatcher.finish_track(TrackId(0));
        assert_eq!(dispatcher.end_event(), 0);
    }

    #[test]
    fn repeated_exits_arm_once() {
        let mut dispatcher = StepDispatcher::new(DispatchConfig::default());
        let mut events = EventBuffer::new();
        for name in ["ABSO", "GAPX", "ABSO"] {
            let mut exit = ctx(0, name);
            exit.is_exiting = true;
            dispatcher.dispatch(&exit, &mut events);
        }
        let mut enter = ctx(0, "WRLD");
        enter.is_entering = true;
        dispatcher.dispatch(&enter, &mut events);
        dispatcher.dispatch(&enter, &mut events);
        assert_eq!(dispatcher.crossings(), 1);
    }

    #[test]
    fn non_target_species_stopped_on_entering_outer_volume() {
        let mut config = DispatchConfig::default();
        config.boundary.target_species = Some(Pdg::ELECTRON);
        let mut dispatcher = StepDispatcher::new(config);
        let mut events = EventBuffer::new();

        let mut photon = ctx(0, "WRLD");
        photon.pdg = Pdg::GAMMA;
        photon.is_entering = true;
        assert_eq!(dispatcher.dispatch(&photon, &mut events), StepAction::Stop);

        let mut electron = ctx(0, "WRLD");
        electron.is_entering = true;
        assert_eq!(dispatcher.dispatch(&electron, &mut events), StepAction::Continue);

        // Not entering: no stop even for a non-target species.
        photon.is_entering = false;
        assert_eq!(dispatcher.dispatch(&photon, &mut events), StepAction::Continue);
    }

    #[test]
    fn crossing_recorded_before_stop() {
        let mut config = DispatchConfig::default();
        config.boundary.target_species = Some(Pdg::PROTON);
        let mut dispatcher = StepDispatcher::new(config);
        let mut events = EventBuffer::new();

        let mut exit = ctx(0, "GAPX");
        exit.is_exiting = true;
        dispatcher.dispatch(&exit, &mut events);
        let mut enter = ctx(0, "WRLD");
        enter.is_entering = true;
        assert_eq!(dispatcher.dispatch(&enter, &mut events), StepAction::Stop);
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::Step,
                EventKind::Step,
                EventKind::BoundaryCrossed,
                EventKind::TrackStopped
            ]
        );
    }

    #[test]
    fn transient_state_is_per_track() {
        let mut dispatcher = StepDispatcher::new(DispatchConfig::default());
        let mut events = EventBuffer::new();
        let mut exit = ctx(0, "GAPX");
        exit.is_exiting = true;
        dispatcher.dispatch(&exit, &mut events);

        let mut other = ctx(0, "WRLD");
        other.track = TrackId(9);
        other.is_entering = true;
        dispatcher.dispatch(&other, &mut events);
        assert_eq!(dispatcher.crossings(), 0);
        assert_eq!(has_left(&dispatcher, 0), Some(true));
    }
}
