//! The engine manager: sole owner of engine queues and the only place a
//! track changes hands.
//!
//! Each engine has its own queue of [`TrackState`]s. The manager drains one
//! engine at a time; a step answered with `Transfer` suspends the track and
//! puts a [`TransferRequest`] on the [`TransferQueue`]. After each drain the
//! manager reaches a rendezvous: every request is validated against the
//! registry and its snapshot enqueued on the target engine. A track is
//! therefore held by exactly one engine at any time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatcher::StepAction;
use crate::engine::{Backend, StepEnv, TransportHooks};
use crate::geometry::Geometry;
use crate::id::{EngineId, TrackId};
use crate::registry::{EngineKind, EngineRegistry};
use crate::rng::SimRng;
use crate::stack::TrackStack;
use crate::track::TrackState;
use crate::transfer::{TransferQueue, TransferRequest};

/// Errors that abort a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ManagerError {
    #[error("track {track:?} handed to unknown engine {target:?}")]
    UnknownEngine { track: TrackId, target: EngineId },
    #[error("{backends} backends supplied for {engines} registered engines")]
    BackendCount { engines: usize, backends: usize },
    #[error("backend for engine {0:?} does not match its registered kind")]
    KindMismatch(EngineId),
    #[error("primary engine {0:?} is not a registered detailed engine")]
    BadPrimaryEngine(EngineId),
}

/// Counters for one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub tracks: u64,
    pub steps: u64,
    pub transfers: u64,
    pub fast_responses: u64,
}

/// Owns the engines, their queues, the transfer queue and the stack.
#[derive(Debug)]
pub struct EngineManager {
    registry: EngineRegistry,
    backends: Vec<Backend>,
    queues: Vec<VecDeque<TrackState>>,
    transfers: TransferQueue,
    stack: TrackStack,
    /// Engine that produced each pending secondary.
    origin: HashMap<TrackId, EngineId>,
    primary_engine: EngineId,
    geometry: Arc<Geometry>,
}

impl EngineManager {
    /// Pair each registered engine with its backend, in id order.
    pub fn new(
        registry: EngineRegistry,
        backends: Vec<Backend>,
        primary_engine: EngineId,
        geometry: Arc<Geometry>,
    ) -> Result<Self, ManagerError> {
        if backends.len() != registry.len() {
            return Err(ManagerError::BackendCount {
                engines: registry.len(),
                backends: backends.len(),
            });
        }
        for (id, backend) in registry.ids().zip(&backends) {
            let expected = if backend.is_fast() {
                EngineKind::Fast
            } else {
                EngineKind::Detailed
            };
            if registry.kind(id) != Some(expected) {
                return Err(ManagerError::KindMismatch(id));
            }
        }
        if registry.kind(primary_engine) != Some(EngineKind::Detailed) {
            return Err(ManagerError::BadPrimaryEngine(primary_engine));
        }

        let queues = backends.iter().map(|_| VecDeque::new()).collect();
        Ok(Self {
            registry,
            backends,
            queues,
            transfers: TransferQueue::new(),
            stack: TrackStack::new(),
            origin: HashMap::new(),
            primary_engine,
            geometry,
        })
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn primary_engine(&self) -> EngineId {
        self.primary_engine
    }

    pub fn stack(&self) -> &TrackStack {
        &self.stack
    }

    /// The stack, for pushing primaries before `run_event`.
    pub fn stack_mut(&mut self) -> &mut TrackStack {
        &mut self.stack
    }

    pub fn backend(&self, id: EngineId) -> Option<&Backend> {
        self.backends.get(id.0 as usize)
    }

    /// Transport everything on the stack until stack and queues are empty.
    pub fn run_event(
        &mut self,
        hooks: &mut dyn TransportHooks,
        rng: &mut SimRng,
    ) -> Result<EventStats, ManagerError> {
        let mut stats = EventStats::default();
        loop {
            self.route_new_tracks(hooks, &mut stats)?;

            let Some(index) = self.queues.iter().position(|q| !q.is_empty()) else {
                break;
            };
            let engine = EngineId(index as u32);
            while let Some(state) = self.queues[index].pop_front() {
                self.transport(engine, state, hooks, rng, &mut stats);
                self.route_new_tracks(hooks, &mut stats)?;
            }

            self.rendezvous(&mut stats)?;
        }
        Ok(stats)
    }

    /// Move pending particles from the stack to their starting engine.
    /// Secondaries stay with the engine that made them unless the hooks
    /// route them elsewhere.
    fn route_new_tracks(
        &mut self,
        hooks: &mut dyn TransportHooks,
        stats: &mut EventStats,
    ) -> Result<(), ManagerError> {
        while let Some(track) = self.stack.pop_next_track() {
            let creator = self
                .origin
                .remove(&track.id)
                .unwrap_or(self.primary_engine);
            let state = TrackState::new(track);
            let engine = hooks.starting_engine(creator, &state);
            if !self.registry.contains(engine) {
                return Err(ManagerError::UnknownEngine {
                    track: state.id(),
                    target: engine,
                });
            }
            stats.tracks += 1;
            hooks.pre_track(engine, &state);
            self.queues[engine.0 as usize].push_back(state);
        }
        Ok(())
    }

    /// Run one track on one engine until it ends or is handed off.
    fn transport(
        &mut self,
        engine: EngineId,
        mut state: TrackState,
        hooks: &mut dyn TransportHooks,
        rng: &mut SimRng,
        stats: &mut EventStats,
    ) {
        let backend = &mut self.backends[engine.0 as usize];
        let stepper = match backend {
            Backend::Fast(fast) => {
                if !state.stopped {
                    let response = fast.process(&state, rng);
                    stats.fast_responses += 1;
                    hooks.fast_response(engine, &state, &response);
                }
                state.stopped = true;
                hooks.post_track(engine, &state);
                return;
            }
            Backend::Detailed(stepper) => stepper,
        };

        loop {
            if state.stopped {
                hooks.post_track(engine, &state);
                return;
            }
            let mut env = StepEnv {
                geometry: &self.geometry,
                rng: &mut *rng,
            };
            let mut report = stepper.step(&mut state, &mut env);
            stats.steps += 1;
            for secondary in report.secondaries.drain(..) {
                let id = self.stack.push_track(secondary);
                self.origin.insert(id, engine);
            }

            match hooks.stepping(engine, &state, &report) {
                StepAction::Continue => {}
                StepAction::Stop => {
                    state.stopped = true;
                }
                StepAction::Transfer(target) => {
                    trace!(track = state.id().0, from = engine.0, to = target.0, "suspend");
                    self.transfers.push(TransferRequest {
                        snapshot: state,
                        source: engine,
                        target,
                    });
                    return;
                }
            }
        }
    }

    /// Deliver pending transfers to their target queues.
    fn rendezvous(&mut self, stats: &mut EventStats) -> Result<(), ManagerError> {
        for request in self.transfers.drain() {
            if !self.registry.contains(request.target) {
                return Err(ManagerError::UnknownEngine {
                    track: request.track(),
                    target: request.target,
                });
            }
            debug!(
                track = request.track().0,
                from = request.source.0,
                to = request.target.0,
                "track handed off"
            );
            stats.transfers += 1;
            self.queues[request.target.0 as usize].push_back(request.snapshot);
        }
        Ok(())
    }

    /// Drop everything left from an aborted event.
    pub fn reset(&mut self) {
        self.stack.reset();
        self.origin.clear();
        for queue in &mut self.queues {
            queue.clear();
        }
        self.transfers.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{StepReport, ToyEngine, ToyEngineParams};
    use crate::fast::{CumulativeTable, FastResponse, FastShower, FastShowerParams};
    use crate::geometry::CalorimeterConfig;
    use crate::id::Pdg;
    use crate::registry::EngineRegistryBuilder;
    use crate::test_utils::new_primary;

    fn geometry() -> Arc<Geometry> {
        Arc::new(Geometry::new(&CalorimeterConfig::default()).unwrap())
    }

    fn toy(name: &str) -> Backend {
        Backend::Detailed(Box::new(ToyEngine::new(name, ToyEngineParams::default())))
    }

    fn two_engine_manager() -> EngineManager {
        let mut builder = EngineRegistryBuilder::new(true);
        let a = builder.register("engine-a", EngineKind::Detailed);
        builder.register("engine-b", EngineKind::Detailed);
        let registry = builder.build().unwrap();
        EngineManager::new(registry, vec![toy("engine-a"), toy("engine-b")], a, geometry())
            .unwrap()
    }

    /// Records who stepped what; hands every track from engine 0 to a fixed
    /// target on its first step.
    #[derive(Default)]
    struct Recorder {
        handoff_to: Option<EngineId>,
        steps: Vec<(EngineId, TrackId)>,
        started: Vec<(EngineId, TrackId)>,
        ended: Vec<(EngineId, TrackId)>,
        fast: Vec<FastResponse>,
    }

    impl TransportHooks for Recorder {
        fn pre_track(&mut self, engine: EngineId, state: &TrackState) {
            self.started.push((engine, state.id()));
        }

        fn stepping(&mut self, engine: EngineId, state: &TrackState, _: &StepReport) -> StepAction {
            self.steps.push((engine, state.id()));
            match self.handoff_to {
                Some(target) if engine == EngineId(0) => StepAction::Transfer(target),
                _ => StepAction::Continue,
            }
        }

        fn fast_response(&mut self, _: EngineId, _: &TrackState, response: &FastResponse) {
            self.fast.push(*response);
        }

        fn post_track(&mut self, engine: EngineId, state: &TrackState) {
            self.ended.push((engine, state.id()));
        }
    }

    #[test]
    fn mismatched_backends_rejected() {
        let mut builder = EngineRegistryBuilder::new(true);
        let a = builder.register("engine-a", EngineKind::Detailed);
        builder.register("fast", EngineKind::Fast);
        let registry = builder.build().unwrap();

        let err = EngineManager::new(registry.clone(), vec![toy("engine-a")], a, geometry())
            .unwrap_err();
        assert_eq!(err, ManagerError::BackendCount { engines: 2, backends: 1 });

        let err = EngineManager::new(registry.clone(), vec![toy("a"), toy("b")], a, geometry())
            .unwrap_err();
        assert_eq!(err, ManagerError::KindMismatch(EngineId(1)));

        let table = CumulativeTable::from_bin_contents(&[1.0]).unwrap();
        let fast = Backend::Fast(FastShower::new(table, FastShowerParams::default()));
        let err = EngineManager::new(registry, vec![toy("a"), fast], EngineId(1), geometry())
            .unwrap_err();
        assert_eq!(err, ManagerError::BadPrimaryEngine(EngineId(1)));
    }

    #[test]
    fn single_engine_transports_everything() {
        let mut manager = two_engine_manager();
        manager
            .stack_mut()
            .push_track(new_primary(Pdg::GEANTINO, 1.0, [-8.9, 0.0, 0.0]));
        let mut hooks = Recorder::default();
        let mut rng = SimRng::new(1);
        let stats = manager.run_event(&mut hooks, &mut rng).unwrap();

        assert_eq!(stats.tracks, 1);
        assert_eq!(stats.transfers, 0);
        assert!(stats.steps > 10);
        assert!(hooks.steps.iter().all(|&(e, _)| e == EngineId(0)));
        assert_eq!(hooks.started, vec![(EngineId(0), TrackId(0))]);
        assert_eq!(hooks.ended, vec![(EngineId(0), TrackId(0))]);
    }

    #[test]
    fn handoff_moves_track_to_target() {
        let mut manager = two_engine_manager();
        manager
            .stack_mut()
            .push_track(new_primary(Pdg::GEANTINO, 1.0, [-8.9, 0.0, 0.0]));
        let mut hooks = Recorder {
            handoff_to: Some(EngineId(1)),
            ..Recorder::default()
        };
        let mut rng = SimRng::new(1);
        let stats = manager.run_event(&mut hooks, &mut rng).unwrap();

        assert_eq!(stats.transfers, 1);
        assert_eq!(hooks.steps[0], (EngineId(0), TrackId(0)));
        assert!(hooks.steps[1..].iter().all(|&(e, _)| e == EngineId(1)));
        // Started once, ended once, on the engine that finished it.
        assert_eq!(hooks.started.len(), 1);
        assert_eq!(hooks.ended, vec![(EngineId(1), TrackId(0))]);
        assert!(manager.transfers.is_empty());
    }

    #[test]
    fn unknown_target_aborts() {
        let mut manager = two_engine_manager();
        manager
            .stack_mut()
            .push_track(new_primary(Pdg::GEANTINO, 1.0, [-8.9, 0.0, 0.0]));
        let mut hooks = Recorder {
            handoff_to: Some(EngineId(7)),
            ..Recorder::default()
        };
        let mut rng = SimRng::new(1);
        let err = manager.run_event(&mut hooks, &mut rng).unwrap_err();
        assert_eq!(
            err,
            ManagerError::UnknownEngine {
                track: TrackId(0),
                target: EngineId(7)
            }
        );
    }

    /// Starts every new track on a fixed engine.
    struct StartOn(EngineId);

    impl TransportHooks for StartOn {
        fn starting_engine(&mut self, _: EngineId, _: &TrackState) -> EngineId {
            self.0
        }

        fn stepping(&mut self, _: EngineId, _: &TrackState, _: &StepReport) -> StepAction {
            StepAction::Continue
        }
    }

    #[test]
    fn hooks_choose_the_starting_engine() {
        let mut manager = two_engine_manager();
        manager
            .stack_mut()
            .push_track(new_primary(Pdg::GEANTINO, 1.0, [-8.9, 0.0, 0.0]));
        let mut rng = SimRng::new(1);
        let stats = manager.run_event(&mut StartOn(EngineId(1)), &mut rng).unwrap();
        assert_eq!(stats.tracks, 1);
        assert_eq!(stats.transfers, 0);

        manager.reset();
        manager
            .stack_mut()
            .push_track(new_primary(Pdg::GEANTINO, 1.0, [-8.9, 0.0, 0.0]));
        let err = manager.run_event(&mut StartOn(EngineId(5)), &mut rng).unwrap_err();
        assert_eq!(
            err,
            ManagerError::UnknownEngine {
                track: TrackId(0),
                target: EngineId(5)
            }
        );
    }

    #[test]
    fn fast_engine_consumes_track_in_one_shot() {
        let mut builder = EngineRegistryBuilder::new(true);
        let a = builder.register("engine-a", EngineKind::Detailed);
        let fast_id = builder.register("fast", EngineKind::Fast);
        let registry = builder.build().unwrap();
        let table = CumulativeTable::from_bin_contents(&[0.0, 1.0]).unwrap();
        let fast = Backend::Fast(FastShower::new(table, FastShowerParams::default()));
        let mut manager = EngineManager::new(registry, vec![toy("engine-a"), fast], a, geometry())
            .unwrap();

        manager
            .stack_mut()
            .push_track(new_primary(Pdg::ELECTRON, 1.0, [-8.9, 0.0, 0.0]));
        let mut hooks = Recorder {
            handoff_to: Some(fast_id),
            ..Recorder::default()
        };
        let mut rng = SimRng::new(3);
        let stats = manager.run_event(&mut hooks, &mut rng).unwrap();

        assert_eq!(stats.fast_responses, 1);
        assert_eq!(hooks.fast.len(), 1);
        assert_eq!(hooks.fast[0].multiplicity, 1);
        assert_eq!(hooks.steps.len(), 1);
        assert_eq!(hooks.ended, vec![(fast_id, TrackId(0))]);
    }

    #[test]
    fn secondaries_start_on_their_creator() {
        let mut manager = two_engine_manager();
        manager
            .stack_mut()
            .push_track(new_primary(Pdg::ELECTRON, 1.0, [-7.4, 0.0, 0.0]));

        // Engine 1 receives the primary after its first step and makes all
        // the secondaries.
        let mut hooks = Recorder {
            handoff_to: Some(EngineId(1)),
            ..Recorder::default()
        };
        let mut rng = SimRng::new(5);
        let stats = manager.run_event(&mut hooks, &mut rng).unwrap();
        assert!(stats.tracks > 1);
        let secondaries: Vec<_> = hooks.started.iter().skip(1).collect();
        assert!(!secondaries.is_empty());
        // Secondaries created on engine 1 start there; those created on
        // engine 0 during the primary's first step start on engine 0 and
        // are then handed to engine 1 too.
        assert!(hooks.ended.iter().all(|&(e, _)| e == EngineId(1)));
        assert_eq!(manager.stack().n_pending(), 0);
    }
}
