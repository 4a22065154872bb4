//! The Monte Carlo application: builds everything a run needs from a
//! [`RunConfig`] and drives events through the engine manager.
//!
//! Construction does all the fallible setup (configuration checks,
//! geometry, engine registry, volume assignment and the fast engine's
//! table), so a bad input fails before any event is transported.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use fastshower_core::config::RunConfig;
use fastshower_core::dispatcher::{DispatchConfig, StepAction, StepContext, StepDispatcher};
use fastshower_core::engine::{Backend, StepReport, ToyEngine, ToyEngineParams, TransportHooks};
use fastshower_core::event::{Event, EventBuffer};
use fastshower_core::fast::{FastResponse, FastShower, FastShowerParams};
use fastshower_core::geometry::Geometry;
use fastshower_core::hits::{CalorimeterSd, HitStep};
use fastshower_core::id::{EngineId, Pdg};
use fastshower_core::manager::{EngineManager, EventStats};
use fastshower_core::primary::PrimaryGenerator;
use fastshower_core::registry::{
    EngineKind, EngineRegistry, EngineRegistryBuilder, RegistryError, VolumeAssignment,
};
use fastshower_core::rng::SimRng;
use fastshower_core::track::TrackState;
use fastshower_stats::fit::fit_gauss;
use fastshower_stats::record::{RecordFormat, RunRecord};
use fastshower_stats::tally::{EventSummary, Tallies, TallyConfig};
use tracing::{debug, info, warn};

use crate::error::AppError;

// ===========================================================================
// Application
// ===========================================================================

/// A configured run, ready to transport events.
#[derive(Debug)]
pub struct Application {
    config: RunConfig,
    geometry: Arc<Geometry>,
    registry: EngineRegistry,
    dispatch: DispatchConfig,
    primary_engine: EngineId,
    generator: PrimaryGenerator,
    fast: Option<FastShower>,
}

impl Application {
    pub fn new(config: RunConfig) -> Result<Self, AppError> {
        config.validate()?;
        let geometry = Arc::new(Geometry::new(&config.calorimeter)?);

        let engines = &config.engines;
        let mut builder = EngineRegistryBuilder::new(engines.multi);
        for name in &engines.detailed {
            builder.register(name, EngineKind::Detailed);
        }
        let fast_id = engines
            .fast
            .as_ref()
            .map(|fast| builder.register(&fast.name, EngineKind::Fast));
        let registry = builder.build()?;

        let mut assignment = if engines.split {
            VolumeAssignment::resolve(&engines.assignment, &registry)?
        } else {
            VolumeAssignment::new()
        };
        let mut fast = None;
        if let (Some(fast_config), Some(fast_id)) = (&engines.fast, fast_id) {
            for volume in &fast_config.volumes {
                assignment.insert(volume, fast_id);
            }
            let path = fast_config
                .input
                .as_ref()
                .ok_or_else(|| AppError::FastInputMissing {
                    engine: fast_config.name.clone(),
                })?;
            let table = RunRecord::read(path)
                .and_then(|record| record.cumulative_table(&fast_config.histogram))
                .map_err(|source| AppError::FastInput {
                    path: path.clone(),
                    source,
                })?;
            info!(
                path = %path.display(),
                histogram = %fast_config.histogram,
                bins = table.n_bins(),
                "loaded fast engine table"
            );
            fast = Some(FastShower::new(
                table,
                FastShowerParams {
                    mass: fast_config.mass,
                    deposit_fraction: fast_config.deposit_fraction,
                    resolution: fast_config.resolution,
                    trigger_species: fast_config.trigger_species,
                },
            ));
        }

        let primary_name = engines.primary_engine_name().unwrap_or_default();
        let primary_engine = registry
            .id(primary_name)
            .ok_or_else(|| RegistryError::NotFound(primary_name.to_string()))?;

        let dispatch = DispatchConfig {
            split: engines.split || fast.is_some(),
            assignment,
            boundary: (&config.boundary).into(),
        };
        info!(
            engines = ?registry.names(),
            split = dispatch.split,
            fast = fast.is_some(),
            layers = geometry.n_layers(),
            "application initialised"
        );

        Ok(Self {
            generator: PrimaryGenerator::from(&config.primary),
            config,
            geometry,
            registry,
            dispatch,
            primary_engine,
            fast,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn dispatch_config(&self) -> &DispatchConfig {
        &self.dispatch
    }

    pub fn tally_config(&self) -> TallyConfig {
        TallyConfig {
            species_limit: self.config.export.species_limit,
            engine_names: self.registry.names(),
            volume_names: self.geometry.volume_names(),
            edep_max: self.config.primary.kinetic_energy
                * f64::from(self.config.primary.per_event.max(1)),
        }
    }

    /// One backend per registered engine, in id order.
    fn build_manager(&self) -> Result<EngineManager, AppError> {
        let params = ToyEngineParams {
            max_step: self.config.run.max_step,
            max_steps: self.config.run.max_steps_per_track,
            field_z: self.config.run.field_z,
        };
        let mut backends = Vec::with_capacity(self.registry.len());
        for id in self.registry.ids() {
            let name = self.registry.name(id).unwrap_or_default();
            let backend = match (self.registry.kind(id), &self.fast) {
                (Some(EngineKind::Fast), Some(fast)) => Backend::Fast(fast.clone()),
                _ => Backend::Detailed(Box::new(ToyEngine::new(name, params))),
            };
            backends.push(backend);
        }
        Ok(EngineManager::new(
            self.registry.clone(),
            backends,
            self.primary_engine,
            self.geometry.clone(),
        )?)
    }

    /// Transport a contiguous range of events on one manager.
    pub fn run_events(&self, events: Range<u64>) -> Result<Tallies, AppError> {
        let mut manager = self.build_manager()?;
        let mut worker = EventWorker::new(self);
        for event in events {
            manager.reset();
            let mut rng = SimRng::for_event(self.config.run.seed, event);
            self.generator
                .generate(manager.stack_mut(), &self.geometry, &mut rng);
            let stats = manager.run_event(&mut worker, &mut rng)?;
            worker.end_event(event, &manager, &stats);
        }
        Ok(worker.tallies)
    }

    /// Transport every configured event and build the run record.
    pub fn run(&self) -> Result<RunRecord, AppError> {
        let n_events = self.config.run.events;
        info!(events = n_events, seed = self.config.run.seed, "run started");
        let tallies = self.run_all(n_events)?;

        let mut record = tallies.export();
        record.meta.seed = self.config.run.seed;
        record.meta.split = self.config.engines.split;
        record.meta.fast = self.fast.is_some();
        if self.config.export.fit {
            match fit_gauss(tallies.edep_gap()) {
                Ok(fit) => {
                    info!(mean = fit.mean, sigma = fit.sigma, "gap energy deposit fit");
                    record.fit = Some(fit);
                }
                Err(e) => warn!("fit skipped: {e}"),
            }
        }
        info!(
            events = tallies.events(),
            crossings = tallies.crossings().iter().sum::<u32>(),
            "run finished"
        );
        Ok(record)
    }

    #[cfg(not(feature = "parallel"))]
    fn run_all(&self, n_events: u64) -> Result<Tallies, AppError> {
        self.run_events(0..n_events)
    }

    /// One worker per event; partial tallies merged in event order.
    #[cfg(feature = "parallel")]
    fn run_all(&self, n_events: u64) -> Result<Tallies, AppError> {
        use rayon::prelude::*;

        let parts = (0..n_events)
            .into_par_iter()
            .map(|event| self.run_events(event..event + 1))
            .collect::<Result<Vec<_>, _>>()?;
        let mut tallies = Tallies::new(self.tally_config());
        for part in &parts {
            tallies.merge(part)?;
        }
        Ok(tallies)
    }

    /// Run, then write the record and, if configured, the geometry.
    pub fn run_and_write(&self) -> Result<RunRecord, AppError> {
        let record = self.run()?;
        record.write(&self.config.export.out)?;
        info!(path = %self.config.export.out.display(), "histograms written");
        if let Some(path) = &self.config.export.geometry {
            self.export_geometry(path)?;
        }
        Ok(record)
    }

    /// Write the geometry description; the format follows the extension.
    pub fn export_geometry(&self, path: &Path) -> Result<(), AppError> {
        let description = self.geometry.describe();
        let export_err = |detail: String| AppError::Export {
            path: path.to_path_buf(),
            detail,
        };
        let bytes = match RecordFormat::from_path(path)? {
            RecordFormat::Json => {
                serde_json::to_vec_pretty(&description).map_err(|e| export_err(e.to_string()))?
            }
            RecordFormat::Ron => {
                ron::ser::to_string_pretty(&description, ron::ser::PrettyConfig::default())
                    .map_err(|e| export_err(e.to_string()))?
                    .into_bytes()
            }
            RecordFormat::Bin => {
                bitcode::serialize(&description).map_err(|e| export_err(e.to_string()))?
            }
        };
        std::fs::write(path, bytes)?;
        info!(path = %path.display(), volumes = description.volumes.len(), "geometry exported");
        Ok(())
    }
}

// ===========================================================================
// EventWorker
// ===========================================================================

/// Per-worker transport state: the dispatcher, the sensitive detector and
/// the partial tallies.
struct EventWorker<'a> {
    geometry: &'a Geometry,
    dispatcher: StepDispatcher,
    sd: CalorimeterSd,
    events: EventBuffer,
    tallies: Tallies,
    /// Multiplicity synthesized by the fast engine in this event.
    fast_particles: u32,
}

impl<'a> EventWorker<'a> {
    fn new(app: &'a Application) -> Self {
        Self {
            geometry: &app.geometry,
            dispatcher: StepDispatcher::new(app.dispatch.clone()),
            sd: CalorimeterSd::new("Calorimeter", &app.geometry),
            events: EventBuffer::new(),
            tallies: Tallies::new(app.tally_config()),
            fast_particles: 0,
        }
    }

    fn flush(&mut self) {
        for event in self.events.drain() {
            self.tallies.process_event(&event);
        }
    }

    fn end_event(&mut self, event: u64, manager: &EngineManager, stats: &EventStats) {
        self.flush();
        let crossings = self.dispatcher.end_event();
        self.sd.print_total();
        let stack = manager.stack();
        let summary = EventSummary {
            totals: self.sd.end_of_event(),
            electrons: stack.number_of_particles(Pdg::ELECTRON) as u32 + self.fast_particles,
            positrons: stack.number_of_particles(Pdg::POSITRON) as u32,
            photons: stack.number_of_particles(Pdg::GAMMA) as u32,
        };
        debug!(
            event,
            tracks = stats.tracks,
            steps = stats.steps,
            transfers = stats.transfers,
            fast = stats.fast_responses,
            crossings,
            "event done"
        );
        self.tallies.end_event(&summary);
        self.fast_particles = 0;
    }
}

impl TransportHooks for EventWorker<'_> {
    fn pre_track(&mut self, _engine: EngineId, state: &TrackState) {
        self.events.push(Event::TrackStarted {
            pdg: state.pdg(),
            vertex: state.track.position.vec3(),
            momentum: state.track.momentum.vec3(),
        });
    }

    /// A track born inside an assigned volume starts on that volume's owner.
    fn starting_engine(&mut self, engine: EngineId, state: &TrackState) -> EngineId {
        self.geometry
            .locate(state.track.position.vec3())
            .and_then(|location| {
                let name = self.geometry.volume_name(location.volume);
                self.dispatcher.config().owner(name)
            })
            .unwrap_or(engine)
    }

    fn stepping(&mut self, engine: EngineId, state: &TrackState, report: &StepReport) -> StepAction {
        if let Some(volume) = report.volume {
            self.sd.process_hits(&HitStep {
                volume,
                copy_no: report.copy_no,
                edep: report.edep,
                step_length: report.step_length,
                charge: state.pdg().charge(),
            });
        }
        let ctx = StepContext::from_step(engine, state, report, self.geometry);
        let action = self.dispatcher.dispatch(&ctx, &mut self.events);
        self.flush();
        action
    }

    fn fast_response(&mut self, engine: EngineId, state: &TrackState, response: &FastResponse) {
        self.events.push(Event::FastResponse {
            engine,
            pdg: state.pdg(),
            multiplicity: response.multiplicity,
            edep: response.edep,
        });
        self.fast_particles += response.multiplicity;
        if response.hit {
            self.sd.process_hits(&HitStep {
                volume: self.geometry.gap_id(),
                copy_no: self.geometry.layer_at(state.track.position.x),
                edep: response.edep,
                step_length: 0.0,
                charge: 0.0,
            });
        }
    }

    fn post_track(&mut self, _engine: EngineId, state: &TrackState) {
        self.dispatcher.finish_track(state.id());
    }
}
