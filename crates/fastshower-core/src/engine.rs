//! Transport engine capability interface and the toy detailed engine.
//!
//! Engine kinds form a closed set, [`Backend`]: detailed engines advance a
//! track one step per call through [`SteppingEngine`], the fast engine
//! answers once through [`FastShower::process`]. The application observes
//! transport through [`TransportHooks`].

use crate::dispatcher::StepAction;
use crate::fast::{FastResponse, FastShower};
use crate::geometry::Geometry;
use crate::id::{EngineId, Pdg, VolumeId};
use crate::rng::SimRng;
use crate::track::{FourVector, NewTrack, Process, TrackState};

/// Speed of light, cm/s.
const C_LIGHT: f64 = 2.997_924_58e10;
/// Push past a boundary so the next step starts inside the next volume, cm.
const BOUNDARY_PUSH: f64 = 1.0e-6;
/// Fraction of the kinetic energy continuous loss may take in one step.
const MAX_LOSS_FRACTION: f64 = 0.2;
/// Ratio of the pair-production mean free path to the radiation length.
const PAIR_PATH_RATIO: f64 = 9.0 / 7.0;

// ===========================================================================
// Capability interface
// ===========================================================================

/// Shared, read-only world plus the event's random stream.
pub struct StepEnv<'a> {
    pub geometry: &'a Geometry,
    pub rng: &'a mut SimRng,
}

/// Outcome of one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Volume the step was taken in; `None` if the track started outside.
    /// The volume the track ends up in is `TrackState::volume`.
    pub volume: Option<VolumeId>,
    /// Layer copy number of that volume (0 outside the calorimeter).
    pub copy_no: u32,
    pub step_length: f64,
    /// Energy deposited along the step, GeV.
    pub edep: f64,
    /// First step in this volume after a boundary crossing.
    pub is_entering: bool,
    /// The step ended on the boundary of this volume.
    pub is_exiting: bool,
    /// The step carried the track out of the world.
    pub left_world: bool,
    /// Particles produced during the step.
    pub secondaries: Vec<NewTrack>,
}

/// A detailed engine: advances a track by one step per call.
pub trait SteppingEngine {
    fn name(&self) -> &str;

    /// Advance the track by one step. Sets `state.stopped` when the track
    /// must receive no further steps.
    fn step(&mut self, state: &mut TrackState, env: &mut StepEnv<'_>) -> StepReport;
}

/// The closed set of engine kinds.
pub enum Backend {
    Detailed(Box<dyn SteppingEngine + Send>),
    Fast(FastShower),
}

impl Backend {
    pub fn name(&self) -> &str {
        match self {
            Backend::Detailed(engine) => engine.name(),
            Backend::Fast(_) => "fast",
        }
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, Backend::Fast(_))
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Detailed(engine) => write!(f, "Detailed({})", engine.name()),
            Backend::Fast(fast) => write!(f, "Fast({} bins)", fast.table().n_bins()),
        }
    }
}

/// Application callbacks invoked by the engine manager.
pub trait TransportHooks {
    /// Engine that starts a new track. Defaults to `engine`: the engine that
    /// created it, or the primary engine.
    fn starting_engine(&mut self, engine: EngineId, _state: &TrackState) -> EngineId {
        engine
    }

    /// A track popped from the stack is about to be transported.
    fn pre_track(&mut self, _engine: EngineId, _state: &TrackState) {}

    /// A detailed engine completed a step.
    fn stepping(&mut self, engine: EngineId, state: &TrackState, report: &StepReport)
    -> StepAction;

    /// The fast engine answered a handed-off track.
    fn fast_response(&mut self, _engine: EngineId, _state: &TrackState, _response: &FastResponse) {}

    /// A track ended (stopped, absorbed, left the world or consumed by the
    /// fast engine). Not called on a hand-off.
    fn post_track(&mut self, _engine: EngineId, _state: &TrackState) {}
}

// ===========================================================================
// ToyEngine
// ===========================================================================

/// Settings of the toy detailed engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToyEngineParams {
    /// Longest single step, cm.
    pub max_step: f64,
    /// Steps after which a track is abandoned.
    pub max_steps: u32,
    /// Uniform field along z, kGauss.
    pub field_z: f64,
}

impl Default for ToyEngineParams {
    fn default() -> Self {
        Self {
            max_step: 1.0,
            max_steps: 10_000,
            field_z: 0.0,
        }
    }
}

/// Simplified electromagnetic transport: straight steps limited by volume
/// boundaries, continuous ionisation loss, bremsstrahlung and pair
/// production with free paths from the radiation length, multiple
/// scattering and per-material cuts.
#[derive(Debug, Clone)]
pub struct ToyEngine {
    name: String,
    params: ToyEngineParams,
}

enum Limit {
    Geometry,
    Interaction,
    Other,
}

impl ToyEngine {
    pub fn new(name: &str, params: ToyEngineParams) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }

    /// Deposit the remaining kinetic energy in place and stop.
    fn absorb(state: &mut TrackState, report: &mut StepReport) {
        report.edep += state.kinetic_energy();
        set_kinetic_energy(state, 0.0, None);
        state.stopped = true;
    }
}

impl SteppingEngine for ToyEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, state: &mut TrackState, env: &mut StepEnv<'_>) -> StepReport {
        let mut report = StepReport {
            is_entering: state.on_boundary,
            ..StepReport::default()
        };
        state.on_boundary = false;
        state.step_number += 1;

        let position = state.track.position.vec3();
        let Some(location) = env.geometry.locate(position) else {
            report.left_world = true;
            state.stopped = true;
            state.volume = None;
            return report;
        };
        report.volume = Some(location.volume);
        report.copy_no = location.copy_no;
        state.volume = Some(location.volume);

        let material = env.geometry.material(location.volume);
        let pdg = state.pdg();
        let charge = pdg.charge();
        let ekin = state.kinetic_energy();

        let cut = if pdg == Pdg::GAMMA {
            material.cut_gamma
        } else {
            material.cut_electron
        };
        let Some(mut dir) = state.track.momentum.direction() else {
            Self::absorb(state, &mut report);
            return report;
        };
        if ekin <= cut && !material.is_vacuum() {
            Self::absorb(state, &mut report);
            return report;
        }

        // Step limits.
        let to_boundary = env.geometry.distance_to_boundary(position, dir, location);
        let mut length = self.params.max_step;
        let mut limit = Limit::Other;
        if to_boundary <= length {
            length = to_boundary;
            limit = Limit::Geometry;
        }

        let free_path = if material.is_vacuum() {
            f64::INFINITY
        } else if pdg.is_lepton_em() {
            material.radiation_length
        } else if pdg == Pdg::GAMMA {
            PAIR_PATH_RATIO * material.radiation_length
        } else {
            f64::INFINITY
        };
        if free_path.is_finite() {
            let s = env.rng.exponential(free_path);
            if s < length {
                length = s;
                limit = Limit::Interaction;
            }
        }

        let dedx = if charge != 0.0 { material.dedx } else { 0.0 };
        if dedx > 0.0 {
            let s = MAX_LOSS_FRACTION * ekin / dedx;
            if s < length {
                length = s;
                limit = Limit::Other;
            }
        }
        if matches!(limit, Limit::Geometry) {
            length += BOUNDARY_PUSH;
        }

        // Move.
        let p_before = state.track.momentum.mag3();
        let beta = if state.track.momentum.t > 0.0 {
            p_before / state.track.momentum.t
        } else {
            1.0
        };
        let moved = [
            position[0] + length * dir[0],
            position[1] + length * dir[1],
            position[2] + length * dir[2],
        ];
        let time = state.track.position.t + length / (beta.max(1e-6) * C_LIGHT);
        state.track.position = FourVector::new(moved[0], moved[1], moved[2], time);
        state.length += length;
        report.step_length = length;

        // Continuous loss and deflection for charged particles.
        let mut remaining = ekin;
        if charge != 0.0 {
            let loss = (dedx * length).min(remaining);
            remaining -= loss;
            report.edep += loss;

            if !material.is_vacuum() && p_before > 0.0 {
                let theta0 = 0.0136 / p_before * (length / material.radiation_length).sqrt();
                dir = deflect(dir, theta0 * env.rng.gauss(), theta0 * env.rng.gauss());
            }
            if self.params.field_z != 0.0 && p_before > 0.0 {
                // Radius of curvature in cm: p[GeV] / (0.3 * B[T] * q) * 100.
                let b_tesla = self.params.field_z * 0.1;
                let p_t = p_before * (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
                if p_t > 0.0 {
                    let radius = p_t / (0.3 * b_tesla * charge) * 100.0;
                    dir = rotate_z(dir, -length / radius);
                }
            }
        }

        // Discrete interaction at the end of the step.
        if matches!(limit, Limit::Interaction) {
            let vertex = state.track.position;
            if pdg.is_lepton_em() {
                if remaining > material.cut_gamma {
                    let u = env.rng.uniform();
                    let k = material.cut_gamma * (remaining / material.cut_gamma).powf(u);
                    remaining -= k;
                    report.secondaries.push(NewTrack::secondary(
                        state.id(),
                        Pdg::GAMMA,
                        k,
                        dir,
                        vertex,
                        Process::Bremsstrahlung,
                    ));
                }
            } else if pdg == Pdg::GAMMA {
                let threshold = 2.0 * Pdg::ELECTRON.mass();
                if remaining > threshold {
                    let available = remaining - threshold;
                    let share = env.rng.uniform();
                    for (species, energy) in [
                        (Pdg::ELECTRON, share * available),
                        (Pdg::POSITRON, (1.0 - share) * available),
                    ] {
                        report.secondaries.push(NewTrack::secondary(
                            state.id(),
                            species,
                            energy,
                            dir,
                            vertex,
                            Process::PairProduction,
                        ));
                    }
                } else {
                    report.edep += remaining;
                }
                remaining = 0.0;
                state.stopped = true;
            }
        }

        set_kinetic_energy(state, remaining, Some(dir));
        if remaining <= 0.0 {
            state.stopped = true;
        }

        // Where did we land?
        match env.geometry.locate(moved) {
            None => {
                report.left_world = true;
                report.is_exiting = true;
                state.stopped = true;
                state.volume = None;
            }
            Some(next) => {
                let crossed = next != location;
                report.is_exiting = crossed;
                state.on_boundary = crossed;
                state.volume = Some(next.volume);
            }
        }

        if !state.stopped && remaining <= cut && !env.geometry.material(location.volume).is_vacuum() {
            report.edep += remaining;
            set_kinetic_energy(state, 0.0, Some(dir));
            state.stopped = true;
        }
        if state.step_number >= self.params.max_steps {
            state.stopped = true;
        }
        report
    }
}

/// Rewrite the momentum for a new kinetic energy, keeping the direction
/// unless a new one is given.
fn set_kinetic_energy(state: &mut TrackState, kinetic_energy: f64, dir: Option<[f64; 3]>) {
    let mass = state.pdg().mass();
    let energy = kinetic_energy.max(0.0) + mass;
    let p = (energy * energy - mass * mass).max(0.0).sqrt();
    let dir = dir
        .or_else(|| state.track.momentum.direction())
        .unwrap_or([1.0, 0.0, 0.0]);
    state.track.momentum = FourVector::new(p * dir[0], p * dir[1], p * dir[2], energy);
}

/// Tilt a unit direction by two small angles in the perpendicular plane.
fn deflect(dir: [f64; 3], a: f64, b: f64) -> [f64; 3] {
    let helper = if dir[0].abs() < 0.9 {
        [1.0, 0.0, 0.0]
    } else {
        [0.0, 1.0, 0.0]
    };
    let u = normalize(cross(dir, helper));
    let v = cross(dir, u);
    normalize([
        dir[0] + a * u[0] + b * v[0],
        dir[1] + a * u[1] + b * v[1],
        dir[2] + a * u[2] + b * v[2],
    ])
}

fn rotate_z(dir: [f64; 3], angle: f64) -> [f64; 3] {
    let (s, c) = angle.sin_cos();
    [c * dir[0] - s * dir[1], s * dir[0] + c * dir[1], dir[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let mag = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if mag <= 0.0 {
        return v;
    }
    [v[0] / mag, v[1] / mag, v[2] / mag]
}
