//! Run-wide tally accumulator.
//!
//! Consumes transport [`Event`]s as they are emitted and an
//! [`EventSummary`] at the end of every event. Spatial and species
//! histograms persist for the whole run; per-event counts are appended to
//! sequences, one entry per event.
//!
//! # Usage
//!
//! ```ignore
//! let mut tallies = Tallies::new(TallyConfig::default());
//! for event in buffer.drain() {
//!     tallies.process_event(&event);
//! }
//! tallies.end_event(&summary);
//! let record = tallies.export();
//! ```

use fastshower_core::event::Event;
use fastshower_core::hits::EventTotals;
use fastshower_core::id::Pdg;
use tracing::debug;

use crate::histogram::{Axis, H1, H2, HistogramError, SpeciesCounts};
use crate::record::{RunMeta, RunRecord, Sequence};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Errors raised when combining tallies.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TallyError {
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    #[error("species limit differs: {0} vs {1}")]
    SpeciesLimit(i32, i32),
}

/// Shape of the accumulated histograms.
#[derive(Debug, Clone, PartialEq)]
pub struct TallyConfig {
    /// Species with `|pdg|` above this are dropped at export.
    pub species_limit: i32,
    /// Labels of the engine axes, indexed by engine id.
    pub engine_names: Vec<String>,
    /// Labels of the volume axis, indexed by volume id.
    pub volume_names: Vec<String>,
    /// Upper limit of the energy histograms.
    pub edep_max: f64,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            species_limit: 3000,
            engine_names: vec!["engine-a".to_string()],
            volume_names: ["WRLD", "CALO", "LAYE", "ABSO", "GAPX"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            edep_max: 1.0,
        }
    }
}

/// What the application knows about an event once transport has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventSummary {
    pub totals: EventTotals,
    pub electrons: u32,
    pub positrons: u32,
    pub photons: u32,
}

// ---------------------------------------------------------------------------
// Tallies
// ---------------------------------------------------------------------------

/// Three histograms over the x, y and z components of a vector.
#[derive(Debug, Clone, PartialEq)]
struct Xyz([H1; 3]);

impl Xyz {
    fn new(prefix: &str, title: &str, bins: [usize; 3], ranges: [(f64, f64); 3]) -> Self {
        let make = |i: usize, axis: &str| {
            H1::new(
                &format!("{prefix}{axis}"),
                &format!("{title} {}", axis.to_lowercase()),
                bins[i],
                ranges[i].0,
                ranges[i].1,
            )
        };
        Self([make(0, "X"), make(1, "Y"), make(2, "Z")])
    }

    fn fill(&mut self, v: [f64; 3]) {
        for (hist, x) in self.0.iter_mut().zip(v) {
            hist.fill(x);
        }
    }

    fn merge(&mut self, other: &Xyz) -> Result<(), HistogramError> {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            a.merge(b)?;
        }
        Ok(())
    }
}

/// Accumulated histograms and per-event sequences of a run (or a part of
/// one, when events run on several workers).
#[derive(Debug, Clone, PartialEq)]
pub struct Tallies {
    config: TallyConfig,
    steps: Xyz,
    pv_electrons: Xyz,
    mom_electrons: Xyz,
    exit: Xyz,
    exit_energy: H1,
    edep_gap: H1,
    edep_abs: H1,
    fast_edep: H1,
    engine_vs_volume: H2,
    transfers: H2,
    steps_per_pdg: SpeciesCounts,
    crossings_per_pdg: SpeciesCounts,
    electrons: Vec<u32>,
    positrons: Vec<u32>,
    photons: Vec<u32>,
    crossings: Vec<u32>,
    /// Crossings of the event in progress.
    event_crossings: u32,
    events: u64,
}

impl Tallies {
    pub fn new(config: TallyConfig) -> Self {
        let emax = config.edep_max;
        let engines = || Axis::labelled(config.engine_names.clone());
        Self {
            steps: Xyz::new(
                "histSteps",
                "Step position",
                [100, 50, 50],
                [(-10.0, 10.0), (-6.0, 6.0), (-6.0, 6.0)],
            ),
            pv_electrons: Xyz::new(
                "histPVElectrons",
                "Electron production vertex",
                [50, 50, 50],
                [(-10.0, 10.0), (-6.0, 6.0), (-6.0, 6.0)],
            ),
            mom_electrons: Xyz::new(
                "histMomElectrons",
                "Electron momentum",
                [50, 50, 50],
                [(0.0, 0.005); 3],
            ),
            exit: Xyz::new(
                "histExit",
                "Exit position",
                [50, 50, 50],
                [(-10.0, 10.0), (-6.0, 6.0), (-6.0, 6.0)],
            ),
            exit_energy: H1::new("histExitEnergy", "Exit energy", 100, 0.0, emax),
            edep_gap: H1::new("histEdepGap", "Energy deposit in gap", 100, 0.0, emax),
            edep_abs: H1::new("histEdepAbs", "Energy deposit in absorber", 100, 0.0, emax),
            fast_edep: H1::new("histFastEdep", "Fast engine energy", 100, 0.0, emax),
            engine_vs_volume: H2::new(
                "histEngineVsVolume",
                "Steps per engine and volume",
                engines(),
                Axis::labelled(config.volume_names.clone()),
            ),
            transfers: H2::new("histTransfers", "Transfers source vs target", engines(), engines()),
            steps_per_pdg: SpeciesCounts::new("histStepsPerPDG"),
            crossings_per_pdg: SpeciesCounts::new("histCrossingsPerPDG"),
            electrons: Vec::new(),
            positrons: Vec::new(),
            photons: Vec::new(),
            crossings: Vec::new(),
            event_crossings: 0,
            events: 0,
            config,
        }
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Number of completed events.
    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn steps_per_pdg(&self) -> &SpeciesCounts {
        &self.steps_per_pdg
    }

    pub fn crossings_per_pdg(&self) -> &SpeciesCounts {
        &self.crossings_per_pdg
    }

    /// Crossings per completed event.
    pub fn crossings(&self) -> &[u32] {
        &self.crossings
    }

    pub fn electrons(&self) -> &[u32] {
        &self.electrons
    }

    pub fn edep_gap(&self) -> &H1 {
        &self.edep_gap
    }

    pub fn engine_vs_volume(&self) -> &H2 {
        &self.engine_vs_volume
    }

    pub fn transfers(&self) -> &H2 {
        &self.transfers
    }

    /// Tally one transport event.
    pub fn process_event(&mut self, event: &Event) {
        match event {
            Event::Step {
                engine,
                pdg,
                volume,
                position,
            } => {
                self.steps.fill(*position);
                self.steps_per_pdg.increment(pdg.0);
                if let Some(volume) = volume {
                    self.engine_vs_volume
                        .fill(f64::from(engine.0), f64::from(volume.0));
                }
            }
            Event::TrackStarted {
                pdg,
                vertex,
                momentum,
            } => {
                if *pdg == Pdg::ELECTRON {
                    self.pv_electrons.fill(*vertex);
                    self.mom_electrons.fill(*momentum);
                }
            }
            Event::BoundaryCrossed {
                pdg,
                position,
                energy,
            } => {
                self.exit.fill(*position);
                self.exit_energy.fill(*energy);
                self.crossings_per_pdg.increment(pdg.0);
                self.event_crossings += 1;
            }
            Event::TrackTransferred { from, to, .. } => {
                self.transfers.fill(f64::from(from.0), f64::from(to.0));
            }
            Event::FastResponse { edep, .. } => self.fast_edep.fill(*edep),
            Event::TrackStopped { .. } => {}
        }
    }

    /// Close the current event: fill the per-event histograms and append
    /// one entry to every sequence.
    pub fn end_event(&mut self, summary: &EventSummary) {
        self.edep_gap.fill(summary.totals.edep_gap);
        self.edep_abs.fill(summary.totals.edep_abs);
        self.electrons.push(summary.electrons);
        self.positrons.push(summary.positrons);
        self.photons.push(summary.photons);
        self.crossings.push(self.event_crossings);
        debug!(
            event = self.events,
            electrons = summary.electrons,
            crossings = self.event_crossings,
            "tallied event"
        );
        self.event_crossings = 0;
        self.events += 1;
    }

    /// Add a partial tally. Sequences are appended after this one's.
    pub fn merge(&mut self, other: &Tallies) -> Result<(), TallyError> {
        if self.config.species_limit != other.config.species_limit {
            return Err(TallyError::SpeciesLimit(
                self.config.species_limit,
                other.config.species_limit,
            ));
        }
        self.steps.merge(&other.steps)?;
        self.pv_electrons.merge(&other.pv_electrons)?;
        self.mom_electrons.merge(&other.mom_electrons)?;
        self.exit.merge(&other.exit)?;
        self.exit_energy.merge(&other.exit_energy)?;
        self.edep_gap.merge(&other.edep_gap)?;
        self.edep_abs.merge(&other.edep_abs)?;
        self.fast_edep.merge(&other.fast_edep)?;
        self.engine_vs_volume.merge(&other.engine_vs_volume)?;
        self.transfers.merge(&other.transfers)?;
        self.steps_per_pdg.merge(&other.steps_per_pdg);
        self.crossings_per_pdg.merge(&other.crossings_per_pdg);
        self.electrons.extend_from_slice(&other.electrons);
        self.positrons.extend_from_slice(&other.positrons);
        self.photons.extend_from_slice(&other.photons);
        self.crossings.extend_from_slice(&other.crossings);
        self.event_crossings += other.event_crossings;
        self.events += other.events;
        Ok(())
    }

    /// Build the output record. Species counts are filtered by the
    /// configured limit; the particle sequences are also exported as
    /// multiplicity histograms.
    pub fn export(&self) -> RunRecord {
        let mut h1: Vec<H1> = Vec::new();
        for xyz in [&self.steps, &self.pv_electrons, &self.mom_electrons, &self.exit] {
            h1.extend(xyz.0.iter().cloned());
        }
        h1.extend([
            self.exit_energy.clone(),
            self.edep_gap.clone(),
            self.edep_abs.clone(),
            self.fast_edep.clone(),
        ]);
        h1.push(H1::multiplicity(
            "histNElectrons",
            "Electrons per event",
            &self.electrons,
        ));
        h1.push(H1::multiplicity(
            "histNPositrons",
            "Positrons per event",
            &self.positrons,
        ));
        h1.push(H1::multiplicity("histNPhotons", "Photons per event", &self.photons));

        let limit = self.config.species_limit;
        let sequence = |name: &str, values: &[u32]| Sequence {
            name: name.to_string(),
            values: values.to_vec(),
        };
        RunRecord {
            meta: RunMeta {
                events: self.events,
                species_limit: limit,
                engines: self.config.engine_names.clone(),
                ..RunMeta::default()
            },
            h1,
            h2: vec![self.engine_vs_volume.clone(), self.transfers.clone()],
            counts: vec![
                self.steps_per_pdg.filtered(limit),
                self.crossings_per_pdg.filtered(limit),
            ],
            sequences: vec![
                sequence("electrons", &self.electrons),
                sequence("positrons", &self.positrons),
                sequence("photons", &self.photons),
                sequence("crossings", &self.crossings),
            ],
            fit: None,
        }
    }
}
