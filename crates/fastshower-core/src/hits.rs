//! Sensitive-region accumulator for the calorimeter layers.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geometry::Geometry;
use crate::id::VolumeId;

/// Energy deposit and charged track length of one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalorHit {
    pub edep_abs: f64,
    pub track_length_abs: f64,
    pub edep_gap: f64,
    pub track_length_gap: f64,
}

impl CalorHit {
    pub fn add_abs(&mut self, edep: f64, length: f64) {
        self.edep_abs += edep;
        self.track_length_abs += length;
    }

    pub fn add_gap(&mut self, edep: f64, length: f64) {
        self.edep_gap += edep;
        self.track_length_gap += length;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sums over all layers at the end of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTotals {
    pub edep_abs: f64,
    pub track_length_abs: f64,
    pub edep_gap: f64,
    pub track_length_gap: f64,
}

/// One step as seen by the sensitive detector.
#[derive(Debug, Clone, Copy)]
pub struct HitStep {
    pub volume: VolumeId,
    pub copy_no: u32,
    pub edep: f64,
    pub step_length: f64,
    pub charge: f64,
}

/// The calorimeter sensitive detector: one [`CalorHit`] per layer copy
/// number, plus a spare so that copy numbers starting at 0 or 1 both fit.
#[derive(Debug, Clone)]
pub struct CalorimeterSd {
    name: String,
    absorber: VolumeId,
    gap: VolumeId,
    hits: Vec<CalorHit>,
}

impl CalorimeterSd {
    pub fn new(name: &str, geometry: &Geometry) -> Self {
        Self {
            name: name.to_string(),
            absorber: geometry.absorber_id(),
            gap: geometry.gap_id(),
            hits: vec![CalorHit::default(); geometry.n_layers() as usize + 1],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accumulate one step. Returns `false` when the step is outside the
    /// sensitive volumes or its layer has no hit record.
    pub fn process_hits(&mut self, step: &HitStep) -> bool {
        let is_abs = step.volume == self.absorber;
        if !is_abs && step.volume != self.gap {
            return false;
        }
        let Some(hit) = self.hits.get_mut(step.copy_no as usize) else {
            warn!(
                detector = %self.name,
                copy_no = step.copy_no,
                "no hit record for layer, deposit ignored"
            );
            return false;
        };
        let length = if step.charge != 0.0 { step.step_length } else { 0.0 };
        if is_abs {
            hit.add_abs(step.edep, length);
        } else {
            hit.add_gap(step.edep, length);
        }
        true
    }

    pub fn hit(&self, copy_no: u32) -> Option<&CalorHit> {
        self.hits.get(copy_no as usize)
    }

    pub fn hits(&self) -> &[CalorHit] {
        &self.hits
    }

    /// Sum all layers.
    pub fn totals(&self) -> EventTotals {
        self.hits.iter().fold(EventTotals::default(), |mut t, h| {
            t.edep_abs += h.edep_abs;
            t.track_length_abs += h.track_length_abs;
            t.edep_gap += h.edep_gap;
            t.track_length_gap += h.track_length_gap;
            t
        })
    }

    /// Read out the event and reset every layer.
    pub fn end_of_event(&mut self) -> EventTotals {
        let totals = self.totals();
        for hit in &mut self.hits {
            hit.reset();
        }
        totals
    }

    /// Log the current totals.
    pub fn print_total(&self) {
        let t = self.totals();
        info!(
            detector = %self.name,
            edep_abs_gev = t.edep_abs,
            track_length_abs_cm = t.track_length_abs,
            edep_gap_gev = t.edep_gap,
            track_length_gap_cm = t.track_length_gap,
            "calorimeter totals"
        );
    }
}
