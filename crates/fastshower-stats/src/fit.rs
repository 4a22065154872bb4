//! Gaussian fit of a binned distribution.
//!
//! Iterative moments in a shrinking window: start from the mean and RMS of
//! the whole histogram, then recompute both from the bins within two
//! standard deviations of the current mean.

use serde::{Deserialize, Serialize};

use crate::histogram::H1;

const WINDOW_SIGMAS: f64 = 2.0;
const ITERATIONS: usize = 3;
/// Correction for the tails cut off by a ±2σ window.
const WINDOW_VARIANCE_FRACTION: f64 = 0.773_972_2;
/// Probability content of a ±2σ window.
const WINDOW_CONTENT_FRACTION: f64 = 0.954_499_7;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("histogram '{0}' has no entries in range")]
    Empty(String),
}

/// Fitted `constant * exp(-(x - mean)^2 / (2 sigma^2))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussFit {
    pub constant: f64,
    pub mean: f64,
    pub sigma: f64,
}

impl GaussFit {
    pub fn eval(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sigma;
        self.constant * (-0.5 * z * z).exp()
    }
}

fn window_moments(hist: &H1, lo: f64, hi: f64) -> Option<(f64, f64, f64)> {
    let (mut sw, mut swx, mut swx2) = (0.0, 0.0, 0.0);
    for (bin, &w) in hist.contents.iter().enumerate() {
        let x = hist.axis.centre(bin);
        if x < lo || x > hi || w <= 0.0 {
            continue;
        }
        sw += w;
        swx += w * x;
        swx2 += w * x * x;
    }
    if sw <= 0.0 {
        return None;
    }
    let mean = swx / sw;
    let variance = (swx2 / sw - mean * mean).max(0.0);
    Some((sw, mean, variance))
}

/// Fit a Gaussian to the in-range contents of `hist`.
pub fn fit_gauss(hist: &H1) -> Result<GaussFit, FitError> {
    let empty = || FitError::Empty(hist.name.clone());
    let (mut sum, mut mean, variance) =
        window_moments(hist, f64::NEG_INFINITY, f64::INFINITY).ok_or_else(empty)?;
    let min_sigma = hist.axis.width() / 12f64.sqrt();
    let mut sigma = variance.sqrt().max(min_sigma);
    let mut content_fraction = 1.0;

    for _ in 0..ITERATIONS {
        let lo = mean - WINDOW_SIGMAS * sigma;
        let hi = mean + WINDOW_SIGMAS * sigma;
        let Some((s, m, v)) = window_moments(hist, lo, hi) else {
            break;
        };
        sum = s;
        content_fraction = WINDOW_CONTENT_FRACTION;
        mean = m;
        sigma = (v / WINDOW_VARIANCE_FRACTION).sqrt().max(min_sigma);
    }

    // Area of the window content spread over the full Gaussian.
    let area = sum / content_fraction * hist.axis.width();
    let constant = area / (std::f64::consts::TAU.sqrt() * sigma);
    Ok(GaussFit {
        constant,
        mean,
        sigma,
    })
}
