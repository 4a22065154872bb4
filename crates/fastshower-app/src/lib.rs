//! FastShower App -- the Monte Carlo application.
//!
//! Wires a [`fastshower_core::config::RunConfig`] into a geometry, an engine
//! registry, the engine manager, the step dispatcher, the calorimeter
//! sensitive detector and the run tallies, then runs events serially or,
//! with the `parallel` feature, on a rayon pool with partial tallies merged
//! in event order.

pub mod app;
pub mod error;

pub use app::Application;
pub use error::AppError;
