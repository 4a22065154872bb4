//! FastShower Core -- transport-engine hand-off for a toy sampling calorimeter.
//!
//! Primary particles are shot through a calorimeter of alternating absorber
//! and gap slabs by one or more transport engines. After every step the
//! [`dispatcher::StepDispatcher`] tallies the step, tracks boundary
//! crossings and decides whether the track stays with its engine, stops, or
//! is handed to another engine, possibly the fast parametric one.
//!
//! # Hand-off protocol
//!
//! 1. An engine completes a step and reports it to the application hooks.
//! 2. The dispatcher answers `Transfer(target)` when the step's volume is
//!    assigned to a different engine.
//! 3. The [`manager::EngineManager`] suspends the track and places a
//!    [`transfer::TransferRequest`] (snapshot, source, target) on its queue.
//! 4. At the next rendezvous the manager validates the target and enqueues
//!    the snapshot on it. Unknown targets abort the run.
//!
//! # Key Types
//!
//! - [`registry::EngineRegistry`] -- Immutable engine identities.
//! - [`registry::VolumeAssignment`] -- Exact-name volume to engine map.
//! - [`engine::Backend`] -- Detailed stepping engine or fast engine.
//! - [`fast::CumulativeTable`] -- Multiplicity distribution for the fast engine.
//! - [`hits::CalorimeterSd`] -- Per-layer energy deposit and track length.
//! - [`config::RunConfig`] -- Everything configurable, loaded from TOML/RON/JSON.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod fast;
pub mod geometry;
pub mod hits;
pub mod id;
pub mod manager;
pub mod material;
pub mod primary;
pub mod registry;
pub mod rng;
pub mod stack;
pub mod track;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
