//! FastShower Stats -- histograms, run tallies and the output record.
//!
//! [`tally::Tallies`] consumes the core's transport events during a run and
//! exports a [`record::RunRecord`] of named histograms, which can be written
//! as JSON, RON or bitcode and read back to seed the fast engine.

pub mod fit;
pub mod histogram;
pub mod record;
pub mod tally;
