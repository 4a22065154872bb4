use std::path::PathBuf;

use fastshower_core::config::ConfigError;
use fastshower_core::geometry::GeometryError;
use fastshower_core::manager::ManagerError;
use fastshower_core::registry::RegistryError;
use fastshower_stats::record::RecordError;
use fastshower_stats::tally::TallyError;

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("engine registry: {0}")]
    Registry(#[from] RegistryError),

    /// Transport aborted, e.g. a hand-off to an unknown engine.
    #[error("transport aborted: {0}")]
    Manager(#[from] ManagerError),

    #[error("tally merge: {0}")]
    Tally(#[from] TallyError),

    #[error("run record: {0}")]
    Record(#[from] RecordError),

    /// Fast mode needs the record of a previous run.
    #[error("fast engine '{engine}' has no input histogram file")]
    FastInputMissing { engine: String },

    /// The fast engine's table could not be built from its input.
    #[error("fast engine input {path}: {source}")]
    FastInput { path: PathBuf, source: RecordError },

    #[error("geometry export to {path}: {detail}")]
    Export { path: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
