//! Run configuration.
//!
//! A single explicit [`RunConfig`] value replaces process-wide settings: it
//! is loaded once (TOML, RON or JSON, chosen by file extension), validated,
//! and handed to the registry, dispatcher and engine manager at
//! construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::geometry::CalorimeterConfig;
use crate::id::Pdg;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("volume splitting requires multi-engine mode")]
    SplitWithoutMulti,

    #[error("fast simulation requires multi-engine mode")]
    FastWithoutMulti,

    #[error("invalid value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported configuration and record formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse = |detail: String| ConfigError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse(e.to_string())),
    }
}

// ===========================================================================
// Sections
// ===========================================================================

/// Primary particles shot into the calorimeter each event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    pub species: Pdg,
    /// Kinetic energy in GeV.
    pub kinetic_energy: f64,
    pub per_event: u32,
    /// Half-width of a uniform transverse smearing of the start point, cm.
    pub transverse_spread: f64,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            species: Pdg::ELECTRON,
            kinetic_energy: 1.0,
            per_event: 1,
            transverse_spread: 0.0,
        }
    }
}

/// Event loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub events: u64,
    pub seed: u64,
    /// Longest single step a detailed engine takes, cm.
    pub max_step: f64,
    /// Steps after which a track is abandoned.
    pub max_steps_per_track: u32,
    /// Uniform field along z, kGauss.
    pub field_z: f64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            events: 5,
            seed: 12345,
            max_step: 1.0,
            max_steps_per_track: 10_000,
            field_z: 0.0,
        }
    }
}

/// The fast parametric engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastConfig {
    pub name: String,
    /// Run record holding the multiplicity histogram.
    pub input: Option<PathBuf>,
    /// Name of the histogram inside the record.
    pub histogram: String,
    /// Volumes handed to the fast engine.
    pub volumes: Vec<String>,
    /// Mass of the synthesized particles, GeV.
    pub mass: f64,
    /// Mean fraction of the entry kinetic energy deposited.
    pub deposit_fraction: f64,
    /// Stochastic resolution, GeV^(1/2).
    pub resolution: f64,
    /// Only this species produces a hit; any species when unset.
    pub trigger_species: Option<Pdg>,
}

impl Default for FastConfig {
    fn default() -> Self {
        Self {
            name: "fast".to_string(),
            input: None,
            histogram: "histNElectrons".to_string(),
            volumes: vec!["GAPX".to_string()],
            mass: 0.510_999_06e-3,
            deposit_fraction: 0.9,
            resolution: 0.1,
            trigger_species: None,
        }
    }
}

/// Engine registration, splitting and fast substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Declare multi-engine mode up front.
    pub multi: bool,
    /// Hand tracks between engines by volume.
    pub split: bool,
    /// Detailed engine names, registered in order.
    pub detailed: Vec<String>,
    /// Engine receiving primaries; the first detailed engine when unset.
    pub primary_engine: Option<String>,
    /// Volume name to engine name.
    pub assignment: BTreeMap<String, String>,
    pub fast: Option<FastConfig>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            multi: false,
            split: false,
            detailed: vec!["engine-a".to_string()],
            primary_engine: None,
            assignment: BTreeMap::new(),
            fast: None,
        }
    }
}

impl EnginesConfig {
    /// Two detailed engines with absorber on the second and gap on the first.
    pub fn split_pair() -> Self {
        let mut assignment = BTreeMap::new();
        assignment.insert("ABSO".to_string(), "engine-b".to_string());
        assignment.insert("GAPX".to_string(), "engine-a".to_string());
        Self {
            multi: true,
            split: true,
            detailed: vec!["engine-a".to_string(), "engine-b".to_string()],
            primary_engine: None,
            assignment,
            fast: None,
        }
    }

    /// Name of the engine primaries start on.
    pub fn primary_engine_name(&self) -> Option<&str> {
        self.primary_engine
            .as_deref()
            .or_else(|| self.detailed.first().map(String::as_str))
    }
}

/// Boundary-crossing bookkeeping and track stopping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Exiting one of these arms the crossing flag.
    pub detector_volumes: Vec<String>,
    /// Entering this volume consumes the flag.
    pub outer_volume: String,
    /// Other species are stopped on entering the outer volume.
    pub target_species: Option<Pdg>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            detector_volumes: vec!["ABSO".to_string(), "GAPX".to_string()],
            outer_volume: "WRLD".to_string(),
            target_species: None,
        }
    }
}

/// Output options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Species with `|pdg|` above this are left out of exported counts.
    pub species_limit: i32,
    /// Fit the gap energy-deposit distribution.
    pub fit: bool,
    pub out: PathBuf,
    pub geometry: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            species_limit: 3000,
            fit: false,
            out: PathBuf::from("./histograms.json"),
            geometry: None,
        }
    }
}

// ===========================================================================
// RunConfig
// ===========================================================================

/// Complete configuration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub calorimeter: CalorimeterConfig,
    pub primary: PrimaryConfig,
    pub run: RunSection,
    pub engines: EnginesConfig,
    pub boundary: BoundaryConfig,
    pub export: ExportConfig,
}

impl RunConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = deserialize_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engines.split && !self.engines.multi {
            return Err(ConfigError::SplitWithoutMulti);
        }
        if self.engines.fast.is_some() && !self.engines.multi {
            return Err(ConfigError::FastWithoutMulti);
        }
        if self.calorimeter.layers == 0 {
            return Err(invalid("calorimeter.layers", "must be at least 1"));
        }
        for (field, value) in [
            ("calorimeter.absorber_thickness", self.calorimeter.absorber_thickness),
            ("calorimeter.gap_thickness", self.calorimeter.gap_thickness),
            ("calorimeter.calor_size_yz", self.calorimeter.calor_size_yz),
            ("run.max_step", self.run.max_step),
        ] {
            if !(value > 0.0) {
                return Err(invalid(field, format!("must be positive, got {value}")));
            }
        }
        if !(self.primary.kinetic_energy > 0.0) {
            return Err(invalid("primary.kinetic_energy", "must be positive"));
        }
        if self.export.species_limit < 0 {
            return Err(invalid(
                "export.species_limit",
                format!("must not be negative, got {}", self.export.species_limit),
            ));
        }
        if self.engines.detailed.is_empty() {
            return Err(invalid("engines.detailed", "at least one detailed engine is required"));
        }

        let mut known: Vec<&str> = self.engines.detailed.iter().map(String::as_str).collect();
        if let Some(fast) = &self.engines.fast {
            known.push(&fast.name);
            if !(0.0..=1.0).contains(&fast.deposit_fraction) {
                return Err(invalid("engines.fast.deposit_fraction", "must lie in [0, 1]"));
            }
            if fast.resolution < 0.0 {
                return Err(invalid("engines.fast.resolution", "must not be negative"));
            }
        }
        for (volume, engine) in &self.engines.assignment {
            if !known.contains(&engine.as_str()) {
                return Err(invalid(
                    "engines.assignment",
                    format!("volume '{volume}' refers to unknown engine '{engine}'"),
                ));
            }
        }
        if let Some(name) = &self.engines.primary_engine {
            if !self.engines.detailed.contains(name) {
                return Err(invalid(
                    "engines.primary_engine",
                    format!("'{name}' is not a detailed engine"),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, detail: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn split_requires_multi() {
        let mut config = RunConfig::default();
        config.engines = EnginesConfig::split_pair();
        config.validate().unwrap();

        config.engines.multi = false;
        assert!(matches!(config.validate(), Err(ConfigError::SplitWithoutMulti)));
    }

    #[test]
    fn fast_requires_multi() {
        let mut config = RunConfig::default();
        config.engines.fast = Some(FastConfig::default());
        assert!(matches!(config.validate(), Err(ConfigError::FastWithoutMulti)));
        config.engines.multi = true;
        config.validate().unwrap();
    }

    #[test]
    fn assignment_must_name_known_engine() {
        let mut config = RunConfig::default();
        config.engines = EnginesConfig::split_pair();
        config
            .engines
            .assignment
            .insert("GAPX".to_string(), "nowhere".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "engines.assignment", .. })
        ));
    }

    #[test]
    fn negative_species_limit_rejected() {
        let mut config = RunConfig::default();
        config.export.species_limit = -3000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "export.species_limit", .. })
        ));
        config.export.species_limit = 0;
        config.validate().unwrap();
    }

    #[test]
    fn primary_engine_defaults_to_first_detailed() {
        let engines = EnginesConfig::split_pair();
        assert_eq!(engines.primary_engine_name(), Some("engine-a"));
    }

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("a.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("a.json")).unwrap(), Format::Json);
        assert!(detect_format(Path::new("a.yaml")).is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let text = r#"
            [calorimeter]
            layers = 4

            [engines]
            multi = true
            split = true
            detailed = ["engine-a", "engine-b"]

            [engines.assignment]
            ABSO = "engine-b"
        "#;
        let config: RunConfig = toml::from_str(text).unwrap();
        assert_eq!(config.calorimeter.layers, 4);
        assert!((config.calorimeter.absorber_thickness - 1.0).abs() < 1e-12);
        assert_eq!(config.run.events, 5);
        assert_eq!(config.export.species_limit, 3000);
        config.validate().unwrap();
    }

    #[test]
    fn ron_and_json_round_trip() {
        let mut config = RunConfig::default();
        config.engines = EnginesConfig::split_pair();
        config.boundary.target_species = Some(Pdg::ELECTRON);

        let ron_text = ron::to_string(&config).unwrap();
        let from_ron: RunConfig = ron::from_str(&ron_text).unwrap();
        assert_eq!(from_ron, config);

        let json = serde_json::to_string(&config).unwrap();
        let from_json: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(from_json, config);
    }
}
