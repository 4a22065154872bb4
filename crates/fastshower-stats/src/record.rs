//! The per-run output record and its persistence.
//!
//! A [`RunRecord`] holds one independent entry per named histogram. Files
//! are written in the format implied by their extension: `.json`, `.ron`,
//! or `.bin` (bitcode behind a versioned header).

use std::path::Path;

use fastshower_core::fast::{CumulativeTable, TableError};
use serde::{Deserialize, Serialize};

use crate::fit::GaussFit;
use crate::histogram::{H1, H2, HistogramError, SpeciesCounts};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a binary run record.
pub const RECORD_MAGIC: u32 = 0xF5A5_0001;

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unsupported record format '{0}' (expected .json, .ron or .bin)")]
    UnsupportedFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", RECORD_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("histogram '{0}' not found in record")]
    MissingHistogram(String),
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    #[error("histogram '{name}': {source}")]
    Table { name: String, source: TableError },
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Run-level facts stored next to the histograms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub events: u64,
    pub seed: u64,
    pub species_limit: i32,
    pub engines: Vec<String>,
    pub split: bool,
    pub fast: bool,
}

/// A named per-event sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub values: Vec<u32>,
}

/// Everything a run exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub meta: RunMeta,
    pub h1: Vec<H1>,
    pub h2: Vec<H2>,
    pub counts: Vec<SpeciesCounts>,
    pub sequences: Vec<Sequence>,
    /// Gaussian fit of the gap energy deposit, when requested.
    pub fit: Option<GaussFit>,
}

impl RunRecord {
    pub fn h1(&self, name: &str) -> Option<&H1> {
        self.h1.iter().find(|h| h.name == name)
    }

    pub fn h2(&self, name: &str) -> Option<&H2> {
        self.h2.iter().find(|h| h.name == name)
    }

    pub fn counts(&self, name: &str) -> Option<&SpeciesCounts> {
        self.counts.iter().find(|c| c.name == name)
    }

    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.name == name)
    }

    /// Names of every entry, in storage order.
    pub fn names(&self) -> Vec<&str> {
        self.h1
            .iter()
            .map(|h| h.name.as_str())
            .chain(self.h2.iter().map(|h| h.name.as_str()))
            .chain(self.counts.iter().map(|c| c.name.as_str()))
            .chain(self.sequences.iter().map(|s| s.name.as_str()))
            .collect()
    }

    /// Rebuild the fast engine's cumulative table from a stored histogram.
    pub fn cumulative_table(&self, name: &str) -> Result<CumulativeTable, RecordError> {
        let hist = self
            .h1(name)
            .ok_or_else(|| RecordError::MissingHistogram(name.to_string()))?;
        hist.validate()?;
        CumulativeTable::from_bin_contents(&hist.contents).map_err(|source| RecordError::Table {
            name: name.to_string(),
            source,
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn to_bytes(&self, format: RecordFormat) -> Result<Vec<u8>, RecordError> {
        match format {
            RecordFormat::Json => serde_json::to_vec_pretty(self)
                .map_err(|e| RecordError::Encode(e.to_string())),
            RecordFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map(String::into_bytes)
                .map_err(|e| RecordError::Encode(e.to_string())),
            RecordFormat::Bin => {
                let file = RecordFile {
                    header: RecordHeader::new(),
                    record: self.clone(),
                };
                bitcode::serialize(&file).map_err(|e| RecordError::Encode(e.to_string()))
            }
        }
    }

    pub fn from_bytes(format: RecordFormat, data: &[u8]) -> Result<Self, RecordError> {
        let record: Self = match format {
            RecordFormat::Json => {
                serde_json::from_slice(data).map_err(|e| RecordError::Decode(e.to_string()))?
            }
            RecordFormat::Ron => {
                let text =
                    std::str::from_utf8(data).map_err(|e| RecordError::Decode(e.to_string()))?;
                ron::from_str(text).map_err(|e| RecordError::Decode(e.to_string()))?
            }
            RecordFormat::Bin => {
                let file: RecordFile = bitcode::deserialize(data)
                    .map_err(|e| RecordError::Decode(e.to_string()))?;
                file.header.validate()?;
                file.record
            }
        };
        for hist in &record.h1 {
            hist.validate()?;
        }
        Ok(record)
    }

    pub fn write(&self, path: &Path) -> Result<(), RecordError> {
        let bytes = self.to_bytes(RecordFormat::from_path(path)?)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, RecordError> {
        let format = RecordFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        Self::from_bytes(format, &data)
    }
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Ron,
    Bin,
}

impl RecordFormat {
    pub fn from_path(path: &Path) -> Result<Self, RecordError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("ron") => Ok(Self::Ron),
            Some("bin") => Ok(Self::Bin),
            other => Err(RecordError::UnsupportedFormat(
                other.unwrap_or("").to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordHeader {
    magic: u32,
    version: u32,
}

impl RecordHeader {
    fn new() -> Self {
        Self {
            magic: RECORD_MAGIC,
            version: FORMAT_VERSION,
        }
    }

    fn validate(&self) -> Result<(), RecordError> {
        if self.magic != RECORD_MAGIC {
            return Err(RecordError::InvalidMagic(self.magic));
        }
        if self.version != FORMAT_VERSION {
            return Err(RecordError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordFile {
    header: RecordHeader,
    record: RunRecord,
}
