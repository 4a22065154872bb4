//! Engine identities and the volume-to-engine assignment.
//!
//! Engines are registered on an [`EngineRegistryBuilder`] and frozen into an
//! immutable [`EngineRegistry`]. Ids are dense from 0 in registration order
//! and stable for the run.

use std::collections::{BTreeMap, HashMap};

use crate::id::EngineId;

/// Errors raised while building the registry or resolving the assignment.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("no transport engine registered")]
    Empty,
    #[error("engine name '{0}' registered twice")]
    DuplicateName(String),
    #[error("{count} engines registered but multi-engine mode was not declared")]
    MultiEngineNotDeclared { count: usize },
    #[error("more than one fast engine registered")]
    MultipleFastEngines,
    #[error("volume '{volume}' is assigned to unknown engine '{engine}'")]
    UnknownEngine { volume: String, engine: String },
    #[error("engine '{0}' not found")]
    NotFound(String),
}

/// The two kinds of backend an identity can stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Iterative step-by-step transport.
    Detailed,
    /// One-shot parametric response.
    Fast,
}

#[derive(Debug, Clone)]
struct EngineDef {
    name: String,
    kind: EngineKind,
}

/// Builder for the immutable [`EngineRegistry`].
#[derive(Debug, Default)]
pub struct EngineRegistryBuilder {
    multi: bool,
    engines: Vec<EngineDef>,
}

impl EngineRegistryBuilder {
    /// Start a registry. `multi` declares multi-engine mode up front.
    pub fn new(multi: bool) -> Self {
        Self {
            multi,
            engines: Vec::new(),
        }
    }

    /// Register an engine. Returns its id.
    pub fn register(&mut self, name: &str, kind: EngineKind) -> EngineId {
        let id = EngineId(self.engines.len() as u32);
        self.engines.push(EngineDef {
            name: name.to_string(),
            kind,
        });
        id
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<EngineRegistry, RegistryError> {
        if self.engines.is_empty() {
            return Err(RegistryError::Empty);
        }
        if self.engines.len() > 1 && !self.multi {
            return Err(RegistryError::MultiEngineNotDeclared {
                count: self.engines.len(),
            });
        }
        let fast_count = self
            .engines
            .iter()
            .filter(|e| e.kind == EngineKind::Fast)
            .count();
        if fast_count > 1 {
            return Err(RegistryError::MultipleFastEngines);
        }

        let mut name_to_id = HashMap::new();
        for (i, engine) in self.engines.iter().enumerate() {
            if name_to_id
                .insert(engine.name.clone(), EngineId(i as u32))
                .is_some()
            {
                return Err(RegistryError::DuplicateName(engine.name.clone()));
            }
        }

        Ok(EngineRegistry {
            multi: self.multi,
            engines: self.engines,
            name_to_id,
        })
    }
}

/// Immutable registry of engine identities. Frozen after `build()`.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    multi: bool,
    engines: Vec<EngineDef>,
    name_to_id: HashMap<String, EngineId>,
}

impl EngineRegistry {
    pub fn id(&self, name: &str) -> Option<EngineId> {
        self.name_to_id.get(name).copied()
    }

    pub fn name(&self, id: EngineId) -> Option<&str> {
        self.engines.get(id.0 as usize).map(|e| e.name.as_str())
    }

    pub fn kind(&self, id: EngineId) -> Option<EngineKind> {
        self.engines.get(id.0 as usize).map(|e| e.kind)
    }

    pub fn contains(&self, id: EngineId) -> bool {
        (id.0 as usize) < self.engines.len()
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// All ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = EngineId> + '_ {
        (0..self.engines.len()).map(|i| EngineId(i as u32))
    }

    /// The fast engine, if one was registered.
    pub fn fast_engine(&self) -> Option<EngineId> {
        self.engines
            .iter()
            .position(|e| e.kind == EngineKind::Fast)
            .map(|i| EngineId(i as u32))
    }

    /// Engine names indexed by id.
    pub fn names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Volume assignment
// ---------------------------------------------------------------------------

/// Static map from volume name to the engine responsible for it.
///
/// Lookup is by exact name only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeAssignment {
    map: HashMap<String, EngineId>,
}

impl VolumeAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a volume-name to engine-name table against the registry.
    pub fn resolve(
        table: &BTreeMap<String, String>,
        registry: &EngineRegistry,
    ) -> Result<Self, RegistryError> {
        let mut map = HashMap::with_capacity(table.len());
        for (volume, engine) in table {
            let id = registry
                .id(engine)
                .ok_or_else(|| RegistryError::UnknownEngine {
                    volume: volume.clone(),
                    engine: engine.clone(),
                })?;
            map.insert(volume.clone(), id);
        }
        Ok(Self { map })
    }

    pub fn insert(&mut self, volume: &str, engine: EngineId) {
        self.map.insert(volume.to_string(), engine);
    }

    pub fn get(&self, volume: &str) -> Option<EngineId> {
        self.map.get(volume).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(String, EngineId)> for VolumeAssignment {
    fn from_iter<I: IntoIterator<Item = (String, EngineId)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}
