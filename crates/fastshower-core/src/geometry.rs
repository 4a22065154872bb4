//! The sampling calorimeter.
//!
//! The world box `WRLD` holds the calorimeter `CALO`, which is divided along
//! x into layers `LAYE`, each made of an absorber slab `ABSO` followed by a
//! gap slab `GAPX`. Layer copy numbers start at 1. Point location uses
//! half-open intervals, so a point on a shared face belongs to the volume
//! on the upper side.

use serde::{Deserialize, Serialize};

use crate::id::VolumeId;
use crate::material::{Material, find_material};

pub const WORLD: &str = "WRLD";
pub const CALORIMETER: &str = "CALO";
pub const LAYER: &str = "LAYE";
pub const ABSORBER: &str = "ABSO";
pub const GAP: &str = "GAPX";
/// Name reported for a step taken by a track that is outside the world.
pub const OUTSIDE_WORLD: &str = "OUTSIDE";

const WORLD_ID: VolumeId = VolumeId(0);
const CALORIMETER_ID: VolumeId = VolumeId(1);
const LAYER_ID: VolumeId = VolumeId(2);
const ABSORBER_ID: VolumeId = VolumeId(3);
const GAP_ID: VolumeId = VolumeId(4);

/// Ratio of world size to calorimeter size.
const WORLD_MARGIN: f64 = 1.2;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Calorimeter parameters (lengths in cm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalorimeterConfig {
    pub layers: u32,
    pub absorber_thickness: f64,
    pub gap_thickness: f64,
    pub calor_size_yz: f64,
    pub default_material: String,
    pub absorber_material: String,
    pub gap_material: String,
}

impl Default for CalorimeterConfig {
    fn default() -> Self {
        Self {
            layers: 10,
            absorber_thickness: 1.0,
            gap_thickness: 0.5,
            calor_size_yz: 10.0,
            default_material: "Galactic".to_string(),
            absorber_material: "Lead".to_string(),
            gap_material: "liquidArgon".to_string(),
        }
    }
}

/// Errors raised while constructing the geometry.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("calorimeter needs at least one layer")]
    NoLayers,
    #[error("{what} must be positive, got {value}")]
    NonPositive { what: &'static str, value: f64 },
    #[error("unknown material '{0}'")]
    UnknownMaterial(String),
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Where a point sits: the innermost volume and the layer copy number
/// (0 outside the calorimeter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub volume: VolumeId,
    pub copy_no: u32,
}

#[derive(Debug, Clone)]
struct VolumeDef {
    name: String,
    material: Material,
}

/// The constructed calorimeter geometry.
#[derive(Debug, Clone)]
pub struct Geometry {
    config: CalorimeterConfig,
    volumes: Vec<VolumeDef>,
    layer_thickness: f64,
    calor_thickness: f64,
    world_size_x: f64,
    world_size_yz: f64,
}

impl Geometry {
    /// Build the geometry, computing the derived calorimeter parameters.
    pub fn new(config: &CalorimeterConfig) -> Result<Self, GeometryError> {
        if config.layers == 0 {
            return Err(GeometryError::NoLayers);
        }
        for (what, value) in [
            ("absorber thickness", config.absorber_thickness),
            ("gap thickness", config.gap_thickness),
            ("calorimeter transverse size", config.calor_size_yz),
        ] {
            if !(value > 0.0) {
                return Err(GeometryError::NonPositive { what, value });
            }
        }

        let material = |name: &str| {
            find_material(name).ok_or_else(|| GeometryError::UnknownMaterial(name.to_string()))
        };
        let default = material(&config.default_material)?;
        let volumes = vec![
            VolumeDef { name: WORLD.to_string(), material: default.clone() },
            VolumeDef { name: CALORIMETER.to_string(), material: default.clone() },
            VolumeDef { name: LAYER.to_string(), material: default },
            VolumeDef { name: ABSORBER.to_string(), material: material(&config.absorber_material)? },
            VolumeDef { name: GAP.to_string(), material: material(&config.gap_material)? },
        ];

        let layer_thickness = config.absorber_thickness + config.gap_thickness;
        let calor_thickness = config.layers as f64 * layer_thickness;
        Ok(Self {
            config: config.clone(),
            volumes,
            layer_thickness,
            calor_thickness,
            world_size_x: WORLD_MARGIN * calor_thickness,
            world_size_yz: WORLD_MARGIN * config.calor_size_yz,
        })
    }

    pub fn config(&self) -> &CalorimeterConfig {
        &self.config
    }

    pub fn n_layers(&self) -> u32 {
        self.config.layers
    }

    pub fn layer_thickness(&self) -> f64 {
        self.layer_thickness
    }

    pub fn calor_thickness(&self) -> f64 {
        self.calor_thickness
    }

    pub fn calor_size_yz(&self) -> f64 {
        self.config.calor_size_yz
    }

    pub fn world_size_x(&self) -> f64 {
        self.world_size_x
    }

    pub fn world_size_yz(&self) -> f64 {
        self.world_size_yz
    }

    pub fn world_id(&self) -> VolumeId {
        WORLD_ID
    }

    pub fn absorber_id(&self) -> VolumeId {
        ABSORBER_ID
    }

    pub fn gap_id(&self) -> VolumeId {
        GAP_ID
    }

    /// Look up a volume by exact name.
    pub fn volume_id(&self, name: &str) -> Option<VolumeId> {
        self.volumes
            .iter()
            .position(|v| v.name == name)
            .map(|i| VolumeId(i as u16))
    }

    /// Name of a volume. Unknown ids map to an empty string.
    pub fn volume_name(&self, id: VolumeId) -> &str {
        self.volumes
            .get(id.0 as usize)
            .map(|v| v.name.as_str())
            .unwrap_or("")
    }

    /// All volume names, indexed by `VolumeId`.
    pub fn volume_names(&self) -> Vec<String> {
        self.volumes.iter().map(|v| v.name.clone()).collect()
    }

    pub fn material(&self, id: VolumeId) -> &Material {
        let index = (id.0 as usize).min(self.volumes.len() - 1);
        &self.volumes[index].material
    }

    /// Locate a point. Returns `None` outside the world.
    pub fn locate(&self, p: [f64; 3]) -> Option<Location> {
        let hw = self.world_size_x / 2.0;
        let hwyz = self.world_size_yz / 2.0;
        if !(within(p[0], -hw, hw) && within(p[1], -hwyz, hwyz) && within(p[2], -hwyz, hwyz)) {
            return None;
        }
        if !self.in_calorimeter(p) {
            return Some(Location { volume: WORLD_ID, copy_no: 0 });
        }

        let rel = p[0] + self.calor_thickness / 2.0;
        let last = self.config.layers as i64 - 1;
        let layer = ((rel / self.layer_thickness).floor() as i64).clamp(0, last);
        let local = rel - layer as f64 * self.layer_thickness;
        let volume = if local < self.config.absorber_thickness {
            ABSORBER_ID
        } else {
            GAP_ID
        };
        Some(Location { volume, copy_no: layer as u32 + 1 })
    }

    /// Distance from `p` along unit direction `dir` to the boundary of the
    /// volume at `location`.
    pub fn distance_to_boundary(&self, p: [f64; 3], dir: [f64; 3], location: Location) -> f64 {
        let hc = self.calor_thickness / 2.0;
        let hcyz = self.config.calor_size_yz / 2.0;
        match location.volume {
            ABSORBER_ID | GAP_ID => {
                let layer_lo = -hc + (location.copy_no.max(1) - 1) as f64 * self.layer_thickness;
                let (lo, hi) = if location.volume == ABSORBER_ID {
                    (layer_lo, layer_lo + self.config.absorber_thickness)
                } else {
                    (layer_lo + self.config.absorber_thickness, layer_lo + self.layer_thickness)
                };
                exit_distance(p, dir, [lo, -hcyz, -hcyz], [hi, hcyz, hcyz])
            }
            _ => {
                let hw = self.world_size_x / 2.0;
                let hwyz = self.world_size_yz / 2.0;
                let to_exit = exit_distance(p, dir, [-hw, -hwyz, -hwyz], [hw, hwyz, hwyz]);
                let to_calo = entry_distance(p, dir, [-hc, -hcyz, -hcyz], [hc, hcyz, hcyz]);
                to_exit.min(to_calo)
            }
        }
    }

    /// Copy number of the layer spanning `x`, clamped to the first and last
    /// layer.
    pub fn layer_at(&self, x: f64) -> u32 {
        let rel = x + self.calor_thickness / 2.0;
        let layer = (rel / self.layer_thickness).floor() as i64;
        layer.clamp(0, self.config.layers as i64 - 1) as u32 + 1
    }

    fn in_calorimeter(&self, p: [f64; 3]) -> bool {
        let hc = self.calor_thickness / 2.0;
        let hcyz = self.config.calor_size_yz / 2.0;
        within(p[0], -hc, hc) && within(p[1], -hcyz, hcyz) && within(p[2], -hcyz, hcyz)
    }

    /// A serializable description of the volumes and their placements.
    pub fn describe(&self) -> GeometryDescription {
        let hc = self.calor_thickness / 2.0;
        let hcyz = self.config.calor_size_yz / 2.0;
        let abs = self.config.absorber_thickness;
        let gap = self.config.gap_thickness;
        let layer_centres: Vec<(u32, f64)> = (0..self.config.layers)
            .map(|i| (i + 1, -hc + (i as f64 + 0.5) * self.layer_thickness))
            .collect();

        let single = |x: f64| vec![Placement { copy_no: 1, x, y: 0.0, z: 0.0 }];
        let in_layers = |offset: f64| {
            layer_centres
                .iter()
                .map(|&(copy_no, x)| Placement { copy_no, x: x + offset, y: 0.0, z: 0.0 })
                .collect::<Vec<_>>()
        };

        let shape = |id: VolumeId, half: [f64; 3], placements: Vec<Placement>| VolumeDescription {
            name: self.volume_name(id).to_string(),
            material: self.material(id).name.clone(),
            half_sizes: half,
            placements,
        };

        GeometryDescription {
            volumes: vec![
                shape(
                    WORLD_ID,
                    [self.world_size_x / 2.0, self.world_size_yz / 2.0, self.world_size_yz / 2.0],
                    single(0.0),
                ),
                shape(CALORIMETER_ID, [hc, hcyz, hcyz], single(0.0)),
                shape(LAYER_ID, [self.layer_thickness / 2.0, hcyz, hcyz], in_layers(0.0)),
                shape(ABSORBER_ID, [abs / 2.0, hcyz, hcyz], in_layers(-gap / 2.0)),
                shape(GAP_ID, [gap / 2.0, hcyz, hcyz], in_layers(abs / 2.0)),
            ],
        }
    }
}

fn within(v: f64, lo: f64, hi: f64) -> bool {
    v >= lo && v < hi
}

/// Distance to leave an axis-aligned box from a point inside it.
fn exit_distance(p: [f64; 3], dir: [f64; 3], lo: [f64; 3], hi: [f64; 3]) -> f64 {
    let mut best = f64::INFINITY;
    for axis in 0..3 {
        let d = dir[axis];
        let t = if d > 0.0 {
            (hi[axis] - p[axis]) / d
        } else if d < 0.0 {
            (lo[axis] - p[axis]) / d
        } else {
            continue;
        };
        best = best.min(t.max(0.0));
    }
    best
}

/// Distance to enter an axis-aligned box from a point outside it, or
/// infinity if the ray misses. A point on the upper face is outside the
/// half-open box and enters at distance 0 when moving inward; a ray running
/// along that face never enters.
fn entry_distance(p: [f64; 3], dir: [f64; 3], lo: [f64; 3], hi: [f64; 3]) -> f64 {
    let mut t_near = f64::NEG_INFINITY;
    let mut t_far = f64::INFINITY;
    for axis in 0..3 {
        let d = dir[axis];
        if d == 0.0 {
            if p[axis] < lo[axis] || p[axis] >= hi[axis] {
                return f64::INFINITY;
            }
            continue;
        }
        let t1 = (lo[axis] - p[axis]) / d;
        let t2 = (hi[axis] - p[axis]) / d;
        t_near = t_near.max(t1.min(t2));
        t_far = t_far.min(t1.max(t2));
    }
    let t_enter = t_near.max(0.0);
    if t_far > t_enter {
        t_enter
    } else {
        f64::INFINITY
    }
}

// ---------------------------------------------------------------------------
// Export description
// ---------------------------------------------------------------------------

/// A placed copy of a volume (centre in the world frame, cm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub copy_no: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A box volume with its material and placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDescription {
    pub name: String,
    pub material: String,
    pub half_sizes: [f64; 3],
    pub placements: Vec<Placement>,
}

/// Exportable geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryDescription {
    pub volumes: Vec<VolumeDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_geometry() -> Geometry {
        Geometry::new(&CalorimeterConfig::default()).unwrap()
    }

    #[test]
    fn derived_sizes() {
        let geo = default_geometry();
        assert!((geo.layer_thickness() - 1.5).abs() < 1e-12);
        assert!((geo.calor_thickness() - 15.0).abs() < 1e-12);
        assert!((geo.world_size_x() - 18.0).abs() < 1e-12);
        assert!((geo.world_size_yz() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn locate_layers_and_slabs() {
        let geo = default_geometry();
        // First layer starts at x = -7.5: absorber [-7.5, -6.5), gap [-6.5, -6.0).
        let abso = geo.locate([-7.0, 0.0, 0.0]).unwrap();
        assert_eq!(geo.volume_name(abso.volume), ABSORBER);
        assert_eq!(abso.copy_no, 1);

        let gap = geo.locate([-6.2, 0.0, 0.0]).unwrap();
        assert_eq!(geo.volume_name(gap.volume), GAP);
        assert_eq!(gap.copy_no, 1);

        let last = geo.locate([7.4, 0.0, 0.0]).unwrap();
        assert_eq!(geo.volume_name(last.volume), GAP);
        assert_eq!(last.copy_no, 10);
    }

    #[test]
    fn shared_face_belongs_to_upper_volume() {
        let geo = default_geometry();
        let at_face = geo.locate([-6.5, 0.0, 0.0]).unwrap();
        assert_eq!(geo.volume_name(at_face.volume), GAP);
        let calo_face = geo.locate([-7.5, 0.0, 0.0]).unwrap();
        assert_eq!(geo.volume_name(calo_face.volume), ABSORBER);
    }

    #[test]
    fn world_and_outside() {
        let geo = default_geometry();
        let w = geo.locate([-8.5, 0.0, 0.0]).unwrap();
        assert_eq!(w.volume, geo.world_id());
        assert_eq!(w.copy_no, 0);
        assert!(geo.locate([9.5, 0.0, 0.0]).is_none());
        assert!(geo.locate([0.0, 6.0, 0.0]).is_none());
    }

    #[test]
    fn distance_inside_absorber() {
        let geo = default_geometry();
        let loc = geo.locate([-7.0, 0.0, 0.0]).unwrap();
        let d = geo.distance_to_boundary([-7.0, 0.0, 0.0], [1.0, 0.0, 0.0], loc);
        assert!((d - 0.5).abs() < 1e-12);
        let back = geo.distance_to_boundary([-7.0, 0.0, 0.0], [-1.0, 0.0, 0.0], loc);
        assert!((back - 0.5).abs() < 1e-12);
    }

    #[test]
    fn distance_from_world_hits_calorimeter() {
        let geo = default_geometry();
        let loc = geo.locate([-9.0, 0.0, 0.0]).unwrap();
        let d = geo.distance_to_boundary([-9.0, 0.0, 0.0], [1.0, 0.0, 0.0], loc);
        assert!((d - 1.5).abs() < 1e-12);
        // Moving away from the calorimeter, the world face is the limit.
        let out = geo.distance_to_boundary([-8.5, 0.0, 0.0], [-1.0, 0.0, 0.0], loc);
        assert!((out - 0.5).abs() < 1e-12);
    }

    #[test]
    fn upper_calorimeter_face_is_an_entry_point() {
        let geo = default_geometry();
        let face = [7.5, 0.0, 0.0];
        let loc = geo.locate(face).unwrap();
        assert_eq!(loc.volume, geo.world_id());
        assert_eq!(geo.distance_to_boundary(face, [-1.0, 0.0, 0.0], loc), 0.0);
        // Sliding along the face stays outside; the world wall limits.
        let along = geo.distance_to_boundary(face, [0.0, 1.0, 0.0], loc);
        assert!((along - 6.0).abs() < 1e-12);
        // Leaving through +x the world face at 9 is next.
        let away = geo.distance_to_boundary(face, [1.0, 0.0, 0.0], loc);
        assert!((away - 1.5).abs() < 1e-12);
    }

    #[test]
    fn layer_at_clamps() {
        let geo = default_geometry();
        assert_eq!(geo.layer_at(-100.0), 1);
        assert_eq!(geo.layer_at(-6.0), 2);
        assert_eq!(geo.layer_at(100.0), 10);
    }

    #[test]
    fn rejects_bad_config() {
        let mut config = CalorimeterConfig::default();
        config.layers = 0;
        assert!(matches!(Geometry::new(&config), Err(GeometryError::NoLayers)));

        let mut config = CalorimeterConfig::default();
        config.gap_thickness = 0.0;
        assert!(matches!(Geometry::new(&config), Err(GeometryError::NonPositive { .. })));

        let mut config = CalorimeterConfig::default();
        config.absorber_material = "Unobtainium".to_string();
        assert!(matches!(Geometry::new(&config), Err(GeometryError::UnknownMaterial(_))));
    }

    #[test]
    fn volume_lookup_is_exact() {
        let geo = default_geometry();
        assert_eq!(geo.volume_id("ABSO"), Some(geo.absorber_id()));
        assert_eq!(geo.volume_id("abso"), None);
        assert_eq!(geo.volume_names().len(), 5);
    }

    #[test]
    fn description_places_every_layer() {
        let geo = default_geometry();
        let desc = geo.describe();
        let abso = desc.volumes.iter().find(|v| v.name == ABSORBER).unwrap();
        assert_eq!(abso.placements.len(), 10);
        assert_eq!(abso.material, "Lead");
        assert!((abso.placements[0].x - (-7.0)).abs() < 1e-12);
    }
}
