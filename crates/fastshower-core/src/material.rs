//! Material table for the toy transport.
//!
//! Only the quantities the transport needs: radiation length, minimum
//! ionisation loss and per-material production cuts for photons and
//! electrons (the 1 mm-equivalent cuts of the reference calorimeter).

use serde::{Deserialize, Serialize};

/// Transport-relevant properties of a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// g/cm3
    pub density: f64,
    /// Radiation length in cm.
    pub radiation_length: f64,
    /// Ionisation loss of a minimum-ionising particle, GeV/cm.
    pub dedx: f64,
    /// Photon tracking cut, GeV.
    pub cut_gamma: f64,
    /// Electron tracking cut (kinetic), GeV.
    pub cut_electron: f64,
}

impl Material {
    /// Whether the material is effectively vacuum.
    pub fn is_vacuum(&self) -> bool {
        self.density < 1e-10
    }
}

// name, density, X0 [cm], dE/dx [GeV/cm], gamma cut, electron cut
const TABLE: &[(&str, f64, f64, f64, f64, f64)] = &[
    ("Galactic", 1.0e-16, 1.0e30, 0.0, 990.0e-9, 990.0e-9),
    ("Air", 1.29e-3, 30_390.0, 2.19e-6, 990.0e-9, 990.0e-9),
    ("Aluminium", 2.700, 8.897, 4.36e-3, 10.0e-6, 597.0e-6),
    ("liquidArgon", 1.390, 14.0, 2.12e-3, 6.178e-6, 342.9e-6),
    ("Lead", 11.35, 0.5612, 12.73e-3, 100.5e-6, 1.378e-3),
    ("Water", 1.000, 36.08, 1.99e-3, 2.902e-6, 347.2e-6),
    ("Scintillator", 1.032, 42.54, 2.0e-3, 2.369e-6, 355.8e-6),
];

/// Look up a material by its exact name.
pub fn find_material(name: &str) -> Option<Material> {
    TABLE
        .iter()
        .find(|(n, ..)| *n == name)
        .map(|&(n, density, x0, dedx, cut_gamma, cut_electron)| Material {
            name: n.to_string(),
            density,
            radiation_length: x0,
            dedx,
            cut_gamma,
            cut_electron,
        })
}

/// Names of all known materials.
pub fn material_names() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|(n, ..)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_is_dense_and_short() {
        let lead = find_material("Lead").unwrap();
        let argon = find_material("liquidArgon").unwrap();
        assert!(lead.radiation_length < argon.radiation_length);
        assert!(lead.cut_electron > argon.cut_electron);
    }

    #[test]
    fn galactic_is_vacuum() {
        assert!(find_material("Galactic").unwrap().is_vacuum());
        assert!(!find_material("Water").unwrap().is_vacuum());
    }

    #[test]
    fn lookup_is_exact() {
        assert!(find_material("lead").is_none());
        assert!(find_material("Lead ").is_none());
        assert_eq!(material_names().count(), TABLE.len());
    }
}
