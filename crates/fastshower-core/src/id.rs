use serde::{Deserialize, Serialize};

/// Sequence number of a track within one event. Assigned by the stack in push order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

/// Identity of a registered transport engine. Stable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineId(pub u32);

/// Index of a named volume in the calorimeter geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub u16);

/// PDG Monte Carlo particle code. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pdg(pub i32);

impl Pdg {
    pub const GEANTINO: Pdg = Pdg(0);
    pub const ELECTRON: Pdg = Pdg(11);
    pub const POSITRON: Pdg = Pdg(-11);
    pub const MUON: Pdg = Pdg(13);
    pub const ANTI_MUON: Pdg = Pdg(-13);
    pub const GAMMA: Pdg = Pdg(22);
    pub const PI_PLUS: Pdg = Pdg(211);
    pub const PI_MINUS: Pdg = Pdg(-211);
    pub const NEUTRON: Pdg = Pdg(2112);
    pub const PROTON: Pdg = Pdg(2212);

    /// Rest mass in GeV. Unknown species are treated as massless.
    pub fn mass(self) -> f64 {
        match self.0.abs() {
            11 => 0.510_998_95e-3,
            13 => 0.105_658_4,
            211 => 0.139_570_4,
            2112 => 0.939_565_4,
            2212 => 0.938_272_1,
            _ => 0.0,
        }
    }

    /// Electric charge in units of e.
    pub fn charge(self) -> f64 {
        match self.0 {
            11 | 13 | -211 | -2212 => -1.0,
            -11 | -13 | 211 | 2212 => 1.0,
            _ => 0.0,
        }
    }

    /// Whether the species is an electron or positron.
    pub fn is_lepton_em(self) -> bool {
        self.0.abs() == 11
    }
}

impl std::fmt::Display for Pdg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_id_equality() {
        assert_eq!(EngineId(0), EngineId(0));
        assert_ne!(EngineId(0), EngineId(1));
    }

    #[test]
    fn track_ids_order_by_sequence() {
        let mut ids = vec![TrackId(3), TrackId(0), TrackId(2)];
        ids.sort();
        assert_eq!(ids, vec![TrackId(0), TrackId(2), TrackId(3)]);
    }

    #[test]
    fn electron_and_positron_have_opposite_charge() {
        assert_eq!(Pdg::ELECTRON.charge(), -Pdg::POSITRON.charge());
        assert_eq!(Pdg::GAMMA.charge(), 0.0);
        assert!(Pdg::POSITRON.is_lepton_em());
        assert!(!Pdg::GAMMA.is_lepton_em());
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Pdg::ELECTRON, "e-");
        map.insert(Pdg::GAMMA, "gamma");
        assert_eq!(map[&Pdg(11)], "e-");
    }
}
