//! Particle hypotheses: PDG id → mass used by the material model.

use serde::{Deserialize, Serialize};

/// Electron mass (GeV)
pub const ELECTRON_MASS: f64 = 0.000_510_998_950;
pub const MUON_MASS: f64 = 0.105_658_375_5;
pub const PION_MASS: f64 = 0.139_570_39;
pub const KAON_MASS: f64 = 0.493_677;
pub const PROTON_MASS: f64 = 0.938_272_088_16;

/// Mass hypothesis of the particle being fitted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleHypothesis {
    pdg: i32,
    mass: f64,
}

impl Default for ParticleHypothesis {
    /// Electron hypothesis.
    fn default() -> Self {
        Self::from_pdg(11)
    }
}

impl ParticleHypothesis {
    /// Look up the mass for a PDG id; unknown ids fall back to the pion mass.
    pub fn from_pdg(pdg: i32) -> Self {
        let mass = match pdg.abs() {
            11 => ELECTRON_MASS,
            13 => MUON_MASS,
            211 => PION_MASS,
            321 => KAON_MASS,
            2212 => PROTON_MASS,
            _ => PION_MASS,
        };
        Self { pdg, mass }
    }

    pub fn electron() -> Self {
        Self::from_pdg(11)
    }

    pub fn muon() -> Self {
        Self::from_pdg(13)
    }

    pub fn pion() -> Self {
        Self::from_pdg(211)
    }

    pub fn proton() -> Self {
        Self::from_pdg(2212)
    }

    pub fn pdg(&self) -> i32 {
        self.pdg
    }

    /// Mass in GeV.
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Electrons and positrons lose energy mainly by bremsstrahlung.
    pub fn is_electron(&self) -> bool {
        self.pdg.abs() == 11
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_ids() {
        assert!(ParticleHypothesis::from_pdg(-11).is_electron());
        assert_eq!(ParticleHypothesis::from_pdg(-13).mass(), MUON_MASS);
        assert_eq!(ParticleHypothesis::from_pdg(2212).mass(), PROTON_MASS);
        assert_eq!(ParticleHypothesis::from_pdg(999).mass(), PION_MASS);
        assert!(ParticleHypothesis::default().is_electron());
    }
}
