//! `detector_sim` — Seeded toy detectors: setups, particle gun and hit
//! simulation for exercising the track fitter.

pub mod hit_sim;
pub mod particle_gun;
pub mod scenarios;

pub use hit_sim::{HitSimConfig, HitSimulator, SimulatedTrack};
pub use particle_gun::{ParticleGun, ParticleGunConfig};
pub use scenarios::{Layer, Readout, Scenario, ScenarioKind};
