//! Scenario definitions.
//!
//! Each scenario is a named detector setup plus a particle gun and a hit
//! simulator configuration. All scenarios are deterministic given the same
//! seed.

use crate::hit_sim::{HitSimConfig, HitSimulator, SimulatedTrack};
use crate::particle_gun::{ParticleGun, ParticleGunConfig};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::Arc;
use track_fit::{
    CompositeConfig, CompositeExtrapolator, DetectorPlane, GeometryNavigator, IterativeFitConfig,
    IterativeTrackFitter, MaterialEffects, MaterialSlab, ParticleHypothesis, PropagatorConfig,
    TrackFitter, TrackPropagator, UniformField,
};
use tracing::debug;

/// 330 µm of silicon
const SENSOR_X0: f64 = 0.0035;
/// Half size of every sensor (mm)
const HALF_WIDTH: f64 = 100.0;

/// Which pre-defined setup to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScenarioKind {
    /// 6 pixel planes, no field
    PixelTelescope,
    /// 8 axial/stereo strip planes inside a 0.5 T dipole
    StripTracker,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Readout {
    /// Both coordinates, `resolution` mm each
    Pixel { resolution: f64 },
    /// Plane-local u only
    Strip { resolution: f64 },
}

/// One sensitive detector layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub plane: Arc<DetectorPlane>,
    pub readout: Readout,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub kind: ScenarioKind,
    pub seed: u64,
    /// Sorted by z
    pub layers: Vec<Layer>,
    pub field: UniformField,
    pub particle: ParticleHypothesis,
    pub gun: ParticleGunConfig,
    pub hit_sim: HitSimConfig,
    pub n_tracks: usize,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::PixelTelescope => Self::pixel_telescope(seed),
            ScenarioKind::StripTracker => Self::strip_tracker(seed),
        }
    }

    // -----------------------------------------------------------------------
    // Pixel telescope
    // -----------------------------------------------------------------------
    fn pixel_telescope(seed: u64) -> Self {
        let layers = (1..=6)
            .map(|i| Layer {
                plane: Arc::new(DetectorPlane::z_plane(
                    format!("P{i}"),
                    100.0 * i as f64,
                    0.0,
                    SENSOR_X0,
                )
                .with_extents(HALF_WIDTH, HALF_WIDTH)),
                readout: Readout::Pixel { resolution: 0.01 },
            })
            .collect();

        Scenario {
            name: "pixel_telescope".into(),
            kind: ScenarioKind::PixelTelescope,
            seed,
            layers,
            field: UniformField::dipole_y(0.0, 1000.0),
            particle: ParticleHypothesis::pion(),
            gun: ParticleGunConfig::default(),
            hit_sim: HitSimConfig::default(),
            n_tracks: 100,
        }
    }

    // -----------------------------------------------------------------------
    // Strip tracker in a dipole
    // -----------------------------------------------------------------------
    fn strip_tracker(seed: u64) -> Self {
        let angles = [0.0, FRAC_PI_2, FRAC_PI_4, -FRAC_PI_4];
        let layers = (1..=8)
            .map(|i| Layer {
                plane: Arc::new(DetectorPlane::z_plane(
                    format!("S{i}"),
                    100.0 * i as f64,
                    angles[(i - 1) % angles.len()],
                    SENSOR_X0,
                )
                .with_extents(HALF_WIDTH, HALF_WIDTH)),
                readout: Readout::Strip { resolution: 0.02 },
            })
            .collect();

        Scenario {
            name: "strip_tracker".into(),
            kind: ScenarioKind::StripTracker,
            seed,
            layers,
            field: UniformField::dipole_y(0.5, 1000.0),
            particle: ParticleHypothesis::muon(),
            gun: ParticleGunConfig {
                p_min: 2.0,
                p_max: 20.0,
                ..Default::default()
            },
            hit_sim: HitSimConfig::default(),
            n_tracks: 100,
        }
    }

    /// Slabs for every layer's sensor.
    pub fn navigator(&self) -> GeometryNavigator<MaterialSlab> {
        self.layers.iter().map(|l| l.plane.material_slab()).collect()
    }

    /// RK4 inside the field volume, straight line beyond it.
    pub fn extrapolator(&self) -> CompositeExtrapolator<UniformField> {
        let config = CompositeConfig {
            z_threshold: self.field.z_max.min(CompositeConfig::default().z_threshold),
            ..Default::default()
        };
        CompositeExtrapolator::new(self.field, config)
    }

    /// Iterative fitter over this scenario's geometry and field.
    pub fn fitter(
        &self,
        config: IterativeFitConfig,
    ) -> IterativeTrackFitter<CompositeExtrapolator<UniformField>> {
        let propagator = TrackPropagator::new(
            self.extrapolator(),
            self.navigator(),
            MaterialEffects::default(),
            PropagatorConfig::default(),
        );
        IterativeTrackFitter::new(TrackFitter::new(propagator), config)
    }

    /// Simulate `n_tracks` particles. Particles the extrapolator cannot
    /// carry through the detector are skipped.
    pub fn simulate(&self) -> Vec<SimulatedTrack> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut sim = HitSimulator::new(self.hit_sim, self.seed.wrapping_add(1));
        let gun = ParticleGun::new(self.gun);
        let extrapolator = self.extrapolator();

        let mut tracks = Vec::with_capacity(self.n_tracks);
        for i in 0..self.n_tracks {
            let truth = gun.fire(&mut rng);
            match sim.simulate(&extrapolator, &self.layers, self.particle, &truth) {
                Ok((truth_at_layers, hits)) => tracks.push(SimulatedTrack {
                    truth,
                    truth_at_layers,
                    hits,
                    seed: gun.seed(&truth, &mut rng),
                    particle: self.particle,
                }),
                Err(err) => debug!(track = i, %err, "particle lost in simulation"),
            }
        }
        tracks
    }
}
