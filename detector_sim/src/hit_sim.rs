//! Hit simulator.
//!
//! Transports a true particle through the detector layers and produces:
//! - Gaussian-smeared pixel or strip hits
//! - a miss with probability 1 − efficiency
//! - Highland multiple-scattering kicks on the slopes at every layer
//! - mean energy loss in every layer

use crate::scenarios::{Layer, Readout};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use track_fit::material::{energy_loss, highland_theta_sq, qp_after_loss, slope_noise};
use track_fit::types::param;
use track_fit::{
    FitResult, Hit, ParticleHypothesis, PixelHit, PlaneStripHit, Track, TrackExtrapolator,
    TrackState,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitSimConfig {
    /// Probability that a crossed layer records a hit
    pub efficiency: f64,
    pub scattering: bool,
    pub energy_loss: bool,
}

impl Default for HitSimConfig {
    fn default() -> Self {
        Self {
            efficiency: 1.0,
            scattering: true,
            energy_loss: true,
        }
    }
}

/// One simulated particle with its hits and a fit seed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrack {
    /// True parameters at production
    pub truth: TrackState,
    /// True parameters just after each crossed layer
    pub truth_at_layers: Vec<TrackState>,
    pub hits: Vec<Hit>,
    pub seed: TrackState,
    pub particle: ParticleHypothesis,
}

impl SimulatedTrack {
    /// Unfitted track carrying the seed and the hits.
    pub fn to_track(&self) -> Track {
        Track::new(self.seed, self.particle).with_hits(self.hits.iter().cloned())
    }
}

pub struct HitSimulator {
    pub config: HitSimConfig,
    rng: ChaCha8Rng,
}

impl HitSimulator {
    pub fn new(config: HitSimConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn gauss(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    /// Transport `truth` through `layers` (ascending z) and record hits.
    ///
    /// Returns the true states after each layer and the detected hits.
    pub fn simulate<E: TrackExtrapolator>(
        &mut self,
        extrapolator: &E,
        layers: &[Layer],
        particle: ParticleHypothesis,
        truth: &TrackState,
    ) -> FitResult<(Vec<TrackState>, Vec<Hit>)> {
        let mut state = *truth;
        let mut states = Vec::with_capacity(layers.len());
        let mut hits = Vec::with_capacity(layers.len());

        for layer in layers {
            state = extrapolator.extrapolate(&state, layer.plane.z())?.state;

            if self.rng.gen::<f64>() < self.config.efficiency {
                hits.push(self.measure(&state, layer));
            }
            self.cross_material(&mut state, layer, particle);
            states.push(state);
        }
        Ok((states, hits))
    }

    fn measure(&mut self, state: &TrackState, layer: &Layer) -> Hit {
        match layer.readout {
            Readout::Pixel { resolution } => {
                let x = state.x() + resolution * self.gauss();
                let y = state.y() + resolution * self.gauss();
                PixelHit::new(x, y, resolution, resolution, 0.0, state.z).into()
            }
            Readout::Strip { resolution } => {
                let u = layer.plane.u(&state.position()) + resolution * self.gauss();
                PlaneStripHit::new(layer.plane.clone(), u, resolution).into()
            }
        }
    }

    fn cross_material(&mut self, state: &mut TrackState, layer: &Layer, particle: ParticleHypothesis) {
        if state.qp() == 0.0 {
            return;
        }
        let slab = layer.plane.material_slab();
        let path = slab.thickness * state.path_factor();
        let x_over_x0 = path / slab.material.radiation_length;

        if self.config.energy_loss {
            state.params[param::QP] = if particle.is_electron() {
                state.qp() * x_over_x0.exp()
            } else {
                let eloss = energy_loss(state.momentum(), particle.mass(), &slab.material, path);
                qp_after_loss(state.qp(), particle.mass(), eloss, true)
            };
        }

        if self.config.scattering {
            let theta_sq = highland_theta_sq(state.momentum(), particle.mass(), x_over_x0);
            let (cxx, cxy, cyy) = slope_noise(state, theta_sq);
            // Cholesky factor of the 2×2 slope covariance.
            let l11 = cxx.sqrt();
            let l21 = if l11 > 0.0 { cxy / l11 } else { 0.0 };
            let l22 = (cyy - l21 * l21).max(0.0).sqrt();
            let (g1, g2) = (self.gauss(), self.gauss());
            state.params[param::TX] += l11 * g1;
            state.params[param::TY] += l21 * g1 + l22 * g2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{Scenario, ScenarioKind};
    use approx::assert_abs_diff_eq;
    use track_fit::{LineExtrapolator, StateVec, SymMatrix5};

    fn truth() -> TrackState {
        TrackState::new(0.0, StateVec::new(0.1, -0.2, 0.05, 0.02, 0.25), SymMatrix5::zeros())
    }

    fn quiet() -> HitSimConfig {
        HitSimConfig {
            efficiency: 1.0,
            scattering: false,
            energy_loss: false,
        }
    }

    #[test]
    fn quiet_simulation_follows_the_line() {
        let scenario = Scenario::build(ScenarioKind::PixelTelescope, 1);
        let mut sim = HitSimulator::new(quiet(), 1);
        let line = LineExtrapolator::default();
        let (states, hits) = sim
            .simulate(&line, &scenario.layers, ParticleHypothesis::pion(), &truth())
            .unwrap();
        assert_eq!(hits.len(), scenario.layers.len());
        for (state, hit) in states.iter().zip(&hits) {
            assert_abs_diff_eq!(state.x(), 0.1 + 0.05 * state.z, epsilon = 1e-9);
            assert_eq!(hit.z(), state.z);
            let Hit::Pixel(p) = hit else {
                panic!("telescope layers read out pixels");
            };
            assert!((p.x() - state.x()).abs() < 10.0 * p.dx());
        }
    }

    #[test]
    fn efficiency_drops_hits() {
        let scenario = Scenario::build(ScenarioKind::PixelTelescope, 1);
        let line = LineExtrapolator::default();
        let mut sim = HitSimulator::new(
            HitSimConfig {
                efficiency: 0.0,
                ..quiet()
            },
            5,
        );
        let (states, hits) = sim
            .simulate(&line, &scenario.layers, ParticleHypothesis::pion(), &truth())
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(states.len(), scenario.layers.len());
    }

    #[test]
    fn material_slows_and_deflects() {
        let scenario = Scenario::build(ScenarioKind::PixelTelescope, 1);
        let line = LineExtrapolator::default();
        let mut sim = HitSimulator::new(HitSimConfig::default(), 9);
        let (states, _) = sim
            .simulate(&line, &scenario.layers, ParticleHypothesis::pion(), &truth())
            .unwrap();
        let last = states.last().unwrap();
        assert!(last.qp() > truth().qp());
        assert_ne!(last.tx(), truth().tx());
    }
}
