//! Particle gun: random true track parameters and smeared fit seeds.
//!
//! Momentum is drawn flat in [p_min, p_max], the charge sign with equal
//! probability, slopes flat in ±max_slope and the vertex from a Gaussian
//! beam spot at `z0`.

use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use track_fit::{StateVec, SymMatrix5, TrackState};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleGunConfig {
    /// Production plane (mm)
    pub z0: f64,
    /// Momentum range (GeV)
    pub p_min: f64,
    pub p_max: f64,
    /// Largest |tx| and |ty|
    pub max_slope: f64,
    /// Transverse beam spot width (mm)
    pub vertex_sigma: f64,
    /// Relative q/p resolution of the seed
    pub seed_qp_resolution: f64,
}

impl Default for ParticleGunConfig {
    fn default() -> Self {
        Self {
            z0: 0.0,
            p_min: 1.0,
            p_max: 10.0,
            max_slope: 0.1,
            vertex_sigma: 0.1,
            seed_qp_resolution: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ParticleGun {
    pub config: ParticleGunConfig,
}

impl ParticleGun {
    pub fn new(config: ParticleGunConfig) -> Self {
        Self { config }
    }

    /// True parameters of one particle at `z0` (zero covariance).
    pub fn fire(&self, rng: &mut impl Rng) -> TrackState {
        let c = &self.config;
        let p = rng.gen_range(c.p_min..=c.p_max);
        let charge = if rng.gen::<bool>() { 1.0 } else { -1.0 };
        let gx: f64 = rng.sample(StandardNormal);
        let gy: f64 = rng.sample(StandardNormal);
        let params = StateVec::new(
            c.vertex_sigma * gx,
            c.vertex_sigma * gy,
            rng.gen_range(-c.max_slope..=c.max_slope),
            rng.gen_range(-c.max_slope..=c.max_slope),
            charge / p,
        );
        TrackState::new(c.z0, params, SymMatrix5::zeros())
    }

    /// Seed covariance used for every fit.
    pub fn seed_covariance(&self, qp: f64) -> SymMatrix5 {
        let c = &self.config;
        let sx = 10.0 * c.vertex_sigma.max(0.01);
        let st = c.max_slope.max(0.01);
        let sqp = c.seed_qp_resolution * qp.abs();
        SymMatrix5::from_diagonal([sx * sx, sx * sx, st * st, st * st, sqp * sqp])
    }

    /// Fit seed: `truth` with a broad covariance and a q/p smeared by the
    /// configured resolution.
    pub fn seed(&self, truth: &TrackState, rng: &mut impl Rng) -> TrackState {
        let mut params = truth.params;
        let g: f64 = rng.sample(StandardNormal);
        params[4] *= 1.0 + self.config.seed_qp_resolution * g;
        TrackState::new(truth.z, params, self.seed_covariance(truth.qp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn fired_particles_respect_ranges() {
        let gun = ParticleGun::new(ParticleGunConfig {
            p_min: 2.0,
            p_max: 5.0,
            max_slope: 0.2,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..500 {
            let s = gun.fire(&mut rng);
            assert!(s.momentum() >= 2.0 - 1e-12 && s.momentum() <= 5.0 + 1e-12);
            assert!(s.tx().abs() <= 0.2 && s.ty().abs() <= 0.2);
            assert_eq!(s.z, 0.0);
        }
    }

    #[test]
    fn same_seed_same_particles() {
        let gun = ParticleGun::default();
        let a: Vec<_> = {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            (0..10).map(|_| gun.fire(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            (0..10).map(|_| gun.fire(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn seed_keeps_charge_and_position() {
        let gun = ParticleGun::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let truth = gun.fire(&mut rng);
        let seed = gun.seed(&truth, &mut rng);
        assert_eq!(seed.x(), truth.x());
        assert_eq!(seed.tx(), truth.tx());
        assert!(seed.cov.get(4, 4) > 0.0);
        assert_eq!(seed.z, truth.z);
    }
}
