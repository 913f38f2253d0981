//! Energy loss and multiple scattering in detector material.
//!
//! Applied once per crossed [`MaterialSlab`], after the state has been
//! extrapolated onto the slab.
//!
//! ## Energy loss
//! - e±: bremsstrahlung, `q/p ← q/p·exp(±L/X0)` plus a q/p variance term.
//! - everything else: mean Bethe-Bloch loss (density-effect correction above
//!   0.5 GeV) shifting q/p, plus a straggling variance on q/p.
//!
//! ## Multiple scattering
//! Highland angle θ₀² injected into the slope block of the covariance
//! ("thin"), or into the slope block plus the position–slope and position
//! blocks ("thick", default).
//!
//! Lengths are in mm; the Bethe-Bloch constants are in cm, g/cm² and GeV.

use crate::error::{FitError, FitResult};
use crate::geometry::{Material, MaterialSlab};
use crate::particle::{ParticleHypothesis, ELECTRON_MASS};
use crate::types::{param, TrackState};
use serde::{Deserialize, Serialize};

/// Slabs with thickness × density below this are ignored.
const NEGLIGIBLE_MASS_THICKNESS: f64 = 1e-10;
/// Bethe-Bloch K = 4π N_A r_e² m_e c² (GeV cm²/mol)
const BETHE_BLOCH_K: f64 = 0.000_307_075;
const MM_PER_CM: f64 = 10.0;

/// Which scattering covariance to inject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScatteringModel {
    /// Slopes plus position–slope correlations over the slab thickness
    #[default]
    Thick,
    /// Slopes only
    Thin,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialEffectsConfig {
    pub energy_loss: bool,
    pub scattering: ScatteringModel,
}

impl Default for MaterialEffectsConfig {
    fn default() -> Self {
        Self {
            energy_loss: true,
            scattering: ScatteringModel::Thick,
        }
    }
}

/// Noise and energy-loss model for crossed material.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialEffects {
    pub config: MaterialEffectsConfig,
}

impl MaterialEffects {
    pub fn new(config: MaterialEffectsConfig) -> Self {
        Self { config }
    }

    /// State after crossing `slab`. `downstream` is the direction of
    /// propagation along z; upstream propagation restores lost energy.
    pub fn update(
        &self,
        state: &TrackState,
        slab: &MaterialSlab,
        particle: ParticleHypothesis,
        downstream: bool,
    ) -> FitResult<TrackState> {
        let material = &slab.material;
        if slab.thickness * material.density < NEGLIGIBLE_MASS_THICKNESS {
            return Ok(*state);
        }
        // Infinite momentum: no deflection, no loss.
        if state.qp() == 0.0 {
            return Ok(*state);
        }

        let path = slab.thickness * state.path_factor();
        let mut out = *state;

        if self.config.energy_loss {
            if particle.is_electron() {
                add_bremsstrahlung(&mut out, path / material.radiation_length, downstream);
            } else {
                let mass = particle.mass();
                let p = out.momentum();
                let eloss = energy_loss(p, mass, material, path);
                let qp = qp_after_loss(out.qp(), mass, eloss, downstream);
                out.params[param::QP] = qp;
                out.cov
                    .add_at(param::QP, param::QP, straggling_variance(qp, mass, material, path));
            }
        }

        let theta_sq = highland_theta_sq(
            out.momentum(),
            particle.mass(),
            path / material.radiation_length,
        );
        match self.config.scattering {
            ScatteringModel::Thick => add_thick_scattering(&mut out, theta_sq, slab.thickness, downstream),
            ScatteringModel::Thin => add_thin_scattering(&mut out, theta_sq),
            ScatteringModel::Off => {}
        }

        if !out.qp().is_finite() || !out.cov.is_finite() {
            return Err(FitError::NumericInvalidState {
                z: out.z,
                reason: "non-finite state after material effects",
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Energy loss
// ---------------------------------------------------------------------------

/// Mean ionisation loss dE/dx (GeV cm²/g) from the Bethe-Bloch formula.
pub fn bethe_bloch(p: f64, mass: f64, material: &Material) -> f64 {
    let (z, a, rho) = (material.atomic_number, material.atomic_mass, material.density);
    let energy = (p * p + mass * mass).sqrt();
    let beta = p / energy;
    let beta_sq = beta * beta;
    let beta_gamma = p / mass;
    let gamma = energy / mass;
    let bg_sq = beta_gamma * beta_gamma;

    let ratio = ELECTRON_MASS / mass;
    let t_max = 2.0 * ELECTRON_MASS * bg_sq / (1.0 + 2.0 * gamma * ratio + ratio * ratio);

    // Mean excitation energy (GeV)
    let i = 1e-9 * if z > 16.0 { 10.0 * z } else { 16.0 * z.powf(0.9) };

    let density_correction = if p > 0.5 {
        let plasma_energy = 28.816 * (rho * z / a).sqrt() * 1e-9;
        ((plasma_energy / i).ln() + beta_gamma.ln() - 0.5).max(0.0)
    } else {
        0.0
    };

    BETHE_BLOCH_K * (z / a) / beta_sq
        * (0.5 * (2.0 * ELECTRON_MASS * bg_sq * t_max / (i * i)).ln() - beta_sq - density_correction)
}

/// Mean energy lost (GeV) over `path` mm of `material`.
pub fn energy_loss(p: f64, mass: f64, material: &Material, path: f64) -> f64 {
    bethe_bloch(p, mass, material) * material.density * path / MM_PER_CM
}

/// q/p after losing (downstream) or regaining (upstream) `eloss` GeV.
/// A particle that would stop keeps its q/p.
pub fn qp_after_loss(qp: f64, mass: f64, eloss: f64, downstream: bool) -> f64 {
    let eloss = if downstream { eloss } else { -eloss };
    let p = 1.0 / qp.abs();
    let energy = (p * p + mass * mass).sqrt() - eloss;
    if energy <= mass {
        return qp;
    }
    qp.signum() / (energy * energy - mass * mass).sqrt()
}

/// Variance of q/p from energy-loss straggling over `path` mm.
pub fn straggling_variance(qp: f64, mass: f64, material: &Material, path: f64) -> f64 {
    let p = 1.0 / qp.abs();
    let energy = (p * p + mass * mass).sqrt();
    let ratio = ELECTRON_MASS / mass;
    let beta = p / energy;
    let gamma = energy / mass;
    let eta = beta * gamma;
    let step = path / MM_PER_CM;

    // keV
    let xi = 153.5 * material.atomic_number * step * material.density
        / (material.atomic_mass * beta * beta);
    let e_max = 1e6 * 2.0 * ELECTRON_MASS * eta * eta / (1.0 + 2.0 * ratio * gamma + ratio * ratio);
    let sigma_e_sq = xi * e_max * (1.0 - 0.5 * beta * beta) * 1e-12;

    (energy * energy * sigma_e_sq / p.powi(6)).abs()
}

fn add_bremsstrahlung(state: &mut TrackState, x_over_x0: f64, downstream: bool) {
    let t = if downstream { x_over_x0 } else { -x_over_x0 };
    let qp = state.qp() * t.exp();
    state.params[param::QP] = qp;
    let variance = qp
        * qp
        * ((-x_over_x0 * 3.0_f64.ln() / std::f64::consts::LN_2).exp()
            - (-2.0 * x_over_x0).exp());
    state.cov.add_at(param::QP, param::QP, variance);
}

// ---------------------------------------------------------------------------
// Multiple scattering
// ---------------------------------------------------------------------------

/// Highland θ₀² for momentum `p` through `x_over_x0` radiation lengths.
pub fn highland_theta_sq(p: f64, mass: f64, x_over_x0: f64) -> f64 {
    if x_over_x0 <= 0.0 {
        return 0.0;
    }
    let beta = p / (p * p + mass * mass).sqrt();
    let theta = 0.0136 / (beta * p) * x_over_x0.sqrt() * (1.0 + 0.038 * x_over_x0.ln());
    theta * theta
}

/// Slope-block noise (σ²_tx, cov, σ²_ty) for a scattering angle θ₀².
pub fn slope_noise(state: &TrackState, theta_sq: f64) -> (f64, f64, f64) {
    let (tx, ty) = (state.tx(), state.ty());
    let t = 1.0 + tx * tx + ty * ty;
    (
        (1.0 + tx * tx) * t * theta_sq,
        tx * ty * t * theta_sq,
        (1.0 + ty * ty) * t * theta_sq,
    )
}

fn add_thin_scattering(state: &mut TrackState, theta_sq: f64) {
    let (q33, q34, q44) = slope_noise(state, theta_sq);
    let c = &mut state.cov;
    c.add_at(param::TX, param::TX, q33);
    c.add_at(param::TX, param::TY, q34);
    c.add_at(param::TY, param::TY, q44);
}

fn add_thick_scattering(state: &mut TrackState, theta_sq: f64, thickness: f64, downstream: bool) {
    let (q33, q34, q44) = slope_noise(state, theta_sq);
    let t23 = thickness * thickness / 3.0;
    let t2 = 0.5 * thickness;
    let d = if downstream { 1.0 } else { -1.0 };

    let c = &mut state.cov;
    c.add_at(param::X, param::X, q33 * t23);
    c.add_at(param::X, param::Y, q34 * t23);
    c.add_at(param::X, param::TX, q33 * d * t2);
    c.add_at(param::X, param::TY, q34 * d * t2);
    c.add_at(param::Y, param::Y, q44 * t23);
    c.add_at(param::Y, param::TX, q34 * d * t2);
    c.add_at(param::Y, param::TY, q44 * d * t2);
    c.add_at(param::TX, param::TX, q33);
    c.add_at(param::TX, param::TY, q34);
    c.add_at(param::TY, param::TY, q44);
}
