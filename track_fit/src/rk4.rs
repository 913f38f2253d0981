//! Fourth-order Runge-Kutta extrapolation in a magnetic field.
//!
//! ## Equations of motion (z as the independent variable)
//! ```text
//! dx/dz  = tx
//! dy/dz  = ty
//! dtx/dz = κ·(q/p)·√(1+tx²+ty²)·[ tx·ty·Bx − (1+tx²)·By + ty·Bz ]
//! dty/dz = κ·(q/p)·√(1+tx²+ty²)·[ (1+ty²)·Bx − tx·ty·By − tx·Bz ]
//! ```
//! with κ = 0.000299792458 GeV/(T·mm). q/p is constant in vacuum.
//!
//! ## Transport matrix
//! The tx, ty and q/p columns of F are integrated alongside the state from
//! the linearised equations (field gradients neglected), so the x and y
//! columns stay unit vectors. Long steps are split into sub-steps no longer
//! than [`Rk4Config::max_step`] whose matrices are chained.

use crate::error::{FitError, FitResult};
use crate::extrapolator::{Extrapolation, TrackExtrapolator};
use crate::field::MagneticField;
use crate::linalg::TransportMatrix;
use crate::types::{param, StateBounds, StateVec, TrackState};
use nalgebra::{SVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Curvature constant κ in GeV/(T·mm).
pub const KAPPA: f64 = 0.000_299_792_458;

/// [x, y, tx, ty] followed by ∂/∂tx₀, ∂/∂ty₀ and ∂/∂(q/p)₀ of those four.
type Augmented = SVector<f64, 16>;

const COL_TX: usize = 4;
const COL_TY: usize = 8;
const COL_QP: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Rk4ConfigFields")]
pub struct Rk4Config {
    /// Longest single integration step (mm), finite and positive
    pub max_step: f64,
    pub bounds: StateBounds,
}

impl Default for Rk4Config {
    fn default() -> Self {
        Self {
            max_step: 100.0,
            bounds: StateBounds::default(),
        }
    }
}

impl Rk4Config {
    pub fn validate(&self) -> FitResult<()> {
        if !(self.max_step > 0.0) || !self.max_step.is_finite() {
            return Err(FitError::InvalidConfig("rk4 max_step must be finite and positive"));
        }
        Ok(())
    }
}

/// Serialized form of [`Rk4Config`], checked on the way in.
#[derive(Deserialize)]
#[serde(default)]
struct Rk4ConfigFields {
    max_step: f64,
    bounds: StateBounds,
}

impl Default for Rk4ConfigFields {
    fn default() -> Self {
        let Rk4Config { max_step, bounds } = Rk4Config::default();
        Self { max_step, bounds }
    }
}

impl TryFrom<Rk4ConfigFields> for Rk4Config {
    type Error = FitError;

    fn try_from(fields: Rk4ConfigFields) -> FitResult<Self> {
        let config = Rk4Config {
            max_step: fields.max_step,
            bounds: fields.bounds,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Runge-Kutta extrapolator through a field map.
#[derive(Clone, Debug)]
pub struct Rk4Extrapolator<F> {
    field: F,
    config: Rk4Config,
}

impl<F: MagneticField> Rk4Extrapolator<F> {
    pub fn new(field: F, config: Rk4Config) -> Self {
        Self { field, config }
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    /// Right-hand side of the augmented system at `z`.
    fn derivative(&self, z: f64, y: &Augmented, qp: f64) -> Augmented {
        let (tx, ty) = (y[2], y[3]);
        let b = self.field.field(&Vector3::new(y[0], y[1], z));
        let (bx, by, bz) = (b.x, b.y, b.z);

        let txty = tx * ty;
        let tx2 = tx * tx;
        let ty2 = ty * ty;
        let t = 1.0 + tx2 + ty2;
        let t1 = t.sqrt();
        let t2 = 1.0 / t;

        let ax = (txty * bx + ty * bz - (1.0 + tx2) * by) * t1;
        let ay = (-txty * by - tx * bz + (1.0 + ty2) * bx) * t1;

        let dax_dtx = ax * tx * t2 + (ty * bx - 2.0 * tx * by) * t1;
        let dax_dty = ax * ty * t2 + (tx * bx + bz) * t1;
        let day_dtx = ay * tx * t2 + (-ty * by - bz) * t1;
        let day_dty = ay * ty * t2 + (-tx * by + 2.0 * ty * bx) * t1;

        let k = qp * KAPPA;
        let mut d = Augmented::zeros();
        d[0] = tx;
        d[1] = ty;
        d[2] = k * ax;
        d[3] = k * ay;

        for col in [COL_TX, COL_TY, COL_QP] {
            let (jtx, jty) = (y[col + 2], y[col + 3]);
            d[col] = jtx;
            d[col + 1] = jty;
            d[col + 2] = k * (dax_dtx * jtx + dax_dty * jty);
            d[col + 3] = k * (day_dtx * jtx + day_dty * jty);
        }
        d[COL_QP + 2] += KAPPA * ax;
        d[COL_QP + 3] += KAPPA * ay;
        d
    }

    /// One RK4 step of length `h` from `z`. Returns the new parameters and
    /// the step's transport matrix.
    fn step(&self, params: &StateVec, z: f64, h: f64) -> (StateVec, TransportMatrix) {
        let qp = params[param::QP];
        let mut y0 = Augmented::zeros();
        for i in 0..4 {
            y0[i] = params[i];
        }
        y0[COL_TX + 2] = 1.0;
        y0[COL_TY + 3] = 1.0;

        let half = 0.5 * h;
        let k1 = self.derivative(z, &y0, qp);
        let k2 = self.derivative(z + half, &(y0 + k1 * half), qp);
        let k3 = self.derivative(z + half, &(y0 + k2 * half), qp);
        let k4 = self.derivative(z + h, &(y0 + k3 * h), qp);
        let y = y0 + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);

        let out = StateVec::new(y[0], y[1], y[2], y[3], qp);
        let mut f = TransportMatrix::identity();
        for row in 0..4 {
            f.set(row, param::TX, y[COL_TX + row]);
            f.set(row, param::TY, y[COL_TY + row]);
            f.set(row, param::QP, y[COL_QP + row]);
        }
        (out, f)
    }
}

impl<F: MagneticField> TrackExtrapolator for Rk4Extrapolator<F> {
    fn extrapolate(&self, state: &TrackState, z_out: f64) -> FitResult<Extrapolation> {
        self.config.validate()?;
        let dz = z_out - state.z;
        let n_steps = (dz.abs() / self.config.max_step).ceil().max(1.0) as usize;
        let h = dz / n_steps as f64;

        let mut params = state.params;
        let mut transport = TransportMatrix::identity();
        let mut z = state.z;
        for i in 0..n_steps {
            let (next, step_f) = self.step(&params, z, h);
            z = if i + 1 == n_steps { z_out } else { z + h };
            self.config.bounds.check_params(z, &next)?;
            trace!(z, tx = next[param::TX], ty = next[param::TY], "rk4 step");
            params = next;
            transport = step_f * transport;
        }

        let out = TrackState::new(z_out, params, state.cov.similarity(&transport));
        self.config.bounds.check(&out)?;
        Ok(Extrapolation {
            state: out,
            transport,
        })
    }
}
