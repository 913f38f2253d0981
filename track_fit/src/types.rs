//! Fundamental types used across the entire workspace.
//!
//! Units: lengths in mm, momenta in GeV, fields in Tesla.

use crate::error::{FitError, FitResult};
use crate::linalg::SymMatrix5;
use nalgebra::{Vector3, Vector5};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// State vector
// ---------------------------------------------------------------------------

/// 5-parameter track state: [x, y, tx, ty, q/p]
pub type StateVec = Vector5<f64>;

/// Positions of the individual parameters inside [`StateVec`].
pub mod param {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const TX: usize = 2;
    pub const TY: usize = 3;
    pub const QP: usize = 4;
}

/// Track parameters and their covariance at a given z.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// Reference plane position (mm)
    pub z: f64,
    /// [x, y, tx = dx/dz, ty = dy/dz, q/p]
    pub params: StateVec,
    /// Packed symmetric covariance of `params`
    pub cov: SymMatrix5,
}

impl TrackState {
    pub fn new(z: f64, params: StateVec, cov: SymMatrix5) -> Self {
        Self { z, params, cov }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.params[param::X]
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.params[param::Y]
    }

    #[inline]
    pub fn tx(&self) -> f64 {
        self.params[param::TX]
    }

    #[inline]
    pub fn ty(&self) -> f64 {
        self.params[param::TY]
    }

    #[inline]
    pub fn qp(&self) -> f64 {
        self.params[param::QP]
    }

    /// Absolute momentum in GeV (infinite for q/p == 0).
    pub fn momentum(&self) -> f64 {
        1.0 / self.qp().abs()
    }

    /// Sign of the charge, or 0 for a neutral (q/p == 0) state.
    pub fn charge_sign(&self) -> f64 {
        if self.qp() == 0.0 {
            0.0
        } else {
            self.qp().signum()
        }
    }

    /// Global position (x, y, z).
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x(), self.y(), self.z)
    }

    /// Path length per unit z: √(1 + tx² + ty²).
    pub fn path_factor(&self) -> f64 {
        (1.0 + self.tx() * self.tx() + self.ty() * self.ty()).sqrt()
    }

    /// Unit direction vector of flight along +z.
    pub fn direction(&self) -> Vector3<f64> {
        Vector3::new(self.tx(), self.ty(), 1.0) / self.path_factor()
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z={:.3} x={:.4} y={:.4} tx={:.5} ty={:.5} qp={:.5}",
            self.z,
            self.x(),
            self.y(),
            self.tx(),
            self.ty(),
            self.qp()
        )
    }
}

// ---------------------------------------------------------------------------
// Validity bounds
// ---------------------------------------------------------------------------

/// Limits a propagated state must respect to be considered physical.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateBounds {
    /// Maximum |tx| and |ty|
    pub max_slope: f64,
    /// Maximum |q/p| (1/GeV)
    pub max_qp: f64,
}

impl Default for StateBounds {
    fn default() -> Self {
        Self {
            max_slope: 5.0,
            max_qp: 1000.0,
        }
    }
}

impl StateBounds {
    /// Reject NaN/inf parameters and states outside the slope or curvature limits.
    pub fn check(&self, state: &TrackState) -> FitResult<()> {
        self.check_params(state.z, &state.params)?;
        if !state.cov.is_finite() {
            return Err(FitError::NumericInvalidState {
                z: state.z,
                reason: "non-finite covariance",
            });
        }
        Ok(())
    }

    /// Parameter-only variant of [`check`](Self::check), for intermediate steps.
    pub fn check_params(&self, z: f64, params: &StateVec) -> FitResult<()> {
        let invalid = |reason| FitError::NumericInvalidState { z, reason };
        if !z.is_finite() || params.iter().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite track parameter"));
        }
        if params[param::TX].abs() > self.max_slope || params[param::TY].abs() > self.max_slope {
            return Err(invalid("slope out of bounds"));
        }
        if params[param::QP].abs() > self.max_qp {
            return Err(invalid("q/p out of bounds"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn state(tx: f64, qp: f64) -> TrackState {
        TrackState::new(
            10.0,
            StateVec::new(1.0, 2.0, tx, 0.0, qp),
            SymMatrix5::identity(),
        )
    }

    #[test]
    fn accessors_follow_param_layout() {
        let s = TrackState::new(
            5.0,
            StateVec::new(1.0, 2.0, 0.3, 0.4, -0.5),
            SymMatrix5::identity(),
        );
        assert_eq!(s.x(), 1.0);
        assert_eq!(s.y(), 2.0);
        assert_eq!(s.tx(), 0.3);
        assert_eq!(s.ty(), 0.4);
        assert_eq!(s.qp(), -0.5);
        assert_abs_diff_eq!(s.momentum(), 2.0, epsilon = 1e-12);
        assert_eq!(s.charge_sign(), -1.0);
        assert_abs_diff_eq!(s.direction().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn bounds_accept_physical_state() {
        assert!(StateBounds::default().check(&state(0.2, 1.0)).is_ok());
    }

    #[test]
    fn bounds_reject_steep_or_nan_state() {
        let bounds = StateBounds::default();
        assert!(matches!(
            bounds.check(&state(6.0, 1.0)),
            Err(FitError::NumericInvalidState { .. })
        ));
        assert!(matches!(
            bounds.check(&state(f64::NAN, 1.0)),
            Err(FitError::NumericInvalidState { .. })
        ));
        assert!(matches!(
            bounds.check(&state(0.1, 2000.0)),
            Err(FitError::NumericInvalidState { .. })
        ));
    }
}
