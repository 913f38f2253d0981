//! Track extrapolation between z positions.
//!
//! # Implementations
//! - [`LineExtrapolator`]: closed-form straight line, field-free regions.
//! - [`Rk4Extrapolator`](crate::rk4::Rk4Extrapolator): Runge-Kutta integration
//!   in a magnetic field.
//! - [`CompositeExtrapolator`]: RK4 upstream of a z threshold, line beyond it.
//!
//! Every extrapolation is a pure function of its input: on failure nothing is
//! returned but the error, on success the new state comes with the transport
//! matrix F (`δout = F·δin`).

use crate::error::{FitError, FitResult};
use crate::field::MagneticField;
use crate::geometry::DetectorPlane;
use crate::linalg::TransportMatrix;
use crate::rk4::{Rk4Config, Rk4Extrapolator};
use crate::types::{param, StateBounds, TrackState};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Result of propagating a state to a new z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extrapolation {
    pub state: TrackState,
    /// Jacobian from the input state to `state`
    pub transport: TransportMatrix,
}

/// Moves a track state (and its covariance) along z.
pub trait TrackExtrapolator {
    /// Propagate `state` to `z_out`.
    fn extrapolate(&self, state: &TrackState, z_out: f64) -> FitResult<Extrapolation>;

    /// Propagate `state` onto `plane`.
    ///
    /// Only planes normal to z are supported; any other orientation returns
    /// [`FitError::UnsupportedPlane`].
    fn extrapolate_to_plane(
        &self,
        state: &TrackState,
        plane: &DetectorPlane,
    ) -> FitResult<Extrapolation> {
        if !plane.is_z_plane() {
            return Err(FitError::UnsupportedPlane(plane.name().to_string()));
        }
        self.extrapolate(state, plane.z())
    }
}

impl<E: TrackExtrapolator + ?Sized> TrackExtrapolator for &E {
    fn extrapolate(&self, state: &TrackState, z_out: f64) -> FitResult<Extrapolation> {
        (**self).extrapolate(state, z_out)
    }
}

// ---------------------------------------------------------------------------
// Straight line
// ---------------------------------------------------------------------------

/// Field-free straight-line transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineExtrapolator {
    pub bounds: StateBounds,
}

impl LineExtrapolator {
    pub fn new(bounds: StateBounds) -> Self {
        Self { bounds }
    }

    /// Transport matrix for a step of `dz`.
    pub fn transport_matrix(dz: f64) -> TransportMatrix {
        let mut f = TransportMatrix::identity();
        f.set(param::X, param::TX, dz);
        f.set(param::Y, param::TY, dz);
        f
    }
}

impl TrackExtrapolator for LineExtrapolator {
    fn extrapolate(&self, state: &TrackState, z_out: f64) -> FitResult<Extrapolation> {
        let dz = z_out - state.z;
        let mut out = *state;
        out.z = z_out;
        out.params[param::X] += dz * state.tx();
        out.params[param::Y] += dz * state.ty();

        // F·C·Fᵀ written out for F = I + dz·(e_x e_txᵀ + e_y e_tyᵀ).
        let c = &state.cov;
        let cov = &mut out.cov;
        cov.add_at(0, 0, dz * (2.0 * c.get(0, 2) + dz * c.get(2, 2)));
        cov.add_at(0, 1, dz * (c.get(0, 3) + c.get(1, 2) + dz * c.get(2, 3)));
        cov.add_at(0, 2, dz * c.get(2, 2));
        cov.add_at(0, 3, dz * c.get(2, 3));
        cov.add_at(0, 4, dz * c.get(2, 4));
        cov.add_at(1, 1, dz * (2.0 * c.get(1, 3) + dz * c.get(3, 3)));
        cov.add_at(1, 2, dz * c.get(2, 3));
        cov.add_at(1, 3, dz * c.get(3, 3));
        cov.add_at(1, 4, dz * c.get(3, 4));

        self.bounds.check(&out)?;
        Ok(Extrapolation {
            state: out,
            transport: Self::transport_matrix(dz),
        })
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// Configuration of the field/field-free split.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// z (mm) beyond which the field is negligible and the line is used
    pub z_threshold: f64,
    pub rk4: Rk4Config,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            z_threshold: 1000.0,
            rk4: Rk4Config::default(),
        }
    }
}

/// RK4 below `z_threshold`, straight line at or above it.
#[derive(Clone, Debug)]
pub struct CompositeExtrapolator<F> {
    rk4: Rk4Extrapolator<F>,
    line: LineExtrapolator,
    z_threshold: f64,
}

impl<F: MagneticField> CompositeExtrapolator<F> {
    pub fn new(field: F, config: CompositeConfig) -> Self {
        Self {
            line: LineExtrapolator::new(config.rk4.bounds),
            rk4: Rk4Extrapolator::new(field, config.rk4),
            z_threshold: config.z_threshold,
        }
    }

    pub fn z_threshold(&self) -> f64 {
        self.z_threshold
    }

    fn in_field(&self, z: f64) -> bool {
        z < self.z_threshold
    }
}

impl<F: MagneticField> TrackExtrapolator for CompositeExtrapolator<F> {
    fn extrapolate(&self, state: &TrackState, z_out: f64) -> FitResult<Extrapolation> {
        match (self.in_field(state.z), self.in_field(z_out)) {
            (true, true) => self.rk4.extrapolate(state, z_out),
            (false, false) => self.line.extrapolate(state, z_out),
            (true, false) => {
                // Leaving the field: integrate to the edge, then straight.
                let first = self.rk4.extrapolate(state, self.z_threshold)?;
                let second = self.line.extrapolate(&first.state, z_out)?;
                Ok(Extrapolation {
                    state: second.state,
                    transport: second.transport * first.transport,
                })
            }
            (false, true) => {
                let first = self.line.extrapolate(state, self.z_threshold)?;
                let second = self.rk4.extrapolate(&first.state, z_out)?;
                Ok(Extrapolation {
                    state: second.state,
                    transport: second.transport * first.transport,
                })
            }
        }
    }
}
