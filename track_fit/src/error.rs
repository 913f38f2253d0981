//! Error taxonomy for the fitting core.
//!
//! Every fallible operation returns [`FitResult`]. Failures are fail-fast:
//! the step that failed is never partially applied, and the error travels up
//! to the fitter, which marks the track as bad.

use thiserror::Error;

/// Errors raised while extrapolating, updating or smoothing a track.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// A propagation step produced NaN/inf or left the configured slope or
    /// curvature bounds.
    #[error("numerically invalid track state at z = {z} mm: {reason}")]
    NumericInvalidState { z: f64, reason: &'static str },

    /// Zero (or non-finite) determinant while inverting a covariance.
    #[error("singular matrix in {0}")]
    SingularMatrix(&'static str),

    /// Outlier pruning left fewer hits than the configured minimum.
    #[error("insufficient hits: {remaining} remaining, {required} required")]
    InsufficientHits { remaining: usize, required: usize },

    /// A configuration value outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Extrapolation to a plane whose normal is not parallel to z.
    #[error("extrapolation to plane '{0}' is not supported: normal is not along z")]
    UnsupportedPlane(String),
}

pub type FitResult<T> = Result<T, FitError>;
