//! `track_fit` — Kalman-filter fitting of charged-particle tracks.
//!
//! # Module layout
//! - [`linalg`]       — Packed symmetric 5×5 and dense transport matrices
//! - [`types`]        — Track state (x, y, tx, ty, q/p) and numeric bounds
//! - [`hit`]          — Strip, pixel and plane-strip measurements
//! - [`track`]        — Track, fit nodes and quality flag
//! - [`geometry`]     — Materials, material slabs and detector planes
//! - [`navigator`]    — z-ordered lookup of the slabs between two z
//! - [`field`]        — Magnetic field interface and simple maps
//! - [`particle`]     — Particle mass hypotheses
//! - [`material`]     — Energy loss and multiple scattering
//! - [`extrapolator`] — Straight-line and composite extrapolation
//! - [`rk4`]          — Runge-Kutta extrapolation in a field
//! - [`propagator`]   — Extrapolation through material
//! - [`kalman`]       — Kalman update (gain and information forms)
//! - [`smoother`]     — Rauch-Tung-Striebel smoother
//! - [`fitter`]       — Single-pass and iterative track fitters
//!
//! Units throughout: mm, GeV, Tesla, g/cm³.

pub mod error;
pub mod extrapolator;
pub mod field;
pub mod fitter;
pub mod geometry;
pub mod hit;
pub mod kalman;
pub mod linalg;
pub mod material;
pub mod navigator;
pub mod particle;
pub mod propagator;
pub mod rk4;
pub mod smoother;
pub mod track;
pub mod types;

pub use error::{FitError, FitResult};
pub use extrapolator::{
    CompositeConfig, CompositeExtrapolator, Extrapolation, LineExtrapolator, TrackExtrapolator,
};
pub use field::{MagneticField, UniformField, ZeroField};
pub use fitter::{FitOutcome, IterativeFitConfig, IterativeTrackFitter, TrackFitter};
pub use geometry::{DetectorPlane, Material, MaterialSlab};
pub use hit::{Hit, PixelHit, PlaneStripHit, StripHit};
pub use kalman::{KalmanUpdater, KfUpdateResult, UpdateForm};
pub use linalg::{SymMatrix5, TransportMatrix};
pub use material::{MaterialEffects, MaterialEffectsConfig, ScatteringModel};
pub use navigator::{GeometryNavigator, ZOrdered};
pub use particle::ParticleHypothesis;
pub use propagator::{Propagation, PropagatorConfig, TrackPropagator};
pub use rk4::{Rk4Config, Rk4Extrapolator};
pub use smoother::KalmanSmoother;
pub use track::{FitNode, Track, TrackQuality};
pub use types::{StateBounds, StateVec, TrackState};
