//! Position measurements fused by the Kalman updater.
//!
//! [`Hit`] is a closed set of measurement kinds; every consumer matches on it
//! exhaustively. Hits are immutable after construction.

use crate::geometry::DetectorPlane;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One-dimensional measurement `u = x·cosφ + y·sinφ` at fixed z.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StripHit {
    u: f64,
    du: f64,
    phi: f64,
    z: f64,
    dz: f64,
}

impl StripHit {
    pub fn new(u: f64, du: f64, phi: f64, z: f64) -> Self {
        Self {
            u,
            du,
            phi,
            z,
            dz: 0.0,
        }
    }

    /// Attach a z uncertainty (informational, not used by the update).
    pub fn with_dz(mut self, dz: f64) -> Self {
        self.dz = dz;
        self
    }

    pub fn u(&self) -> f64 {
        self.u
    }

    pub fn du(&self) -> f64 {
        self.du
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn dz(&self) -> f64 {
        self.dz
    }

    /// (cosφ, sinφ)
    pub fn direction(&self) -> (f64, f64) {
        let (s, c) = self.phi.sin_cos();
        (c, s)
    }
}

/// Two-dimensional (x, y) measurement with a full 2×2 covariance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelHit {
    x: f64,
    y: f64,
    /// σx
    dx: f64,
    /// σy
    dy: f64,
    /// cov(x, y)
    dxy: f64,
    z: f64,
    dz: f64,
}

impl PixelHit {
    pub fn new(x: f64, y: f64, dx: f64, dy: f64, dxy: f64, z: f64) -> Self {
        Self {
            x,
            y,
            dx,
            dy,
            dxy,
            z,
            dz: 0.0,
        }
    }

    pub fn with_dz(mut self, dz: f64) -> Self {
        self.dz = dz;
        self
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn dy(&self) -> f64 {
        self.dy
    }

    pub fn dxy(&self) -> f64 {
        self.dxy
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn dz(&self) -> f64 {
        self.dz
    }

    /// Measurement covariance (V_xx, V_xy, V_yy).
    pub fn covariance(&self) -> (f64, f64, f64) {
        (self.dx * self.dx, self.dxy, self.dy * self.dy)
    }
}

/// Strip measurement expressed in the local u frame of an oriented plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneStripHit {
    strip: StripHit,
    plane: Arc<DetectorPlane>,
}

impl PlaneStripHit {
    /// `u` is the local measurement coordinate on `plane`.
    pub fn new(plane: Arc<DetectorPlane>, u: f64, du: f64) -> Self {
        let strip = StripHit::new(u, du, plane.measurement_angle(), plane.z());
        Self { strip, plane }
    }

    pub fn strip(&self) -> &StripHit {
        &self.strip
    }

    pub fn plane(&self) -> &DetectorPlane {
        &self.plane
    }

    pub fn u(&self) -> f64 {
        self.strip.u
    }

    pub fn du(&self) -> f64 {
        self.strip.du
    }

    pub fn z(&self) -> f64 {
        self.strip.z
    }
}

/// A measurement of any supported kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Hit {
    Strip(StripHit),
    Pixel(PixelHit),
    PlaneStrip(PlaneStripHit),
}

impl Hit {
    pub fn z(&self) -> f64 {
        match self {
            Hit::Strip(h) => h.z(),
            Hit::Pixel(h) => h.z(),
            Hit::PlaneStrip(h) => h.z(),
        }
    }

    /// Number of measured coordinates.
    pub fn measurement_dim(&self) -> usize {
        match self {
            Hit::Strip(_) | Hit::PlaneStrip(_) => 1,
            Hit::Pixel(_) => 2,
        }
    }
}

impl From<StripHit> for Hit {
    fn from(hit: StripHit) -> Self {
        Hit::Strip(hit)
    }
}

impl From<PixelHit> for Hit {
    fn from(hit: PixelHit) -> Self {
        Hit::Pixel(hit)
    }
}

impl From<PlaneStripHit> for Hit {
    fn from(hit: PlaneStripHit) -> Self {
        Hit::PlaneStrip(hit)
    }
}

/// Degrees of freedom of a fit to `hits`: Σ dim − 5, floored at 1.
pub fn ndf(hits: &[Hit]) -> usize {
    let dims: usize = hits.iter().map(Hit::measurement_dim).sum();
    dims.saturating_sub(5).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn strip(z: f64) -> Hit {
        StripHit::new(0.0, 0.1, 0.0, z).into()
    }

    fn pixel(z: f64) -> Hit {
        PixelHit::new(0.0, 0.0, 0.01, 0.01, 0.0, z).into()
    }

    #[test]
    fn ndf_counts_measurement_dimensions() {
        let hits: Vec<Hit> = (1..=4).map(|i| pixel(i as f64 * 100.0)).collect();
        assert_eq!(ndf(&hits), 3);
        let mixed = vec![pixel(100.0), pixel(200.0), strip(300.0), strip(400.0)];
        assert_eq!(ndf(&mixed), 1);
    }

    #[test]
    fn ndf_is_floored_at_one() {
        assert_eq!(ndf(&[]), 1);
        let hits: Vec<Hit> = (1..=3).map(|i| strip(i as f64)).collect();
        assert_eq!(ndf(&hits), 1);
        assert_eq!(ndf(&[pixel(1.0), pixel(2.0)]), 1);
    }

    #[test]
    fn plane_strip_takes_z_and_angle_from_plane() {
        let plane = Arc::new(DetectorPlane::z_plane("L2s", 250.0, 0.05, 0.003));
        let hit = PlaneStripHit::new(plane, 1.5, 0.006);
        assert_eq!(hit.z(), 250.0);
        assert_abs_diff_eq!(hit.strip().phi(), 0.05, epsilon = 1e-12);
        assert_eq!(Hit::from(hit).measurement_dim(), 1);
    }
}
