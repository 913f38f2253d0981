//! Magnetic field interface consumed by the Runge-Kutta extrapolator.
//!
//! The real field map lives outside this crate; anything implementing
//! [`MagneticField`] (including a plain closure) can be plugged in.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Point → field query. Positions in mm, field in Tesla.
pub trait MagneticField {
    fn field(&self, point: &Vector3<f64>) -> Vector3<f64>;
}

impl<F> MagneticField for F
where
    F: Fn(&Vector3<f64>) -> Vector3<f64>,
{
    fn field(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self(point)
    }
}

/// No field anywhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZeroField;

impl MagneticField for ZeroField {
    fn field(&self, _point: &Vector3<f64>) -> Vector3<f64> {
        Vector3::zeros()
    }
}

/// Constant field for z < `z_max`, zero beyond (a dipole with a sharp edge).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformField {
    pub value: Vector3<f64>,
    pub z_max: f64,
}

impl UniformField {
    pub fn new(value: Vector3<f64>) -> Self {
        Self {
            value,
            z_max: f64::INFINITY,
        }
    }

    /// Field `by` Tesla along y up to `z_max`.
    pub fn dipole_y(by: f64, z_max: f64) -> Self {
        Self {
            value: Vector3::new(0.0, by, 0.0),
            z_max,
        }
    }
}

impl MagneticField for UniformField {
    fn field(&self, point: &Vector3<f64>) -> Vector3<f64> {
        if point.z < self.z_max {
            self.value
        } else {
            Vector3::zeros()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dipole_switches_off_at_edge() {
        let f = UniformField::dipole_y(-1.0, 70.0);
        assert_eq!(f.field(&Vector3::new(0.0, 0.0, 69.9)).y, -1.0);
        assert_eq!(f.field(&Vector3::new(0.0, 0.0, 70.0)), Vector3::zeros());
    }

    #[test]
    fn closures_are_fields() {
        let gradient = |p: &Vector3<f64>| Vector3::new(0.0, 0.001 * p.z, 0.0);
        assert_eq!(gradient.field(&Vector3::new(0.0, 0.0, 500.0)).y, 0.5);
    }
}
