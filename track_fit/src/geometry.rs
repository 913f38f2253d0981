//! Detector description consumed by the fit: material slabs and oriented
//! measurement planes.
//!
//! Both are totally ordered by z through [`ZOrdered`], which is what the
//! [`GeometryNavigator`](crate::navigator::GeometryNavigator) keys on.

use crate::navigator::ZOrdered;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Normals whose x and y components are both below this count as along z.
const NORMAL_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

/// Bulk properties of a material.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Radiation length X0 (mm)
    pub radiation_length: f64,
    /// Density (g/cm³)
    pub density: f64,
    /// Atomic number Z (effective for mixtures)
    pub atomic_number: f64,
    /// Atomic mass A (g/mol)
    pub atomic_mass: f64,
}

impl Material {
    pub const SILICON: Material = Material {
        radiation_length: 93.7,
        density: 2.329,
        atomic_number: 14.0,
        atomic_mass: 28.0855,
    };

    pub const TUNGSTEN: Material = Material {
        radiation_length: 3.504,
        density: 19.3,
        atomic_number: 74.0,
        atomic_mass: 183.84,
    };

    pub const AIR: Material = Material {
        radiation_length: 303_900.0,
        density: 1.205e-3,
        atomic_number: 7.3,
        atomic_mass: 14.5,
    };
}

/// A thin layer of homogeneous material perpendicular to z.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialSlab {
    pub name: String,
    /// Position of the slab along z (mm)
    pub z: f64,
    /// Extent along z (mm)
    pub thickness: f64,
    pub material: Material,
}

impl MaterialSlab {
    pub fn new(name: impl Into<String>, z: f64, thickness: f64, material: Material) -> Self {
        Self {
            name: name.into(),
            z,
            thickness,
            material,
        }
    }

    pub fn silicon(name: impl Into<String>, z: f64, thickness: f64) -> Self {
        Self::new(name, z, thickness, Material::SILICON)
    }

    /// Thickness in units of radiation length.
    pub fn thickness_x0(&self) -> f64 {
        self.thickness / self.material.radiation_length
    }
}

impl ZOrdered for MaterialSlab {
    fn z_position(&self) -> f64 {
        self.z
    }
}

// ---------------------------------------------------------------------------
// Detector plane
// ---------------------------------------------------------------------------

/// An oriented sensor plane with a local (u, v, w) frame.
///
/// `u` is the measurement direction, `w` the unit normal and `v = w × u`.
/// Local coordinates are measured from `origin`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorPlane {
    name: String,
    origin: Vector3<f64>,
    u_dir: Vector3<f64>,
    v_dir: Vector3<f64>,
    normal: Vector3<f64>,
    /// Sensor thickness in radiation lengths
    thickness_x0: f64,
    half_u: f64,
    half_v: f64,
}

impl DetectorPlane {
    /// Build a plane from its origin, normal and an approximate measurement
    /// direction. `u_hint` is orthogonalised against the normal.
    ///
    /// Panics if the normal is zero or `u_hint` is parallel to it.
    pub fn new(
        name: impl Into<String>,
        origin: Vector3<f64>,
        normal: Vector3<f64>,
        u_hint: Vector3<f64>,
        thickness_x0: f64,
    ) -> Self {
        let normal = normal
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(|| panic!("detector plane normal must be non-zero"));
        let u_dir = (u_hint - normal * u_hint.dot(&normal))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(|| panic!("measurement direction must not be parallel to the normal"));
        let v_dir = normal.cross(&u_dir);
        Self {
            name: name.into(),
            origin,
            u_dir,
            v_dir,
            normal,
            thickness_x0,
            half_u: f64::INFINITY,
            half_v: f64::INFINITY,
        }
    }

    /// A plane normal to z whose strips measure along angle `phi` in the xy plane.
    pub fn z_plane(name: impl Into<String>, z: f64, phi: f64, thickness_x0: f64) -> Self {
        Self::new(
            name,
            Vector3::new(0.0, 0.0, z),
            Vector3::z(),
            Vector3::new(phi.cos(), phi.sin(), 0.0),
            thickness_x0,
        )
    }

    /// Limit the active area to |u| ≤ half_u and |v| ≤ half_v.
    pub fn with_extents(mut self, half_u: f64, half_v: f64) -> Self {
        self.half_u = half_u;
        self.half_v = half_v;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    pub fn u_dir(&self) -> &Vector3<f64> {
        &self.u_dir
    }

    pub fn v_dir(&self) -> &Vector3<f64> {
        &self.v_dir
    }

    pub fn z(&self) -> f64 {
        self.origin.z
    }

    pub fn thickness_x0(&self) -> f64 {
        self.thickness_x0
    }

    pub fn is_z_plane(&self) -> bool {
        self.normal.x.abs() < NORMAL_TOLERANCE && self.normal.y.abs() < NORMAL_TOLERANCE
    }

    /// Angle φ of the measurement direction in the xy plane.
    pub fn measurement_angle(&self) -> f64 {
        self.u_dir.y.atan2(self.u_dir.x)
    }

    /// Rotation taking global offsets into the local frame (rows u, v, w).
    pub fn rotation(&self) -> Matrix3<f64> {
        Matrix3::from_rows(&[
            self.u_dir.transpose(),
            self.v_dir.transpose(),
            self.normal.transpose(),
        ])
    }

    pub fn to_local(&self, global: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * (global - self.origin)
    }

    pub fn to_global(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.origin + self.rotation().transpose() * local
    }

    /// Local measurement coordinate of a global point.
    pub fn u(&self, global: &Vector3<f64>) -> f64 {
        (global - self.origin).dot(&self.u_dir)
    }

    /// Whether a global point lies inside the active area (ignoring w).
    pub fn contains(&self, global: &Vector3<f64>) -> bool {
        let local = self.to_local(global);
        local.x.abs() <= self.half_u && local.y.abs() <= self.half_v
    }

    /// Silicon slab equivalent of the sensor, located at the plane origin.
    pub fn material_slab(&self) -> MaterialSlab {
        MaterialSlab::silicon(
            self.name.clone(),
            self.z(),
            self.thickness_x0 * Material::SILICON.radiation_length,
        )
    }
}

impl ZOrdered for DetectorPlane {
    fn z_position(&self) -> f64 {
        self.z()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn local_global_round_trip() {
        let plane = DetectorPlane::new(
            "tilted",
            Vector3::new(1.0, -2.0, 300.0),
            Vector3::new(0.0, 0.1, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            0.007,
        );
        let p = Vector3::new(4.0, 7.0, 301.5);
        let back = plane.to_global(&plane.to_local(&p));
        assert_abs_diff_eq!(back, p, epsilon = 1e-12);
        assert_abs_diff_eq!(plane.to_local(&p).x, plane.u(&p), epsilon = 1e-12);
        assert!(!plane.is_z_plane());
    }

    #[test]
    fn frame_is_orthonormal() {
        let plane = DetectorPlane::new(
            "stereo",
            Vector3::new(0.0, 0.0, 100.0),
            Vector3::new(0.05, 0.0, 1.0),
            Vector3::new(0.1, 1.0, 0.3),
            0.003,
        );
        let r = plane.rotation();
        assert_abs_diff_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_abs_diff_eq!(plane.u_dir().dot(plane.normal()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn z_plane_measures_along_phi() {
        let phi = 0.1_f64;
        let plane = DetectorPlane::z_plane("L1s", 200.0, phi, 0.003);
        assert!(plane.is_z_plane());
        assert_abs_diff_eq!(plane.measurement_angle(), phi, epsilon = 1e-12);
        let p = Vector3::new(3.0, -4.0, 200.0);
        assert_abs_diff_eq!(plane.u(&p), 3.0 * phi.cos() - 4.0 * phi.sin(), epsilon = 1e-12);
    }

    #[test]
    fn extents_bound_the_active_area() {
        let plane = DetectorPlane::z_plane("L1a", 100.0, 0.0, 0.003).with_extents(20.0, 50.0);
        assert!(plane.contains(&Vector3::new(19.0, -49.0, 100.0)));
        assert!(!plane.contains(&Vector3::new(21.0, 0.0, 100.0)));
    }

    #[test]
    fn sensor_material_is_silicon() {
        let slab = DetectorPlane::z_plane("L1a", 100.0, 0.0, 0.0035).material_slab();
        assert_eq!(slab.z, 100.0);
        assert_abs_diff_eq!(slab.thickness_x0(), 0.0035, epsilon = 1e-12);
        assert_eq!(slab.material, Material::SILICON);
    }
}
